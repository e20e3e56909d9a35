//! 消息处理
//!
//! 文档 / 图片触发上传流程，CSV 直接同步解析为会话，
//! 投票进入收集器，自由文本按会话期待的输入字段路由

use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

use crate::clients::InlineButton;
use crate::config::SessionReplacePolicy;
use crate::handlers::guard::{self, AccessLevel, AuthDecision};
use crate::handlers::{commands, BotContext};
use crate::models::{ContentKind, ExpectedInput, ExportTemplate, Question, Session};
use crate::services::csv_file;

/// 模式选择键盘
fn mode_keyboard() -> Vec<Vec<InlineButton>> {
    vec![
        vec![InlineButton::new("📤 Extraction", "mode_extraction")],
        vec![InlineButton::new("✨ Generation", "mode_generation")],
    ]
}

/// 上传入口的授权检查，未授权时回复提示
async fn ensure_authorized(ctx: &BotContext, user_id: i64, chat_id: i64) -> Result<bool> {
    match guard::check(ctx.directory.as_ref(), user_id, AccessLevel::User).await {
        AuthDecision::Authorized => Ok(true),
        _ => {
            ctx.transport
                .send_message(
                    chat_id,
                    &format!(
                        "🔒 *Access Denied*\n\nYou are not authorized to use {}.",
                        ctx.config.bot_name
                    ),
                    None,
                )
                .await?;
            Ok(false)
        }
    }
}

/// 是否允许开始新的上传流程
///
/// 排队或处理中的任务一律拒绝；已有会话时按配置策略
/// 拒绝或静默替换
async fn upload_allowed(ctx: &BotContext, user_id: i64, chat_id: i64) -> Result<bool> {
    if ctx.queue.is_busy(user_id) {
        ctx.transport
            .send_message(chat_id, "⚠️ Task in progress. Use /cancel", None)
            .await?;
        return Ok(false);
    }
    if ctx.sessions.exists(user_id) {
        match ctx.config.session_replace_policy {
            SessionReplacePolicy::Reject => {
                ctx.transport
                    .send_message(chat_id, "⚠️ Task in progress. Use /cancel", None)
                    .await?;
                return Ok(false);
            }
            SessionReplacePolicy::Replace => {
                ctx.sessions.clear(user_id);
            }
        }
    }
    Ok(true)
}

/// 文档消息：PDF 进入上传流程，CSV 同步导入
pub async fn handle_document(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    file_id: &str,
    file_name: &str,
) -> Result<()> {
    if !ensure_authorized(ctx, user_id, chat_id).await? {
        return Ok(());
    }

    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".csv") {
        return handle_csv_import(ctx, user_id, chat_id, file_id).await;
    }
    if !lower.ends_with(".pdf") {
        ctx.transport
            .send_message(chat_id, "❌ Send PDF or CSV only.", None)
            .await?;
        return Ok(());
    }

    if !upload_allowed(ctx, user_id, chat_id).await? {
        return Ok(());
    }

    let status = ctx
        .transport
        .send_message(chat_id, "📥 Downloading...", None)
        .await?;

    let path = PathBuf::from(&ctx.config.temp_dir).join(format!("{}_{}", user_id, file_name));
    if let Err(e) = ctx.transport.download_file(file_id, &path).await {
        ctx.transport
            .edit_message(
                status.chat_id,
                status.message_id,
                &format!("❌ Error: {}", e),
                None,
            )
            .await?;
        return Ok(());
    }

    let session = Session::new(user_id, ContentKind::Document).with_raw_inputs(vec![path]);
    ctx.sessions.set(user_id, session);
    info!("[用户 {}] 📄 收到文档 {}", user_id, file_name);

    ctx.transport
        .edit_message(
            status.chat_id,
            status.message_id,
            "📄 PDF received! Choose mode:",
            Some(mode_keyboard()),
        )
        .await?;
    Ok(())
}

/// 图片消息
pub async fn handle_photo(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    file_id: &str,
) -> Result<()> {
    if !ensure_authorized(ctx, user_id, chat_id).await? {
        return Ok(());
    }
    if !upload_allowed(ctx, user_id, chat_id).await? {
        return Ok(());
    }

    let status = ctx
        .transport
        .send_message(chat_id, "📥 Downloading...", None)
        .await?;

    let path = PathBuf::from(&ctx.config.temp_dir).join(format!("{}_image.jpg", user_id));
    if let Err(e) = ctx.transport.download_file(file_id, &path).await {
        ctx.transport
            .edit_message(
                status.chat_id,
                status.message_id,
                &format!("❌ Error: {}", e),
                None,
            )
            .await?;
        return Ok(());
    }

    let session = Session::new(user_id, ContentKind::Images).with_raw_inputs(vec![path]);
    ctx.sessions.set(user_id, session);
    info!("[用户 {}] 🖼️ 收到图片", user_id);

    ctx.transport
        .edit_message(
            status.chat_id,
            status.message_id,
            "🖼️ Choose mode:",
            Some(mode_keyboard()),
        )
        .await?;
    Ok(())
}

/// CSV 导入：行映射是同步操作，不经过任务队列
async fn handle_csv_import(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    file_id: &str,
) -> Result<()> {
    if !upload_allowed(ctx, user_id, chat_id).await? {
        return Ok(());
    }

    let status = ctx
        .transport
        .send_message(chat_id, "📊 Processing...", None)
        .await?;

    let path = PathBuf::from(&ctx.config.temp_dir).join(format!("{}_import.csv", user_id));
    if let Err(e) = ctx.transport.download_file(file_id, &path).await {
        ctx.transport
            .edit_message(
                status.chat_id,
                status.message_id,
                &format!("❌ Error: {}", e),
                None,
            )
            .await?;
        return Ok(());
    }

    let content = tokio::fs::read(&path).await?;
    let _ = tokio::fs::remove_file(&path).await;

    let questions = match csv_file::parse_csv_bytes(&content) {
        Ok(questions) => questions,
        Err(e) => {
            ctx.transport
                .edit_message(
                    status.chat_id,
                    status.message_id,
                    &format!("❌ Error: {}", e),
                    None,
                )
                .await?;
            return Ok(());
        }
    };

    if questions.is_empty() {
        ctx.transport
            .edit_message(
                status.chat_id,
                status.message_id,
                "❌ No valid questions.",
                None,
            )
            .await?;
        return Ok(());
    }

    let session = Session::new(user_id, ContentKind::ImportedRows).with_questions(questions.clone());
    let session_id = session.session_id.clone();
    ctx.sessions.set(user_id, session);
    info!("[用户 {}] 📊 导入 {} 道题目", user_id, questions.len());

    let keyboard = vec![
        vec![InlineButton::new(
            "📢 Post Quizzes",
            format!("post_{}", session_id),
        )],
        vec![InlineButton::new(
            "📄 Export Document",
            format!("export_{}", session_id),
        )],
    ];
    ctx.transport
        .edit_message(
            status.chat_id,
            status.message_id,
            &format!(
                "✅ CSV Processed!\n📊 Questions: {}\n\nChoose an action:",
                questions.len()
            ),
            Some(keyboard),
        )
        .await?;
    Ok(())
}

/// 投票消息：收集模式下逐条累积并实时更新计数
pub async fn handle_poll(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    message_id: i64,
    question: Question,
    _is_quiz: bool,
) -> Result<()> {
    if !ensure_authorized(ctx, user_id, chat_id).await? {
        return Ok(());
    }
    if !ctx.polls.is_collecting(user_id) {
        return Ok(());
    }

    let count = ctx.polls.add(user_id, question);

    // 转发的投票即刻删除
    let _ = ctx.transport.delete_message(chat_id, message_id).await;

    if let Some(status_id) = ctx.polls.status_message(user_id) {
        let _ = ctx
            .transport
            .edit_message(
                chat_id,
                status_id,
                &format!(
                    "📮 *Poll Collection Active!*\n\n📊 Collected: {} polls\n\n✅ Keep forwarding polls\n🗑️ Auto-deleting forwarded polls\n📈 Live counter updating\n\nClick buttons when done!",
                    count
                ),
                Some(commands::collection_keyboard()),
            )
            .await;
    }
    Ok(())
}

/// 自由文本：按会话期待的输入字段路由
///
/// 没有会话或没有期待字段时是 no-op，普通聊天消息不会报错
pub async fn handle_text(ctx: &BotContext, user_id: i64, chat_id: i64, text: &str) -> Result<()> {
    let Some(session) = ctx.sessions.get(user_id) else {
        return Ok(());
    };

    match session.expected_input {
        ExpectedInput::None => Ok(()),
        ExpectedInput::ChannelEntry => add_destination(ctx, user_id, chat_id, text, true).await,
        ExpectedInput::GroupEntry => add_destination(ctx, user_id, chat_id, text, false).await,
        ExpectedInput::DestinationTopic { group_id } => {
            handle_topic_input(ctx, user_id, chat_id, group_id, text).await
        }
        ExpectedInput::DocumentTitle => handle_title_input(ctx, user_id, chat_id, text).await,
    }
}

async fn add_destination(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    text: &str,
    is_channel: bool,
) -> Result<()> {
    let mut parts = text.trim().splitn(2, ' ');
    let id = parts.next().and_then(|p| p.parse::<i64>().ok());
    let name = parts.next().map(|n| n.trim().to_string());

    let (Some(id), Some(name)) = (id, name.filter(|n| !n.is_empty())) else {
        ctx.transport
            .send_message(chat_id, "❌ Invalid format.", None)
            .await?;
        return Ok(());
    };

    let confirmation = if is_channel {
        ctx.directory.add_channel(user_id, id, name).await;
        "✅ Channel added!"
    } else {
        ctx.directory.add_group(user_id, id, name).await;
        "✅ Group added!"
    };
    // 输入型会话用完即弃
    ctx.sessions.clear(user_id);
    ctx.transport.send_message(chat_id, confirmation, None).await?;
    Ok(())
}

async fn handle_topic_input(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    group_id: i64,
    text: &str,
) -> Result<()> {
    let Ok(topic_id) = text.trim().parse::<i64>() else {
        ctx.transport
            .send_message(chat_id, "❌ Invalid topic ID.", None)
            .await?;
        return Ok(());
    };
    let thread_id = if topic_id > 0 { Some(topic_id) } else { None };

    let status = ctx
        .transport
        .send_message(chat_id, "👥 Posting...", None)
        .await?;
    ctx.posting_flow
        .run(user_id, group_id, thread_id, status)
        .await
}

async fn handle_title_input(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    text: &str,
) -> Result<()> {
    let title = text.trim().to_string();
    if ctx
        .sessions
        .update(user_id, |s| {
            s.export_title = Some(title.clone());
            s.expected_input = ExpectedInput::None;
        })
        .is_err()
    {
        ctx.transport
            .send_message(chat_id, "❌ Session expired.", None)
            .await?;
        return Ok(());
    }

    let keyboard = vec![
        vec![InlineButton::new(
            format!("1️⃣ {}", ExportTemplate::Compact.label()),
            "format_1",
        )],
        vec![InlineButton::new(
            format!("2️⃣ {}", ExportTemplate::Detailed.label()),
            "format_2",
        )],
        vec![InlineButton::new(
            format!("3️⃣ {}", ExportTemplate::AnswerTable.label()),
            "format_3",
        )],
    ];
    ctx.transport
        .send_message(chat_id, "📄 Choose format:", Some(keyboard))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{build_context, test_config};
    use crate::models::ContentKind;
    use crate::services::DirectoryService as _;

    #[tokio::test]
    async fn text_without_session_is_ignored() {
        let harness = build_context(test_config());
        handle_text(&harness.ctx, 1, 1, "随便聊聊").await.unwrap();

        assert!(harness.transport.sent_texts.lock().unwrap().is_empty());
        assert!(harness.transport.edits_snapshot().is_empty());
    }

    #[tokio::test]
    async fn text_with_no_expected_input_is_ignored() {
        let harness = build_context(test_config());
        harness
            .ctx
            .sessions
            .set(1, Session::new(1, ContentKind::Document));

        handle_text(&harness.ctx, 1, 1, "随便聊聊").await.unwrap();
        assert!(harness.transport.sent_texts.lock().unwrap().is_empty());
        // 会话不受影响
        assert!(harness.ctx.sessions.exists(1));
    }

    #[tokio::test]
    async fn channel_entry_adds_destination_and_clears_session() {
        let harness = build_context(test_config());
        let mut session = Session::new(1, ContentKind::ImportedRows);
        session.expected_input = ExpectedInput::ChannelEntry;
        harness.ctx.sessions.set(1, session);

        handle_text(&harness.ctx, 1, 1, "-100123 News Channel")
            .await
            .unwrap();

        let destinations = harness.directory.get_destinations(1).await;
        assert_eq!(destinations.channels.len(), 1);
        assert_eq!(destinations.channels[0].chat_id, -100123);
        assert_eq!(destinations.channels[0].name, "News Channel");
        assert!(!harness.ctx.sessions.exists(1));
        assert!(harness
            .transport
            .sent_texts
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.contains("Channel added")));
    }

    #[tokio::test]
    async fn invalid_entry_keeps_session_for_retry() {
        let harness = build_context(test_config());
        let mut session = Session::new(1, ContentKind::ImportedRows);
        session.expected_input = ExpectedInput::GroupEntry;
        harness.ctx.sessions.set(1, session);

        handle_text(&harness.ctx, 1, 1, "不是数字").await.unwrap();

        assert!(harness.ctx.sessions.exists(1));
        assert!(harness
            .transport
            .sent_texts
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.contains("Invalid format")));
    }

    #[tokio::test]
    async fn upload_rejected_while_task_in_progress() {
        let harness = build_context(test_config());
        harness.ctx.queue.mark_processing(1);

        handle_document(&harness.ctx, 1, 1, "file-1", "paper.pdf")
            .await
            .unwrap();

        assert!(!harness.ctx.sessions.exists(1));
        assert!(harness
            .transport
            .sent_texts
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.contains("Task in progress")));
    }

    #[tokio::test]
    async fn second_upload_rejected_by_default_policy() {
        let harness = build_context(test_config());
        harness
            .ctx
            .sessions
            .set(1, Session::new(1, ContentKind::Images));

        handle_photo(&harness.ctx, 1, 1, "photo-1").await.unwrap();

        // 原有会话未被替换
        assert_eq!(
            harness.ctx.sessions.get(1).unwrap().content_kind,
            ContentKind::Images
        );
        assert!(harness
            .transport
            .sent_texts
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.contains("Task in progress")));
    }

    #[tokio::test]
    async fn pdf_upload_creates_session_and_asks_mode() {
        let harness = build_context(test_config());

        handle_document(&harness.ctx, 5, 5, "file-9", "exam.pdf")
            .await
            .unwrap();

        let session = harness.ctx.sessions.get(5).unwrap();
        assert_eq!(session.content_kind, ContentKind::Document);
        assert_eq!(session.raw_inputs.len(), 1);
        assert!(harness
            .transport
            .edits_snapshot()
            .iter()
            .any(|e| e.contains("Choose mode")));

        std::fs::remove_file(&session.raw_inputs[0]).ok();
    }

    #[tokio::test]
    async fn non_pdf_document_is_rejected() {
        let harness = build_context(test_config());
        handle_document(&harness.ctx, 1, 1, "file-2", "notes.docx")
            .await
            .unwrap();
        assert!(harness
            .transport
            .sent_texts
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.contains("Send PDF or CSV only")));
    }

    #[tokio::test]
    async fn csv_import_creates_session_with_questions() {
        let harness = build_context(test_config());
        harness.transport.set_download_content(
            b"questions,option1,option2,option3,option4,option5,answer,explanation,type,section\n\
1+1=?,1,2,,,,2,,1,1\n"
                .to_vec(),
        );

        handle_document(&harness.ctx, 3, 3, "file-3", "bank.csv")
            .await
            .unwrap();

        let session = harness.ctx.sessions.get(3).unwrap();
        assert_eq!(session.content_kind, ContentKind::ImportedRows);
        assert_eq!(session.pending_questions.len(), 1);
        assert_eq!(session.pending_questions[0].correct_index, 1);
        assert!(harness
            .transport
            .edits_snapshot()
            .iter()
            .any(|e| e.contains("CSV Processed")));
    }

    #[tokio::test]
    async fn empty_csv_reports_no_valid_questions() {
        let harness = build_context(test_config());
        harness.transport.set_download_content(
            b"questions,option1,option2,option3,option4,option5,answer,explanation,type,section\n"
                .to_vec(),
        );

        handle_document(&harness.ctx, 3, 3, "file-3", "bank.csv")
            .await
            .unwrap();

        assert!(!harness.ctx.sessions.exists(3));
        assert!(harness
            .transport
            .edits_snapshot()
            .iter()
            .any(|e| e.contains("No valid questions")));
    }

    #[tokio::test]
    async fn topic_input_posts_to_group_and_consumes_session() {
        let harness = build_context(test_config());
        let mut session = Session::new(1, ContentKind::ImportedRows).with_questions(vec![
            Question::new("q1", vec!["A".into(), "B".into()], 0),
            Question::new("q2", vec!["A".into(), "B".into()], 1),
        ]);
        session.expected_input = ExpectedInput::DestinationTopic { group_id: -500 };
        harness.ctx.sessions.set(1, session);

        handle_text(&harness.ctx, 1, 1, "0").await.unwrap();

        assert_eq!(harness.transport.quiz_count(), 2);
        assert!(!harness.ctx.sessions.exists(1));
    }

    #[tokio::test]
    async fn invalid_topic_id_is_reported() {
        let harness = build_context(test_config());
        let mut session = Session::new(1, ContentKind::ImportedRows);
        session.expected_input = ExpectedInput::DestinationTopic { group_id: -500 };
        harness.ctx.sessions.set(1, session);

        handle_text(&harness.ctx, 1, 1, "abc").await.unwrap();

        assert_eq!(harness.transport.quiz_count(), 0);
        assert!(harness
            .transport
            .sent_texts
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.contains("Invalid topic ID")));
    }

    #[tokio::test]
    async fn unauthorized_upload_is_denied() {
        let mut config = test_config();
        config.auth_enabled = true;
        let harness = build_context(config);

        handle_document(&harness.ctx, 42, 42, "file-1", "exam.pdf")
            .await
            .unwrap();

        assert!(!harness.ctx.sessions.exists(42));
        assert!(harness
            .transport
            .sent_texts
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.contains("Access Denied")));
    }

    #[tokio::test]
    async fn collected_poll_is_deleted_and_counter_updated() {
        let harness = build_context(test_config());
        harness.ctx.polls.start(1);
        harness.ctx.polls.set_status_message(1, 99);

        let question = Question::new("poll q", vec!["A".into(), "B".into()], 1);
        handle_poll(&harness.ctx, 1, 1, 555, question, true)
            .await
            .unwrap();

        assert_eq!(harness.ctx.polls.count(1), 1);
        assert_eq!(*harness.transport.deleted.lock().unwrap(), vec![(1, 555)]);
        assert!(harness
            .transport
            .edits_snapshot()
            .iter()
            .any(|e| e.contains("Collected: 1 polls")));
    }

    #[tokio::test]
    async fn poll_outside_collection_mode_is_ignored() {
        let harness = build_context(test_config());
        let question = Question::new("poll q", vec!["A".into(), "B".into()], 0);
        handle_poll(&harness.ctx, 1, 1, 556, question, true)
            .await
            .unwrap();

        assert_eq!(harness.ctx.polls.count(1), 0);
        assert!(harness.transport.deleted.lock().unwrap().is_empty());
    }
}
