//! 按钮回调处理
//!
//! 回调数据按前缀路由。期待会话存在的回调在会话缺失时
//! 统一回复 "Session expired"，不产生内部错误

use anyhow::Result;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::clients::{InlineButton, SentMessage};
use crate::error::QueueError;
use crate::handlers::BotContext;
use crate::models::{
    sanitize_questions, ContentKind, ExpectedInput, ExportTemplate, ProcessingMode, Session,
    TaskContentKind, TaskPayload,
};
use crate::services::csv_file;

/// 分发一条按钮回调
pub async fn handle_callback(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    message_id: i64,
    data: &str,
) -> Result<()> {
    let status = SentMessage {
        chat_id,
        message_id,
    };

    // 投票收集回调
    if data == "poll_export_csv" {
        return poll_export_csv(ctx, user_id, chat_id, status).await;
    }
    if data == "poll_export_doc" {
        return poll_export_doc(ctx, user_id, chat_id, status).await;
    }
    if data == "poll_clear" {
        return poll_clear(ctx, user_id, status).await;
    }
    if data == "poll_stop" {
        return poll_stop(ctx, user_id, status).await;
    }

    // 模式选择
    if let Some(mode_str) = data.strip_prefix("mode_") {
        return select_mode(ctx, user_id, status, mode_str).await;
    }

    // 投递入口与目标选择
    if data.starts_with("post_") {
        return choose_destination(ctx, user_id, status).await;
    }
    if let Some(rest) = data.strip_prefix("dest_ch_") {
        if let Ok(dest) = rest.parse::<i64>() {
            return post_to_channel(ctx, user_id, dest, status).await;
        }
        return Ok(());
    }
    if let Some(rest) = data.strip_prefix("dest_gr_") {
        if let Ok(dest) = rest.parse::<i64>() {
            return ask_topic_id(ctx, user_id, dest, status).await;
        }
        return Ok(());
    }

    // 文档导出
    if data.starts_with("export_") {
        return start_export(ctx, user_id, status).await;
    }
    if let Some(n) = data.strip_prefix("format_") {
        if let Some(template) = n.parse::<u8>().ok().and_then(ExportTemplate::from_number) {
            return export_document(ctx, user_id, chat_id, status, template).await;
        }
        return Ok(());
    }

    // 目标管理
    match data {
        "settings_add_channel" => return ask_destination_entry(ctx, user_id, status, true).await,
        "settings_add_group" => return ask_destination_entry(ctx, user_id, status, false).await,
        "settings_manage_channels" => return manage_destinations(ctx, user_id, status, true).await,
        "settings_manage_groups" => return manage_destinations(ctx, user_id, status, false).await,
        _ => {}
    }
    if let Some(rest) = data.strip_prefix("del_ch_") {
        if let Ok(dest) = rest.parse::<i64>() {
            ctx.directory.remove_channel(user_id, dest).await;
            edit(ctx, status, "✅ Deleted!").await?;
        }
        return Ok(());
    }
    if let Some(rest) = data.strip_prefix("del_gr_") {
        if let Ok(dest) = rest.parse::<i64>() {
            ctx.directory.remove_group(user_id, dest).await;
            edit(ctx, status, "✅ Deleted!").await?;
        }
        return Ok(());
    }

    Ok(())
}

async fn edit(ctx: &BotContext, status: SentMessage, text: &str) -> Result<()> {
    ctx.transport
        .edit_message(status.chat_id, status.message_id, text, None)
        .await?;
    Ok(())
}

async fn session_expired(ctx: &BotContext, status: SentMessage) -> Result<()> {
    edit(ctx, status, "❌ Session expired.").await
}

// ========== 模式选择与入队 ==========

async fn select_mode(
    ctx: &BotContext,
    user_id: i64,
    status: SentMessage,
    mode_str: &str,
) -> Result<()> {
    let Some(mode) = ProcessingMode::from_str(mode_str) else {
        return Ok(());
    };
    if ctx
        .sessions
        .update(user_id, |s| s.chosen_mode = Some(mode))
        .is_err()
    {
        return session_expired(ctx, status).await;
    }

    edit(
        ctx,
        status,
        &format!("✅ Mode: {}\nAdding to queue...", mode.as_str()),
    )
    .await?;
    enqueue_task(ctx, user_id).await
}

/// 把会话中积累的上传提交到任务队列
async fn enqueue_task(ctx: &BotContext, user_id: i64) -> Result<()> {
    let Some(session) = ctx.sessions.get(user_id) else {
        return Ok(());
    };
    let content_kind = match session.content_kind {
        ContentKind::Document => TaskContentKind::Document,
        ContentKind::Images => TaskContentKind::Images,
        // 导入的行已是结构化题目，不需要重量级处理
        ContentKind::ImportedRows => return Ok(()),
    };
    let payload = TaskPayload {
        content_kind,
        inputs: session.raw_inputs.clone(),
        page_range: None,
        mode: session.chosen_mode.unwrap_or(ProcessingMode::Extraction),
    };

    let text = match ctx.queue.enqueue(user_id, payload) {
        Ok(position) => {
            info!("[用户 {}] ✅ 任务入队，位置 {}", user_id, position);
            format!("✅ Queued! Position: {}", position)
        }
        Err(QueueError::QueueFull { .. }) => "❌ Queue full".to_string(),
        Err(QueueError::AlreadyQueued) => "⚠️ Already queued".to_string(),
    };
    ctx.transport.send_message(user_id, &text, None).await?;
    Ok(())
}

// ========== 投递目标选择 ==========

async fn choose_destination(ctx: &BotContext, user_id: i64, status: SentMessage) -> Result<()> {
    if !ctx.sessions.exists(user_id) {
        return session_expired(ctx, status).await;
    }

    let destinations = ctx.directory.get_destinations(user_id).await;
    if destinations.is_empty() {
        return edit(ctx, status, "❌ No channels/groups. Use /settings").await;
    }

    let mut keyboard = Vec::new();
    for channel in &destinations.channels {
        keyboard.push(vec![InlineButton::new(
            format!("📺 {}", channel.name),
            format!("dest_ch_{}", channel.chat_id),
        )]);
    }
    for group in &destinations.groups {
        keyboard.push(vec![InlineButton::new(
            format!("👥 {}", group.name),
            format!("dest_gr_{}", group.chat_id),
        )]);
    }

    ctx.transport
        .edit_message(
            status.chat_id,
            status.message_id,
            "📢 Select destination:",
            Some(keyboard),
        )
        .await?;
    Ok(())
}

async fn post_to_channel(
    ctx: &BotContext,
    user_id: i64,
    dest: i64,
    status: SentMessage,
) -> Result<()> {
    edit(ctx, status, "📺 Posting...").await?;
    ctx.posting_flow.run(user_id, dest, None, status).await
}

async fn ask_topic_id(
    ctx: &BotContext,
    user_id: i64,
    dest: i64,
    status: SentMessage,
) -> Result<()> {
    let updated = ctx.sessions.update(user_id, |s| {
        s.selected_destination = Some(dest);
        s.expected_input = ExpectedInput::DestinationTopic { group_id: dest };
    });
    if updated.is_err() {
        return session_expired(ctx, status).await;
    }
    edit(ctx, status, "🔢 Send *Topic ID* (or 0):").await
}

// ========== 文档导出 ==========

async fn start_export(ctx: &BotContext, user_id: i64, status: SentMessage) -> Result<()> {
    let Some(session) = ctx.sessions.get(user_id) else {
        return session_expired(ctx, status).await;
    };
    if session.pending_questions.is_empty() {
        return edit(ctx, status, "❌ No questions available!").await;
    }

    ctx.sessions
        .update(user_id, |s| s.expected_input = ExpectedInput::DocumentTitle)
        .ok();
    edit(ctx, status, "📝 Send a title for the document:").await
}

async fn export_document(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    status: SentMessage,
    template: ExportTemplate,
) -> Result<()> {
    let Some(session) = ctx.sessions.get(user_id) else {
        return session_expired(ctx, status).await;
    };
    if session.pending_questions.is_empty() {
        return edit(ctx, status, "❌ No questions available!").await;
    }

    let title = session
        .export_title
        .clone()
        .unwrap_or_else(|| "Questions".to_string());
    let questions = sanitize_questions(session.pending_questions.clone());

    let path = ctx.renderer.render(
        &questions,
        template,
        &title,
        Path::new(&ctx.config.output_dir),
    )?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("questions.txt")
        .to_string();

    ctx.transport
        .send_file(
            chat_id,
            &path,
            &file_name,
            &format!(
                "📄 *Document Export Complete!*\n\nQuestions: {}\nFormat: {}",
                questions.len(),
                template.label()
            ),
            None,
        )
        .await?;
    let _ = tokio::fs::remove_file(&path).await;

    ctx.sessions
        .update(user_id, |s| {
            s.export_template = Some(template);
            s.expected_input = ExpectedInput::None;
        })
        .ok();
    edit(ctx, status, "✅ Document exported!").await
}

// ========== 投票收集 ==========

async fn poll_export_csv(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    status: SentMessage,
) -> Result<()> {
    let polls = ctx.polls.questions(user_id);
    if polls.is_empty() {
        ctx.transport
            .send_message(chat_id, "❌ No polls collected yet!", None)
            .await?;
        return Ok(());
    }

    let cleaned = sanitize_questions(polls.clone());
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = PathBuf::from(&ctx.config.output_dir)
        .join(format!("polls_{}_{}.csv", user_id, timestamp));
    csv_file::questions_to_csv(&cleaned, &path)?;

    ctx.transport
        .send_file(
            chat_id,
            &path,
            &format!("collected_polls_{}.csv", timestamp),
            &format!(
                "📊 *CSV Export Complete!*\n\nTotal: {} polls\n✨ Cleaned (removed [tags] & links)",
                polls.len()
            ),
            None,
        )
        .await?;
    let _ = tokio::fs::remove_file(&path).await;

    edit(
        ctx,
        status,
        &format!(
            "✅ *CSV Export Complete!*\n\n📊 Exported: {} polls\n✨ Cleaned data\n\nCollection still active.\nUse /collectpolls to manage.",
            polls.len()
        ),
    )
    .await
}

async fn poll_export_doc(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    status: SentMessage,
) -> Result<()> {
    let polls = ctx.polls.questions(user_id);
    if polls.is_empty() {
        ctx.transport
            .send_message(chat_id, "❌ No polls collected yet!", None)
            .await?;
        return Ok(());
    }

    let cleaned = sanitize_questions(polls);
    let title = format!("Collected Polls {}", Local::now().format("%Y-%m-%d"));
    let path = ctx.renderer.render(
        &cleaned,
        ExportTemplate::Detailed,
        &title,
        Path::new(&ctx.config.output_dir),
    )?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("polls.txt")
        .to_string();

    ctx.transport
        .send_file(
            chat_id,
            &path,
            &file_name,
            &format!("📄 *Document Export Complete!*\n\nQuestions: {}", cleaned.len()),
            None,
        )
        .await?;
    let _ = tokio::fs::remove_file(&path).await;

    edit(ctx, status, "✅ Document exported!\n\nCollection still active.").await
}

async fn poll_clear(ctx: &BotContext, user_id: i64, status: SentMessage) -> Result<()> {
    ctx.polls.clear(user_id);
    let keyboard = vec![vec![InlineButton::new("❌ Stop Collection", "poll_stop")]];
    ctx.transport
        .edit_message(
            status.chat_id,
            status.message_id,
            "🗑️ *Polls Cleared!*\n\n📊 Collected: 0 polls\n\nStart forwarding polls again!",
            Some(keyboard),
        )
        .await?;
    Ok(())
}

async fn poll_stop(ctx: &BotContext, user_id: i64, status: SentMessage) -> Result<()> {
    let count = ctx.polls.count(user_id);
    ctx.polls.stop(user_id);
    edit(
        ctx,
        status,
        &format!(
            "❌ *Poll Collection Stopped*\n\n📊 Final count: {} polls\n\nUse /collectpolls to start again.",
            count
        ),
    )
    .await
}

// ========== 目标管理 ==========

async fn ask_destination_entry(
    ctx: &BotContext,
    user_id: i64,
    status: SentMessage,
    is_channel: bool,
) -> Result<()> {
    let mut session = Session::new(user_id, ContentKind::ImportedRows);
    session.expected_input = if is_channel {
        ExpectedInput::ChannelEntry
    } else {
        ExpectedInput::GroupEntry
    };
    ctx.sessions.set(user_id, session);

    let prompt = if is_channel {
        "📺 Send: `channel_id channel_name`"
    } else {
        "👥 Send: `group_id group_name`"
    };
    edit(ctx, status, prompt).await
}

async fn manage_destinations(
    ctx: &BotContext,
    user_id: i64,
    status: SentMessage,
    channels: bool,
) -> Result<()> {
    let destinations = ctx.directory.get_destinations(user_id).await;
    let (list, prefix, empty_text, heading) = if channels {
        (
            destinations.channels,
            "del_ch_",
            "❌ No channels.",
            "📺 Manage:",
        )
    } else {
        (destinations.groups, "del_gr_", "❌ No groups.", "👥 Manage:")
    };

    if list.is_empty() {
        return edit(ctx, status, empty_text).await;
    }

    let keyboard: Vec<Vec<InlineButton>> = list
        .iter()
        .map(|d| {
            vec![InlineButton::new(
                format!("❌ {}", d.name),
                format!("{}{}", prefix, d.chat_id),
            )]
        })
        .collect();
    ctx.transport
        .edit_message(status.chat_id, status.message_id, heading, Some(keyboard))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::messages;
    use crate::handlers::testing::{build_context, test_config};
    use crate::models::Question;
    use crate::services::DirectoryService as _;

    fn questions(count: usize) -> Vec<Question> {
        (0..count)
            .map(|i| Question::new(format!("q{}", i), vec!["A".into(), "B".into()], 0))
            .collect()
    }

    #[tokio::test]
    async fn mode_callback_without_session_reports_expired() {
        let harness = build_context(test_config());

        handle_callback(&harness.ctx, 1, 1, 10, "mode_extraction")
            .await
            .unwrap();

        assert!(harness
            .transport
            .edits_snapshot()
            .iter()
            .any(|e| e.contains("Session expired")));
        assert_eq!(harness.ctx.queue.len(), 0);
    }

    #[tokio::test]
    async fn mode_callback_enqueues_task() {
        let harness = build_context(test_config());
        harness.ctx.sessions.set(
            1,
            Session::new(1, ContentKind::Images)
                .with_raw_inputs(vec![std::env::temp_dir().join("mcq_cb_test.jpg")]),
        );

        handle_callback(&harness.ctx, 1, 1, 10, "mode_generation")
            .await
            .unwrap();

        assert_eq!(harness.ctx.queue.position_of(1), 1);
        assert_eq!(
            harness.ctx.sessions.get(1).unwrap().chosen_mode,
            Some(ProcessingMode::Generation)
        );
        assert!(harness
            .transport
            .sent_texts
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.contains("Queued! Position: 1")));
    }

    #[tokio::test]
    async fn full_queue_rejects_admission_from_callback() {
        let mut config = test_config();
        config.max_queue_size = 1;
        let harness = build_context(config);

        // 用户 2 占满队列
        harness
            .ctx
            .queue
            .enqueue(
                2,
                TaskPayload {
                    content_kind: TaskContentKind::Images,
                    inputs: Vec::new(),
                    page_range: None,
                    mode: ProcessingMode::Extraction,
                },
            )
            .unwrap();
        harness
            .ctx
            .sessions
            .set(1, Session::new(1, ContentKind::Images));

        handle_callback(&harness.ctx, 1, 1, 10, "mode_extraction")
            .await
            .unwrap();

        assert_eq!(harness.ctx.queue.position_of(1), 0);
        assert!(harness
            .transport
            .sent_texts
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.contains("Queue full")));
    }

    #[tokio::test]
    async fn requeue_attempt_reports_already_queued() {
        let harness = build_context(test_config());
        harness
            .ctx
            .sessions
            .set(1, Session::new(1, ContentKind::Images));

        handle_callback(&harness.ctx, 1, 1, 10, "mode_extraction")
            .await
            .unwrap();
        handle_callback(&harness.ctx, 1, 1, 10, "mode_extraction")
            .await
            .unwrap();

        assert_eq!(harness.ctx.queue.len(), 1);
        assert!(harness
            .transport
            .sent_texts
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.contains("Already queued")));
    }

    #[tokio::test]
    async fn post_without_destinations_points_to_settings() {
        let harness = build_context(test_config());
        harness.ctx.sessions.set(
            1,
            Session::new(1, ContentKind::ImportedRows).with_questions(questions(2)),
        );

        handle_callback(&harness.ctx, 1, 1, 10, "post_csv_1_x")
            .await
            .unwrap();

        assert!(harness
            .transport
            .edits_snapshot()
            .iter()
            .any(|e| e.contains("No channels/groups")));
    }

    #[tokio::test]
    async fn dest_channel_posts_immediately() {
        let harness = build_context(test_config());
        harness.directory.add_channel(1, -100, "News".into()).await;
        harness.ctx.sessions.set(
            1,
            Session::new(1, ContentKind::ImportedRows).with_questions(questions(3)),
        );

        handle_callback(&harness.ctx, 1, 1, 10, "dest_ch_-100")
            .await
            .unwrap();

        assert_eq!(harness.transport.quiz_count(), 3);
        assert!(!harness.ctx.sessions.exists(1));
        assert!(harness
            .transport
            .edits_snapshot()
            .iter()
            .any(|e| e.contains("Success: 3")));
    }

    #[tokio::test]
    async fn dest_group_asks_for_topic_id() {
        let harness = build_context(test_config());
        harness.ctx.sessions.set(
            1,
            Session::new(1, ContentKind::ImportedRows).with_questions(questions(1)),
        );

        handle_callback(&harness.ctx, 1, 1, 10, "dest_gr_-200")
            .await
            .unwrap();

        let session = harness.ctx.sessions.get(1).unwrap();
        assert_eq!(session.selected_destination, Some(-200));
        assert_eq!(
            session.expected_input,
            ExpectedInput::DestinationTopic { group_id: -200 }
        );
        assert!(harness
            .transport
            .edits_snapshot()
            .iter()
            .any(|e| e.contains("Topic ID")));
    }

    #[tokio::test]
    async fn export_flow_renders_and_sends_document() {
        let harness = build_context(test_config());
        harness.ctx.sessions.set(
            1,
            Session::new(1, ContentKind::ImportedRows).with_questions(questions(2)),
        );

        // 导出入口 → 标题输入 → 模板选择
        handle_callback(&harness.ctx, 1, 1, 10, "export_csv_1_x")
            .await
            .unwrap();
        assert_eq!(
            harness.ctx.sessions.get(1).unwrap().expected_input,
            ExpectedInput::DocumentTitle
        );

        messages::handle_text(&harness.ctx, 1, 1, "期末测验")
            .await
            .unwrap();
        assert_eq!(
            harness.ctx.sessions.get(1).unwrap().export_title.as_deref(),
            Some("期末测验")
        );

        handle_callback(&harness.ctx, 1, 1, 11, "format_2")
            .await
            .unwrap();

        assert_eq!(harness.transport.sent_files.lock().unwrap().len(), 1);
        assert!(harness
            .transport
            .edits_snapshot()
            .iter()
            .any(|e| e.contains("Document exported")));
        // 导出后会话仍在，可以继续投递
        assert!(harness.ctx.sessions.exists(1));
    }

    #[tokio::test]
    async fn export_without_questions_is_rejected() {
        let harness = build_context(test_config());
        harness
            .ctx
            .sessions
            .set(1, Session::new(1, ContentKind::ImportedRows));

        handle_callback(&harness.ctx, 1, 1, 10, "export_csv_1_x")
            .await
            .unwrap();

        assert!(harness
            .transport
            .edits_snapshot()
            .iter()
            .any(|e| e.contains("No questions available")));
    }

    #[tokio::test]
    async fn poll_buttons_drive_collection_lifecycle() {
        let harness = build_context(test_config());
        harness.ctx.polls.start(1);
        harness.ctx.polls.add(
            1,
            Question::new("p1", vec!["A".into(), "B".into()], 0),
        );

        handle_callback(&harness.ctx, 1, 1, 10, "poll_export_csv")
            .await
            .unwrap();
        assert_eq!(harness.transport.sent_files.lock().unwrap().len(), 1);
        // 导出后收集仍在进行
        assert!(harness.ctx.polls.is_collecting(1));
        assert_eq!(harness.ctx.polls.count(1), 1);

        handle_callback(&harness.ctx, 1, 1, 10, "poll_clear")
            .await
            .unwrap();
        assert!(harness.ctx.polls.is_collecting(1));
        assert_eq!(harness.ctx.polls.count(1), 0);

        handle_callback(&harness.ctx, 1, 1, 10, "poll_stop")
            .await
            .unwrap();
        assert!(!harness.ctx.polls.is_collecting(1));
    }

    #[tokio::test]
    async fn poll_export_with_nothing_collected() {
        let harness = build_context(test_config());
        harness.ctx.polls.start(1);

        handle_callback(&harness.ctx, 1, 1, 10, "poll_export_csv")
            .await
            .unwrap();

        assert!(harness.transport.sent_files.lock().unwrap().is_empty());
        assert!(harness
            .transport
            .sent_texts
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.contains("No polls collected yet")));
    }

    #[tokio::test]
    async fn settings_buttons_manage_destinations() {
        let harness = build_context(test_config());

        handle_callback(&harness.ctx, 1, 1, 10, "settings_add_channel")
            .await
            .unwrap();
        assert_eq!(
            harness.ctx.sessions.get(1).unwrap().expected_input,
            ExpectedInput::ChannelEntry
        );

        harness.directory.add_channel(1, -100, "News".into()).await;
        handle_callback(&harness.ctx, 1, 1, 10, "settings_manage_channels")
            .await
            .unwrap();
        assert!(harness
            .transport
            .edits_snapshot()
            .iter()
            .any(|e| e.contains("Manage")));

        handle_callback(&harness.ctx, 1, 1, 10, "del_ch_-100")
            .await
            .unwrap();
        assert!(harness
            .directory
            .get_destinations(1)
            .await
            .channels
            .is_empty());
    }
}
