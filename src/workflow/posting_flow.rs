//! 测验投递流程 - 流程层
//!
//! 核心职责：把一组已定稿的题目按源顺序逐条投递到目标，
//! 单条失败计数后继续，完成后汇报成败并无条件清除会话

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clients::{SentMessage, Transport};
use crate::models::Question;
use crate::services::directory::UserSettings;
use crate::services::{DirectoryService, QuizPoster};
use crate::store::SessionStore;
use crate::workflow::ProgressFn;

/// 投递结果统计
///
/// 恒有 success + failed == 题目总数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostReport {
    pub success: usize,
    pub failed: usize,
}

/// 测验投递流程
pub struct PostingFlow {
    transport: Arc<dyn Transport>,
    sessions: Arc<SessionStore>,
    directory: Arc<dyn DirectoryService>,
    poster: QuizPoster,
}

impl PostingFlow {
    pub fn new(
        transport: Arc<dyn Transport>,
        sessions: Arc<SessionStore>,
        directory: Arc<dyn DirectoryService>,
    ) -> Self {
        let poster = QuizPoster::new(transport.clone());
        Self {
            transport,
            sessions,
            directory,
            poster,
        }
    }

    /// 核心投递：逐条顺序投递并累计成败
    ///
    /// 任何单条失败都不会提前中止，后续题目照常尝试；
    /// 每次尝试后以 (已投递数, 总数) 触发进度回调
    pub async fn post(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        questions: &[Question],
        settings: &UserSettings,
        progress: ProgressFn,
    ) -> PostReport {
        let total = questions.len();
        let mut report = PostReport::default();

        for (index, question) in questions.iter().enumerate() {
            match self
                .poster
                .post_one(chat_id, thread_id, question, settings)
                .await
            {
                Ok(()) => report.success += 1,
                Err(e) => {
                    warn!("⚠️ 第 {} 条测验投递失败: {}", index + 1, e);
                    report.failed += 1;
                }
            }
            progress(index + 1, total).await;
        }

        report
    }

    /// 完整投递流程
    ///
    /// 读取会话中的题目 → 投递 → 汇报最终成败。
    /// 批次视为已消费：无论成败，会话都被清除，产物文件被删除
    pub async fn run(
        &self,
        owner_id: i64,
        chat_id: i64,
        thread_id: Option<i64>,
        status: SentMessage,
    ) -> Result<()> {
        let Some(session) = self.sessions.get(owner_id) else {
            let _ = self
                .transport
                .edit_message(status.chat_id, status.message_id, "❌ Session expired.", None)
                .await;
            return Ok(());
        };

        let questions = session.pending_questions.clone();
        let settings = self.directory.get_user_settings(owner_id).await;

        let _ = self
            .transport
            .edit_message(
                status.chat_id,
                status.message_id,
                &format!("📢 Posting {} quizzes...", questions.len()),
                None,
            )
            .await;

        let transport = self.transport.clone();
        let progress: ProgressFn = Arc::new(move |current, total| {
            let transport = transport.clone();
            Box::pin(async move {
                let _ = transport
                    .edit_message(
                        status.chat_id,
                        status.message_id,
                        &format!("📢 {}/{}", current, total),
                        None,
                    )
                    .await;
            })
        });

        let report = self.post(chat_id, thread_id, &questions, &settings, progress).await;

        let _ = self
            .transport
            .edit_message(
                status.chat_id,
                status.message_id,
                &format!(
                    "✅ Complete!\nSuccess: {}\nFailed: {}",
                    report.success, report.failed
                ),
                None,
            )
            .await;
        info!(
            "[用户 {}] 📢 投递完成: 成功 {} / 失败 {}",
            owner_id, report.success, report.failed
        );

        // 批次已消费：会话无条件清除，产物文件交付后删除
        if let Some(consumed) = self.sessions.take(owner_id) {
            if let Some(artifact) = &consumed.artifact_path {
                let _ = tokio::fs::remove_file(artifact).await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::transport::testing::MockTransport;
    use crate::models::{ContentKind, Session};
    use crate::services::MemoryDirectory;
    use crate::config::Config;

    fn no_progress() -> ProgressFn {
        Arc::new(|_, _| Box::pin(async {}))
    }

    fn build_flow() -> (PostingFlow, Arc<MockTransport>, Arc<SessionStore>) {
        let transport = Arc::new(MockTransport::new());
        let sessions = Arc::new(SessionStore::new());
        let directory = Arc::new(MemoryDirectory::from_config(&Config {
            auth_enabled: false,
            ..Config::default()
        }));
        let flow = PostingFlow::new(transport.clone(), sessions.clone(), directory);
        (flow, transport, sessions)
    }

    fn questions(count: usize) -> Vec<Question> {
        (0..count)
            .map(|i| Question::new(format!("第 {} 题", i + 1), vec!["A".into(), "B".into()], 0))
            .collect()
    }

    #[tokio::test]
    async fn empty_batch_reports_zero_zero() {
        let (flow, transport, _) = build_flow();
        let report = flow
            .post(-100, None, &[], &UserSettings::default(), no_progress())
            .await;
        assert_eq!(report, PostReport { success: 0, failed: 0 });
        assert_eq!(transport.quiz_count(), 0);
    }

    #[tokio::test]
    async fn counts_always_sum_to_total() {
        let (flow, transport, _) = build_flow();
        let batch = questions(7);
        let report = flow
            .post(-100, None, &batch, &UserSettings::default(), no_progress())
            .await;
        assert_eq!(report.success + report.failed, batch.len());
        assert_eq!(transport.quiz_count(), 7);
    }

    #[tokio::test]
    async fn third_failure_does_not_stop_remaining_posts() {
        let (flow, transport, _) = build_flow();
        transport.fail_quiz_on(vec![3]);

        let report = flow
            .post(-100, None, &questions(5), &UserSettings::default(), no_progress())
            .await;

        assert_eq!(report, PostReport { success: 4, failed: 1 });
        // 第 4、5 条仍然尝试
        assert_eq!(transport.quiz_count(), 5);
    }

    #[tokio::test]
    async fn progress_reports_cumulative_counts() {
        let (flow, _, _) = build_flow();
        let calls: Arc<std::sync::Mutex<Vec<(usize, usize)>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let calls_clone = calls.clone();
        let progress: ProgressFn = Arc::new(move |current, total| {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.lock().unwrap().push((current, total));
            })
        });

        flow.post(-100, None, &questions(3), &UserSettings::default(), progress)
            .await;

        assert_eq!(*calls.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn posts_preserve_source_order() {
        let (flow, transport, _) = build_flow();
        flow.post(
            -100,
            None,
            &questions(3),
            &UserSettings { quiz_marker: String::new(), explanation_tag: String::new() },
            no_progress(),
        )
        .await;

        let posted: Vec<String> = transport
            .quizzes
            .lock()
            .unwrap()
            .iter()
            .map(|q| q.question.clone())
            .collect();
        assert_eq!(posted, vec!["第 1 题", "第 2 题", "第 3 题"]);
    }

    #[tokio::test]
    async fn run_with_absent_session_reports_expired() {
        let (flow, transport, sessions) = build_flow();
        let status = SentMessage { chat_id: 1, message_id: 10 };

        flow.run(1, -100, None, status).await.unwrap();

        assert!(transport
            .edits_snapshot()
            .iter()
            .any(|e| e.contains("Session expired")));
        assert_eq!(transport.quiz_count(), 0);
        assert!(!sessions.exists(1));
    }

    #[tokio::test]
    async fn run_clears_session_even_on_total_failure() {
        let (flow, transport, sessions) = build_flow();
        transport.fail_quiz_on(vec![1, 2]);

        let session = Session::new(1, ContentKind::Images).with_questions(questions(2));
        sessions.set(1, session);

        let status = SentMessage { chat_id: 1, message_id: 10 };
        flow.run(1, -100, None, status).await.unwrap();

        assert!(!sessions.exists(1));
        assert!(transport
            .edits_snapshot()
            .iter()
            .any(|e| e.contains("Success: 0") && e.contains("Failed: 2")));
    }

    #[tokio::test]
    async fn run_posts_into_thread_when_given() {
        let (flow, transport, sessions) = build_flow();
        sessions.set(
            1,
            Session::new(1, ContentKind::Images).with_questions(questions(1)),
        );

        let status = SentMessage { chat_id: 1, message_id: 10 };
        flow.run(1, -200, Some(42), status).await.unwrap();

        assert_eq!(transport.quiz_count(), 1);
        assert!(!sessions.exists(1));
    }
}
