//! 队列工作循环 - 编排层
//!
//! ## 职责
//!
//! 1. **单消费者**：每轮最多取出并处理一条任务
//! 2. **状态迁移**：出队与标记处理中原子完成，处理结束后必定清除标记
//! 3. **故障隔离**：管线内的任何失败（包括 panic）都不会击穿循环
//! 4. **节流**：处理完一条任务后短暂停顿，队列为空时停顿更久，
//!    意外故障后退避再恢复

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::store::TaskQueue;
use crate::workflow::ContentFlow;

/// 每处理完一条任务后的节流停顿
const TASK_PAUSE: Duration = Duration::from_millis(500);
/// 队列为空时的轮询停顿
const IDLE_PAUSE: Duration = Duration::from_secs(1);
/// 意外故障后的退避停顿
const FAULT_BACKOFF: Duration = Duration::from_secs(3);

/// 队列工作循环
pub struct QueueWorker {
    queue: Arc<TaskQueue>,
    flow: Arc<ContentFlow>,
}

impl QueueWorker {
    pub fn new(queue: Arc<TaskQueue>, flow: Arc<ContentFlow>) -> Self {
        Self { queue, flow }
    }

    /// 持续运行的消费循环，随系统存续，永不主动退出
    pub async fn run(self) {
        info!("🔄 队列工作循环已启动");
        loop {
            match self.cycle().await {
                Ok(true) => tokio::time::sleep(TASK_PAUSE).await,
                Ok(false) => tokio::time::sleep(IDLE_PAUSE).await,
                Err(e) => {
                    error!("队列循环发生意外故障: {:#}", e);
                    tokio::time::sleep(FAULT_BACKOFF).await;
                }
            }
        }
    }

    /// 单轮消费
    ///
    /// # 返回
    /// 返回本轮是否处理了任务
    async fn cycle(&self) -> anyhow::Result<bool> {
        let Some(task) = self.queue.pop_for_processing() else {
            return Ok(false);
        };
        let owner_id = task.owner_id;

        // 在独立任务中运行管线，panic 只会表现为 join 错误
        let flow = self.flow.clone();
        let result = tokio::spawn(async move { flow.process(task).await }).await;

        // 无论结果如何，先清除处理中标记
        self.queue.clear_processing(owner_id);

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // 任务级失败已在管线内向用户报告，这里只记录
                warn!("[用户 {}] ⚠️ 任务处理失败: {:#}", owner_id, e);
            }
            Err(join_err) => {
                anyhow::bail!("管线执行失败 (用户 {}): {}", owner_id, join_err);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::transport::testing::MockTransport;
    use crate::config::Config;
    use crate::models::{PageImage, ProcessingMode, Question, TaskContentKind, TaskPayload};
    use crate::services::{DocumentConverter, PageExtractor};
    use crate::store::SessionStore;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::path::Path;

    struct StubExtractor;

    #[async_trait]
    impl PageExtractor for StubExtractor {
        async fn extract_page(
            &self,
            _page: &PageImage,
            _mode: ProcessingMode,
        ) -> Result<Vec<Question>> {
            Ok(Vec::new())
        }
    }

    struct StubConverter;

    #[async_trait]
    impl DocumentConverter for StubConverter {
        async fn to_page_images(
            &self,
            _document: &Path,
            _page_range: Option<(u32, u32)>,
            _work_dir: &Path,
        ) -> Result<Vec<PageImage>> {
            bail!("转换不可用")
        }
    }

    fn build_worker() -> (QueueWorker, Arc<TaskQueue>) {
        let config = Config {
            temp_dir: std::env::temp_dir().display().to_string(),
            output_dir: std::env::temp_dir().display().to_string(),
            ..Config::default()
        };
        let queue = Arc::new(TaskQueue::new(4));
        let flow = Arc::new(ContentFlow::new(
            Arc::new(MockTransport::new()),
            Arc::new(StubExtractor),
            Arc::new(StubConverter),
            Arc::new(SessionStore::new()),
            &config,
        ));
        (QueueWorker::new(queue.clone(), flow), queue)
    }

    #[tokio::test]
    async fn idle_cycle_reports_no_work() {
        let (worker, _) = build_worker();
        assert!(!worker.cycle().await.unwrap());
    }

    #[tokio::test]
    async fn failed_task_still_clears_processing_flag() {
        let (worker, queue) = build_worker();
        // 文档转换桩直接失败 → 规范化中止
        queue
            .enqueue(
                1,
                TaskPayload {
                    content_kind: TaskContentKind::Document,
                    inputs: vec![std::env::temp_dir().join("mcq_worker_missing.pdf")],
                    page_range: None,
                    mode: ProcessingMode::Extraction,
                },
            )
            .unwrap();

        // 任务级失败被吸收，循环本身不报错
        assert!(worker.cycle().await.unwrap());
        assert!(!queue.is_processing(1));
        assert!(queue.is_empty());
    }
}
