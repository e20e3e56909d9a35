//! 应用外壳 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：启动日志、创建目录、装配客户端与各层依赖
//! 2. **后台循环**：拉起队列工作循环
//! 3. **更新分发**：长轮询拉取入站事件并逐条分发
//! 4. **资源所有者**：唯一持有 BotApiClient 的模块

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::clients::{BotApiClient, Transport};
use crate::config::Config;
use crate::handlers::BotContext;
use crate::services::{
    CommandConverter, DirectoryService, DocumentConverter, DocumentRenderer, LlmExtractor,
    MemoryDirectory, PageExtractor, TextRenderer,
};
use crate::store::{PollCollector, SessionStore, TaskQueue};
use crate::utils::logging;
use crate::workflow::{ContentFlow, PostingFlow};
use crate::orchestrator::worker::QueueWorker;

/// 拉取更新失败后的退避停顿
const POLL_BACKOFF: Duration = Duration::from_secs(3);

/// 应用主结构
pub struct App {
    client: Arc<BotApiClient>,
    context: Arc<BotContext>,
    queue: Arc<TaskQueue>,
    content_flow: Arc<ContentFlow>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.temp_dir).await?;
        tokio::fs::create_dir_all(&config.output_dir).await?;

        logging::log_startup(&config);

        let client = Arc::new(BotApiClient::new(&config));
        let transport: Arc<dyn Transport> = client.clone();

        let queue = Arc::new(TaskQueue::new(config.max_queue_size));
        let sessions = Arc::new(SessionStore::new());
        let polls = Arc::new(PollCollector::new());
        let directory: Arc<dyn DirectoryService> = Arc::new(MemoryDirectory::from_config(&config));
        let extractor: Arc<dyn PageExtractor> = Arc::new(LlmExtractor::new(&config));
        let converter: Arc<dyn DocumentConverter> =
            Arc::new(CommandConverter::new(&config.document_converter_cmd));
        let renderer: Arc<dyn DocumentRenderer> = Arc::new(TextRenderer::new());

        let content_flow = Arc::new(ContentFlow::new(
            transport.clone(),
            extractor,
            converter,
            sessions.clone(),
            &config,
        ));
        let posting_flow = Arc::new(PostingFlow::new(
            transport.clone(),
            sessions.clone(),
            directory.clone(),
        ));

        let context = Arc::new(BotContext {
            transport,
            directory,
            queue: queue.clone(),
            sessions,
            polls,
            posting_flow,
            renderer,
            config,
        });

        Ok(Self {
            client,
            context,
            queue,
            content_flow,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        // 拉起队列工作循环
        let worker = QueueWorker::new(self.queue.clone(), self.content_flow.clone());
        tokio::spawn(worker.run());
        info!("✅ 队列工作循环已就绪");

        // 更新分发循环
        let mut offset = 0i64;
        loop {
            match self.client.get_updates(offset).await {
                Ok((next_offset, events)) => {
                    offset = next_offset;
                    for event in events {
                        let context = self.context.clone();
                        tokio::spawn(async move {
                            if let Err(e) = context.dispatch(event).await {
                                error!("处理更新失败: {:#}", e);
                            }
                        });
                    }
                }
                Err(e) => {
                    warn!("拉取更新失败: {}", e);
                    tokio::time::sleep(POLL_BACKOFF).await;
                }
            }
        }
    }
}
