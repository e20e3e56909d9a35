//! 内容处理流程 - 流程层
//!
//! 核心职责：定义"一条任务"的完整处理流程
//!
//! 流程顺序：
//! 1. 规范化：原始输入 → 有序页面图片（失败即中止并报告原因）
//! 2. 提取：有界并发遍历页面，进度按完成顺序回调，结果按源页顺序聚合
//! 3. 物化：清洗过滤后写入行式产物文件，挂到会话上
//! 4. 通知：下发产物和后续动作选择

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::clients::{InlineButton, Transport};
use crate::config::{Config, PageFailurePolicy};
use crate::error::PipelineError;
use crate::models::{
    sanitize_questions, PageImage, ProcessingMode, Question, Task, TaskContentKind,
};
use crate::services::{csv_file, is_image_file, DocumentConverter, PageExtractor};
use crate::store::SessionStore;
use crate::workflow::task_ctx::TaskCtx;
use crate::workflow::ProgressFn;

/// 内容处理流程
///
/// - 编排单条任务的四个阶段
/// - 不持有队列，不关心任务从哪里来
/// - 只依赖业务能力（services）和会话存储
pub struct ContentFlow {
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn PageExtractor>,
    converter: Arc<dyn DocumentConverter>,
    sessions: Arc<SessionStore>,
    output_dir: PathBuf,
    temp_dir: PathBuf,
    max_concurrent_pages: usize,
    page_failure_policy: PageFailurePolicy,
}

impl ContentFlow {
    pub fn new(
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn PageExtractor>,
        converter: Arc<dyn DocumentConverter>,
        sessions: Arc<SessionStore>,
        config: &Config,
    ) -> Self {
        Self {
            transport,
            extractor,
            converter,
            sessions,
            output_dir: PathBuf::from(&config.output_dir),
            temp_dir: PathBuf::from(&config.temp_dir),
            max_concurrent_pages: config.max_concurrent_pages.max(1),
            page_failure_policy: config.page_failure_policy,
        }
    }

    /// 处理单条任务
    pub async fn process(&self, task: Task) -> Result<()> {
        let ctx = TaskCtx::from_task(&task);
        info!(
            "[用户 {}] 🚚 开始处理任务 ({} 个输入, 模式: {})",
            ctx.owner_id,
            task.payload.inputs.len(),
            ctx.mode.as_str()
        );

        let status_text = match task.payload.content_kind {
            TaskContentKind::Document => "🔄 Processing document...",
            TaskContentKind::Images => "🔄 Processing images...",
        };
        let status = self
            .transport
            .send_message(ctx.owner_id, status_text, None)
            .await?;

        // ========== 阶段 1: 规范化 ==========
        let pages = match self.normalize(&task).await {
            Ok(pages) => pages,
            Err(e) => {
                // 中止：释放原始输入并报告具体原因，不自动重试
                self.release_files(&task.payload.inputs).await;
                self.sessions.clear(ctx.owner_id);
                let _ = self
                    .transport
                    .edit_message(
                        status.chat_id,
                        status.message_id,
                        &format!("❌ Error: {}", e),
                        None,
                    )
                    .await;
                return Err(PipelineError::NormalizeFailed {
                    reason: e.to_string(),
                    source: Some(e.into()),
                }
                .into());
            }
        };

        // 阶段 1 成功：未被页面复用的原始输入即刻释放
        self.release_raw_inputs(&task.payload.inputs, &pages).await;

        // ========== 阶段 2: 提取（有界并发） ==========
        let transport = self.transport.clone();
        let progress: ProgressFn = Arc::new(move |current, total| {
            let transport = transport.clone();
            Box::pin(async move {
                let _ = transport
                    .edit_message(
                        status.chat_id,
                        status.message_id,
                        &format!("🔍 {}/{}", current, total),
                        None,
                    )
                    .await;
            })
        });

        let extracted = self.extract_pages(&pages, ctx.mode, progress).await;
        self.release_pages(&pages).await;

        let questions = match extracted {
            Ok(questions) => sanitize_questions(questions),
            Err(e) => {
                self.sessions.clear(ctx.owner_id);
                let _ = self
                    .transport
                    .edit_message(
                        status.chat_id,
                        status.message_id,
                        &format!("❌ Error: {}", e),
                        None,
                    )
                    .await;
                return Err(e);
            }
        };

        if questions.is_empty() {
            self.sessions.clear(ctx.owner_id);
            let _ = self
                .transport
                .edit_message(
                    status.chat_id,
                    status.message_id,
                    "❌ No questions found",
                    None,
                )
                .await;
            return Err(PipelineError::NoQuestions.into());
        }

        // ========== 阶段 3: 物化 ==========
        let Some(session) = self.sessions.get(ctx.owner_id) else {
            // 用户已取消：丢弃结果关联
            info!("[用户 {}] 会话已取消，丢弃提取结果", ctx.owner_id);
            let _ = self
                .transport
                .edit_message(status.chat_id, status.message_id, "✅ Cancelled", None)
                .await;
            return Ok(());
        };

        let artifact = self
            .output_dir
            .join(format!("questions_{}.csv", session.session_id));
        csv_file::questions_to_csv(&questions, &artifact)?;

        let attached = self.sessions.update(ctx.owner_id, |s| {
            s.pending_questions = questions.clone();
            s.artifact_path = Some(artifact.clone());
        });
        if attached.is_err() {
            // 写产物期间被取消
            let _ = tokio::fs::remove_file(&artifact).await;
            return Ok(());
        }

        // ========== 阶段 4: 通知 ==========
        let keyboard = vec![
            vec![InlineButton::new(
                "📢 Post Quizzes",
                format!("post_{}", session.session_id),
            )],
            vec![InlineButton::new(
                "📄 Export Document",
                format!("export_{}", session.session_id),
            )],
        ];
        self.transport
            .send_file(
                ctx.owner_id,
                &artifact,
                &format!("mcq_{}.csv", session.session_id),
                &format!(
                    "✅ {} questions!\n\nChoose an action below:",
                    questions.len()
                ),
                Some(keyboard),
            )
            .await?;
        let _ = self
            .transport
            .edit_message(
                status.chat_id,
                status.message_id,
                &format!("✅ Done! {} questions", questions.len()),
                None,
            )
            .await;

        info!(
            "[用户 {}] ✓ 任务完成，共 {} 道题目",
            ctx.owner_id,
            questions.len()
        );
        Ok(())
    }

    /// 阶段 1: 把任务输入规范化为有序页面图片
    async fn normalize(&self, task: &Task) -> Result<Vec<PageImage>> {
        match task.payload.content_kind {
            TaskContentKind::Document => {
                let document = task
                    .payload
                    .inputs
                    .first()
                    .context("任务缺少文档输入")?;
                self.converter
                    .to_page_images(document, task.payload.page_range, &self.temp_dir)
                    .await
            }
            TaskContentKind::Images => {
                let mut pages = Vec::new();
                for (index, path) in task.payload.inputs.iter().enumerate() {
                    let name = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or_default();
                    if !is_image_file(name) {
                        bail!("不支持的图片格式: {}", name);
                    }
                    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                        bail!("图片文件不存在: {}", path.display());
                    }
                    pages.push(PageImage {
                        index,
                        path: path.clone(),
                    });
                }
                if pages.is_empty() {
                    bail!("没有可处理的图片");
                }
                Ok(pages)
            }
        }
    }

    /// 阶段 2: 有界并发提取所有页面
    ///
    /// 进度回调按完成顺序触发，聚合结果按源页顺序排列。
    /// 单页失败的处理由 `PageFailurePolicy` 决定
    pub async fn extract_pages(
        &self,
        pages: &[PageImage],
        mode: ProcessingMode,
        progress: ProgressFn,
    ) -> Result<Vec<Question>> {
        let total = pages.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_pages));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(total);

        for page in pages.iter().cloned() {
            let permit = semaphore.clone().acquire_owned().await?;
            let extractor = self.extractor.clone();
            let progress = progress.clone();
            let completed = completed.clone();

            let page_index = page.index;
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = extractor.extract_page(&page, mode).await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress(done, total).await;
                result
            });
            handles.push((page_index, handle));
        }

        // 按提交顺序（即源页顺序）归位结果
        let mut by_page: Vec<Vec<Question>> = Vec::with_capacity(total);
        let mut failed_pages = 0usize;
        for (page_index, handle) in handles {
            let page_result = match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(anyhow::anyhow!("提取任务执行失败: {}", join_err)),
            };
            match page_result {
                Ok(questions) => by_page.push(questions),
                Err(e) => match self.page_failure_policy {
                    PageFailurePolicy::SkipPage => {
                        warn!(
                            "⚠️ 第 {} 页提取失败，按 0 题处理: {}",
                            page_index + 1,
                            e
                        );
                        failed_pages += 1;
                        by_page.push(Vec::new());
                    }
                    PageFailurePolicy::AbortTask => {
                        return Err(PipelineError::PageExtractionFailed {
                            page_index,
                            source: e.into(),
                        }
                        .into());
                    }
                },
            }
        }

        if failed_pages > 0 {
            info!("⚠️ {}/{} 页提取失败", failed_pages, total);
        }
        Ok(by_page.into_iter().flatten().collect())
    }

    async fn release_files(&self, files: &[PathBuf]) {
        for file in files {
            if let Err(e) = tokio::fs::remove_file(file).await {
                debug!("删除文件失败 ({}): {}", file.display(), e);
            }
        }
    }

    /// 释放未被页面直接复用的原始输入
    ///
    /// 图片类任务的页面就是原始文件本身，删除推迟到提取完成后
    async fn release_raw_inputs(&self, inputs: &[PathBuf], pages: &[PageImage]) {
        let reused: HashSet<&PathBuf> = pages.iter().map(|p| &p.path).collect();
        for input in inputs {
            if !reused.contains(input) {
                if let Err(e) = tokio::fs::remove_file(input).await {
                    debug!("删除原始输入失败 ({}): {}", input.display(), e);
                }
            }
        }
    }

    async fn release_pages(&self, pages: &[PageImage]) {
        let files: Vec<PathBuf> = pages.iter().map(|p| p.path.clone()).collect();
        self.release_files(&files).await;
    }
}
