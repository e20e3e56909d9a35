//! 流程层（Workflow Layer）
//!
//! ## 职责
//!
//! 本层定义完整的业务流程，向下只依赖业务能力（services）和状态层（store）。
//!
//! ### `content_flow` - 内容处理流程
//! - 规范化 → 提取（有界并发） → 物化 → 通知
//! - 进度按完成顺序回调，结果按源页顺序聚合
//!
//! ### `posting_flow` - 测验投递流程
//! - 按源顺序逐条投递，单条失败计数后继续
//! - 完成后无条件清除会话
//!
//! ### `task_ctx` - 任务上下文封装

use futures::future::BoxFuture;
use std::sync::Arc;

pub mod content_flow;
pub mod posting_flow;
pub mod task_ctx;

pub use content_flow::ContentFlow;
pub use posting_flow::{PostReport, PostingFlow};
pub use task_ctx::TaskCtx;

/// 进度回调：每完成一个单元后以 (已完成数, 总数) 调用
pub type ProgressFn = Arc<dyn Fn(usize, usize) -> BoxFuture<'static, ()> + Send + Sync>;
