use chrono::{DateTime, Local};
use std::path::PathBuf;

use crate::models::session::ProcessingMode;

/// 任务内容类型
///
/// 只有重量级处理（文档 / 图片）才进入队列；
/// 导入的表格行在接收时同步解析，不经过队列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskContentKind {
    Document,
    Images,
}

/// 任务负载
#[derive(Debug, Clone)]
pub struct TaskPayload {
    pub content_kind: TaskContentKind,
    pub inputs: Vec<PathBuf>,
    /// 可选的页码范围（1-based，闭区间）
    pub page_range: Option<(u32, u32)>,
    pub mode: ProcessingMode,
}

/// 一条队列任务
#[derive(Debug, Clone)]
pub struct Task {
    pub owner_id: i64,
    pub payload: TaskPayload,
    pub enqueued_at: DateTime<Local>,
}

impl Task {
    pub fn new(owner_id: i64, payload: TaskPayload) -> Self {
        Self {
            owner_id,
            payload,
            enqueued_at: Local::now(),
        }
    }
}

/// 规范化后的单页图片
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 源页序号（0-based），用于保证输出顺序
    pub index: usize,
    pub path: PathBuf,
}
