//! 任务上下文封装

use crate::models::{ProcessingMode, Task};

/// 任务上下文
///
/// 在各阶段之间传递任务的标识信息，避免到处传散装参数
#[derive(Debug, Clone, Copy)]
pub struct TaskCtx {
    pub owner_id: i64,
    pub mode: ProcessingMode,
}

impl TaskCtx {
    pub fn from_task(task: &Task) -> Self {
        Self {
            owner_id: task.owner_id,
            mode: task.payload.mode,
        }
    }
}
