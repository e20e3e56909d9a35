//! 任务队列 / 准入门 - 状态层
//!
//! ## 职责
//!
//! 1. **有界 FIFO**：待处理任务按先进先出排队，容量固定
//! 2. **准入控制**：每个用户最多一条任务（排队中或处理中）
//! 3. **处理标记**：与队列成员关系独立的 "处理中" 标志集合
//! 4. **原子操作**：所有检查-写入序列在同一把锁内完成
//!
//! 锁内不执行任何 await，锁不跨越挂起点

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use crate::error::QueueError;
use crate::models::{Task, TaskPayload};

/// 队列内部状态
///
/// 队列与处理标记放在同一把锁下，保证
/// "已排队 / 处理中" 的联合判断是原子的
#[derive(Debug, Default)]
struct QueueInner {
    queue: VecDeque<Task>,
    processing: HashSet<i64>,
}

/// 任务队列
#[derive(Debug)]
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
}

impl TaskQueue {
    /// 创建指定容量的队列
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            capacity,
        }
    }

    /// 任务准入
    ///
    /// # 返回
    /// - `Ok(position)`: 接受，返回队尾的 1-based 位置
    /// - `Err(AlreadyQueued)`: 该用户已有排队或处理中的任务
    /// - `Err(QueueFull)`: 队列已达容量上限
    pub fn enqueue(&self, owner_id: i64, payload: TaskPayload) -> Result<usize, QueueError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.processing.contains(&owner_id) {
            return Err(QueueError::AlreadyQueued);
        }
        if inner.queue.iter().any(|t| t.owner_id == owner_id) {
            return Err(QueueError::AlreadyQueued);
        }
        if inner.queue.len() >= self.capacity {
            return Err(QueueError::QueueFull {
                capacity: self.capacity,
            });
        }

        inner.queue.push_back(Task::new(owner_id, payload));
        Ok(inner.queue.len())
    }

    /// 取出队首任务（严格 FIFO，不标记处理中）
    pub fn dequeue(&self) -> Option<Task> {
        self.inner.lock().unwrap().queue.pop_front()
    }

    /// 取出队首任务并同时标记其归属用户为处理中
    ///
    /// 排队 → 处理中的状态迁移必须原子完成，否则并发的
    /// 准入检查可能在两个状态的间隙放行第二条任务
    pub fn pop_for_processing(&self) -> Option<Task> {
        let mut inner = self.inner.lock().unwrap();
        let task = inner.queue.pop_front()?;
        inner.processing.insert(task.owner_id);
        Some(task)
    }

    /// 查询用户任务的队列位置
    ///
    /// # 返回
    /// 0 表示不在队列中，否则为 1-based 位置
    pub fn position_of(&self, owner_id: i64) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .queue
            .iter()
            .position(|t| t.owner_id == owner_id)
            .map(|idx| idx + 1)
            .unwrap_or(0)
    }

    /// 标记用户为处理中
    pub fn mark_processing(&self, owner_id: i64) {
        self.inner.lock().unwrap().processing.insert(owner_id);
    }

    /// 清除用户的处理中标记
    pub fn clear_processing(&self, owner_id: i64) {
        self.inner.lock().unwrap().processing.remove(&owner_id);
    }

    /// 用户是否处于处理中
    pub fn is_processing(&self, owner_id: i64) -> bool {
        self.inner.lock().unwrap().processing.contains(&owner_id)
    }

    /// 用户是否已有排队或处理中的任务
    pub fn is_busy(&self, owner_id: i64) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.processing.contains(&owner_id)
            || inner.queue.iter().any(|t| t.owner_id == owner_id)
    }

    /// 驱逐用户：移除其排队任务并清除处理中标记
    ///
    /// 用于用户主动取消。已在途的提取调用无法被打断，
    /// 驱逐只保证不再接受新任务并丢弃结果关联
    pub fn evict(&self, owner_id: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.retain(|t| t.owner_id != owner_id);
        inner.processing.remove(&owner_id);
    }

    /// 当前排队任务数
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().queue.is_empty()
    }

    /// 队列容量
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
