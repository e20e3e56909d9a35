//! 状态层（State Layer）
//!
//! ## 职责
//!
//! 本层持有交互循环与工作循环共享的全部可变状态：
//!
//! ### `task_queue` - 任务队列 / 准入门
//! - 有界 FIFO，每用户至多一条任务（排队或处理中）
//! - 排队 → 处理中迁移原子完成
//!
//! ### `session_store` - 会话存储
//! - 每用户一条多步流程会话
//! - 缺失时报告 SessionExpired 而非内部错误
//!
//! ### `poll_collection` - 投票收集
//! - 独立于会话的第二套状态机
//!
//! ## 设计原则
//!
//! 1. **只暴露操作级契约**：外部永远拿不到裸表引用
//! 2. **检查-写入原子**：每个操作整体持锁
//! 3. **锁不跨越挂起点**：所有方法都是同步的

pub mod poll_collection;
pub mod session_store;
pub mod task_queue;

pub use poll_collection::PollCollector;
pub use session_store::SessionStore;
pub use task_queue::TaskQueue;
