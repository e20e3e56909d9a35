//! # MCQ Quiz Bot
//!
//! 把用户上传的文档 / 图片 / 导入题库转为结构化选择题，
//! 并以交互式测验的形式投递到目标频道或群组的机器人。
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 协议客户端层（Clients）
//! - `clients/` - 持有外部连接，只暴露能力
//! - `BotApiClient` - 聊天平台 HTTP 客户端，实现 `Transport`
//! - `ExtractionClient` - 提取模型客户端
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个单元
//! - `PageExtractor` - 单页 → 题目列表能力
//! - `QuizPoster` - 投递单条测验能力
//! - `csv_file` - 行式产物文件读写能力
//! - `DocumentRenderer` / `DirectoryService` / `DocumentConverter`
//!
//! ### ③ 状态层（Store）
//! - `store/` - 交互循环与工作循环共享的可变状态
//! - `TaskQueue` - 有界 FIFO + 准入控制 + 处理标记
//! - `SessionStore` - 每用户多步流程会话
//! - `PollCollector` - 投票收集状态机
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/` - 定义完整业务流程
//! - `ContentFlow` - 规范化 → 提取 → 物化 → 通知
//! - `PostingFlow` - 顺序投递 + 成败累计
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/app` - 应用装配与更新分发循环
//! - `orchestrator/worker` - 队列工作循环
//!
//! ### 处理器层（Handlers）
//! - `handlers/` - 命令 / 消息 / 回调分发，授权守卫前置

pub mod clients;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod store;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, QueueError, SessionError};
pub use models::{Question, Session, Task};
pub use orchestrator::App;
pub use store::{PollCollector, SessionStore, TaskQueue};
pub use workflow::{ContentFlow, PostReport, PostingFlow};
