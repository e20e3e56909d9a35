//! 处理器层（Handlers）
//!
//! ## 职责
//!
//! 把入站事件分发到对应的处理函数：
//!
//! ### `guard` - 授权守卫
//! - 显式守卫函数，命令处理前组合调用
//!
//! ### `commands` - 命令处理
//! - /start /help /settings /info /collectpolls /model /queue /cancel
//! - 管理员命令 /authorize /revoke /users
//!
//! ### `messages` - 消息处理
//! - 文档 / 图片 / 投票 / 自由文本
//!
//! ### `callbacks` - 按钮回调处理
//! - 模式选择、投递目标、导出、投票收集、目标管理

use anyhow::Result;
use std::sync::Arc;

use crate::clients::Transport;
use crate::config::Config;
use crate::models::InboundEvent;
use crate::services::{DirectoryService, DocumentRenderer};
use crate::store::{PollCollector, SessionStore, TaskQueue};
use crate::workflow::PostingFlow;

pub mod callbacks;
pub mod commands;
pub mod guard;
pub mod messages;

pub use guard::{AccessLevel, AuthDecision};

/// 处理器共享上下文
///
/// 持有分发入站事件所需的全部依赖
pub struct BotContext {
    pub transport: Arc<dyn Transport>,
    pub directory: Arc<dyn DirectoryService>,
    pub queue: Arc<TaskQueue>,
    pub sessions: Arc<SessionStore>,
    pub polls: Arc<PollCollector>,
    pub posting_flow: Arc<PostingFlow>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub config: Config,
}


impl BotContext {
    /// 分发一条入站事件
    pub async fn dispatch(&self, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::Command {
                user_id,
                chat_id,
                thread_id,
                name,
                args,
            } => commands::handle_command(self, user_id, chat_id, thread_id, &name, &args).await,
            InboundEvent::Document {
                user_id,
                chat_id,
                file_id,
                file_name,
            } => messages::handle_document(self, user_id, chat_id, &file_id, &file_name).await,
            InboundEvent::Photo {
                user_id,
                chat_id,
                file_id,
            } => messages::handle_photo(self, user_id, chat_id, &file_id).await,
            InboundEvent::QuizPoll {
                user_id,
                chat_id,
                message_id,
                question,
                is_quiz,
            } => messages::handle_poll(self, user_id, chat_id, message_id, question, is_quiz).await,
            InboundEvent::Text {
                user_id,
                chat_id,
                text,
            } => messages::handle_text(self, user_id, chat_id, &text).await,
            InboundEvent::Callback {
                user_id,
                chat_id,
                message_id,
                data,
            } => callbacks::handle_callback(self, user_id, chat_id, message_id, &data).await,
        }
    }
}
