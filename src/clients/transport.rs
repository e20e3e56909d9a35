//! 消息传输抽象
//!
//! 编排层对聊天平台的全部要求：发消息、改消息、发文件、
//! 创建测验、删消息、下载文件。除此之外不做任何假设

use async_trait::async_trait;
use std::path::Path;

use crate::error::AppResult;

/// 内联按钮
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

/// 按钮键盘（按行排列）
pub type Keyboard = Vec<Vec<InlineButton>>;

/// 已发送消息的句柄，用于后续编辑或删除
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: i64,
}

/// 一条待投递的测验
#[derive(Debug, Clone)]
pub struct QuizPost {
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub explanation: Option<String>,
}

/// 消息传输接口
#[async_trait]
pub trait Transport: Send + Sync {
    /// 发送文本消息
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> AppResult<SentMessage>;

    /// 编辑已发送的消息（进度原地更新）
    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> AppResult<()>;

    /// 发送文件
    async fn send_file(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        caption: &str,
        keyboard: Option<Keyboard>,
    ) -> AppResult<SentMessage>;

    /// 在目标会话（可选子话题）创建一条交互式测验
    async fn send_quiz(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        quiz: &QuizPost,
    ) -> AppResult<()>;

    /// 删除消息
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> AppResult<()>;

    /// 下载用户上传的文件到本地路径
    async fn download_file(&self, file_id: &str, dest: &Path) -> AppResult<()>;
}
