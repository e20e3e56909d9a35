use crate::models::question::Question;

/// 入站事件
///
/// 传输层把各平台的原始更新转换为本枚举，编排层只依赖它，
/// 不接触任何平台专有的消息结构
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// 以 "/" 开头的命令消息
    Command {
        user_id: i64,
        chat_id: i64,
        thread_id: Option<i64>,
        name: String,
        args: Vec<String>,
    },
    /// 文档消息
    Document {
        user_id: i64,
        chat_id: i64,
        file_id: String,
        file_name: String,
    },
    /// 图片消息
    Photo {
        user_id: i64,
        chat_id: i64,
        file_id: String,
    },
    /// 测验投票消息（转发或直接发送）
    QuizPoll {
        user_id: i64,
        chat_id: i64,
        message_id: i64,
        question: Question,
        is_quiz: bool,
    },
    /// 普通文本消息
    Text {
        user_id: i64,
        chat_id: i64,
        text: String,
    },
    /// 按钮回调
    Callback {
        user_id: i64,
        chat_id: i64,
        message_id: i64,
        data: String,
    },
}
