//! 机器人 API 客户端
//!
//! 封装所有与聊天平台 HTTP API 相关的调用逻辑，
//! 对外实现 `Transport` 接口，并提供长轮询拉取更新的能力

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

use crate::clients::transport::{InlineButton, Keyboard, QuizPost, SentMessage, Transport};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{InboundEvent, Question};

/// 机器人 API 客户端
pub struct BotApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl BotApiClient {
    /// 创建新的机器人客户端
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.bot_api_base_url.clone(),
            token: config.bot_token.clone(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// 调用 API 方法并返回 result 字段
    async fn call(&self, method: &str, payload: &Value) -> AppResult<Value> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::transport_request_failed(method, e))?;

        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| AppError::transport_request_failed(method, e))?;

        if !envelope.ok {
            return Err(AppError::transport_bad_response(
                method,
                envelope.description,
            ));
        }
        Ok(envelope.result)
    }

    /// 长轮询拉取更新
    ///
    /// # 参数
    /// - `offset`: 上次确认的更新偏移
    ///
    /// # 返回
    /// 返回下一次轮询的偏移和转换后的入站事件列表。
    /// 按钮回调在转换时即刻应答，编排层不感知平台细节
    pub async fn get_updates(&self, offset: i64) -> AppResult<(i64, Vec<InboundEvent>)> {
        let payload = json!({
            "offset": offset,
            "timeout": 30,
            "allowed_updates": ["message", "callback_query"],
        });
        let result = self.call("getUpdates", &payload).await?;
        let updates: Vec<WireUpdate> = serde_json::from_value(result)
            .map_err(|e| AppError::transport_request_failed("getUpdates", e))?;

        let mut next_offset = offset;
        let mut events = Vec::new();

        for update in updates {
            next_offset = next_offset.max(update.update_id + 1);

            if let Some(cq) = &update.callback_query {
                // 回调必须应答，否则客户端按钮会一直转圈
                if let Err(e) = self.answer_callback(&cq.id).await {
                    debug!("应答回调失败: {}", e);
                }
            }

            match convert_update(update) {
                Some(event) => events.push(event),
                None => debug!("忽略无法识别的更新"),
            }
        }

        Ok((next_offset, events))
    }

    async fn answer_callback(&self, callback_id: &str) -> AppResult<()> {
        self.call(
            "answerCallbackQuery",
            &json!({ "callback_query_id": callback_id }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for BotApiClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> AppResult<SentMessage> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(keyboard) = keyboard {
            payload["reply_markup"] = keyboard_json(&keyboard);
        }

        let result = self.call("sendMessage", &payload).await?;
        let message: WireMessage = serde_json::from_value(result)
            .map_err(|e| AppError::transport_request_failed("sendMessage", e))?;
        Ok(SentMessage {
            chat_id,
            message_id: message.message_id,
        })
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> AppResult<()> {
        let mut payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(keyboard) = keyboard {
            payload["reply_markup"] = keyboard_json(&keyboard);
        }
        self.call("editMessageText", &payload).await?;
        Ok(())
    }

    async fn send_file(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        caption: &str,
        keyboard: Option<Keyboard>,
    ) -> AppResult<SentMessage> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            AppError::File(crate::error::FileError::ReadFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })?;

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "Markdown".to_string())
            .part("document", part);
        if let Some(keyboard) = keyboard {
            form = form.text("reply_markup", keyboard_json(&keyboard).to_string());
        }

        let response = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::transport_request_failed("sendDocument", e))?;

        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| AppError::transport_request_failed("sendDocument", e))?;
        if !envelope.ok {
            return Err(AppError::transport_bad_response(
                "sendDocument",
                envelope.description,
            ));
        }

        let message: WireMessage = serde_json::from_value(envelope.result)
            .map_err(|e| AppError::transport_request_failed("sendDocument", e))?;
        Ok(SentMessage {
            chat_id,
            message_id: message.message_id,
        })
    }

    async fn send_quiz(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        quiz: &QuizPost,
    ) -> AppResult<()> {
        let options: Vec<Value> = quiz.options.iter().map(|o| json!({ "text": o })).collect();
        let mut payload = json!({
            "chat_id": chat_id,
            "question": quiz.question,
            "options": options,
            "type": "quiz",
            "correct_option_id": quiz.correct_index,
            "is_anonymous": true,
        });
        if let Some(explanation) = &quiz.explanation {
            payload["explanation"] = json!(explanation);
        }
        if let Some(thread_id) = thread_id {
            payload["message_thread_id"] = json!(thread_id);
        }
        self.call("sendPoll", &payload).await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> AppResult<()> {
        self.call(
            "deleteMessage",
            &json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> AppResult<()> {
        let result = self
            .call("getFile", &json!({ "file_id": file_id }))
            .await?;
        let file: WireFile = serde_json::from_value(result)
            .map_err(|e| AppError::transport_request_failed("getFile", e))?;

        let file_path = file.file_path.ok_or_else(|| {
            AppError::transport_bad_response("getFile", Some("缺少 file_path".to_string()))
        })?;

        let url = format!("{}/file/bot{}/{}", self.base_url, self.token, file_path);
        let bytes = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| download_failed(file_id, e))?
            .bytes()
            .await
            .map_err(|e| download_failed(file_id, e))?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| AppError::file_write_failed(dest.display().to_string(), e))?;

        debug!("已下载文件 {} → {}", file_id, dest.display());
        Ok(())
    }
}

fn download_failed(file_id: &str, err: reqwest::Error) -> AppError {
    AppError::Transport(crate::error::TransportError::DownloadFailed {
        file_id: file_id.to_string(),
        source: Box::new(err),
    })
}

/// 键盘转为平台 JSON 结构
fn keyboard_json(keyboard: &[Vec<InlineButton>]) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({ "text": b.text, "callback_data": b.data }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

// ========== 平台消息结构 ==========

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    result: Value,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUpdate {
    update_id: i64,
    message: Option<WireMessage>,
    callback_query: Option<WireCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    message_id: i64,
    from: Option<WireUser>,
    #[serde(default)]
    chat: Option<WireChat>,
    message_thread_id: Option<i64>,
    text: Option<String>,
    document: Option<WireDocument>,
    photo: Option<Vec<WirePhotoSize>>,
    poll: Option<WirePoll>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WireDocument {
    file_id: String,
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePhotoSize {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct WirePoll {
    question: String,
    options: Vec<WirePollOption>,
    #[serde(rename = "type")]
    poll_type: String,
    correct_option_id: Option<usize>,
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePollOption {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WireCallbackQuery {
    id: String,
    from: WireUser,
    message: Option<WireMessage>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireFile {
    file_path: Option<String>,
}

/// 把一条平台更新转换为入站事件
fn convert_update(update: WireUpdate) -> Option<InboundEvent> {
    if let Some(cq) = update.callback_query {
        let message = cq.message?;
        return Some(InboundEvent::Callback {
            user_id: cq.from.id,
            chat_id: message.chat.map(|c| c.id).unwrap_or(cq.from.id),
            message_id: message.message_id,
            data: cq.data?,
        });
    }

    let message = update.message?;
    let user_id = message.from.as_ref()?.id;
    let chat_id = message.chat.as_ref().map(|c| c.id).unwrap_or(user_id);

    if let Some(poll) = message.poll {
        let options: Vec<String> = poll.options.into_iter().map(|o| o.text).collect();
        let is_quiz = poll.poll_type == "quiz";
        let correct_index = if is_quiz {
            poll.correct_option_id.unwrap_or(0)
        } else {
            0
        };
        let question = Question::new(poll.question, options, correct_index)
            .with_explanation(poll.explanation.unwrap_or_default());
        return Some(InboundEvent::QuizPoll {
            user_id,
            chat_id,
            message_id: message.message_id,
            question,
            is_quiz,
        });
    }

    if let Some(document) = message.document {
        return Some(InboundEvent::Document {
            user_id,
            chat_id,
            file_id: document.file_id,
            file_name: document.file_name.unwrap_or_default(),
        });
    }

    if let Some(photo) = message.photo {
        // 平台按分辨率升序给出多个尺寸，取最大的
        let file_id = photo.into_iter().last()?.file_id;
        return Some(InboundEvent::Photo {
            user_id,
            chat_id,
            file_id,
        });
    }

    let text = message.text?;
    if let Some(stripped) = text.strip_prefix('/') {
        let mut parts = stripped.split_whitespace();
        let name = parts.next()?.split('@').next()?.to_string();
        let args = parts.map(|s| s.to_string()).collect();
        return Some(InboundEvent::Command {
            user_id,
            chat_id,
            thread_id: message.message_thread_id,
            name,
            args,
        });
    }

    Some(InboundEvent::Text {
        user_id,
        chat_id,
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_message(json_value: Value) -> WireUpdate {
        serde_json::from_value(json!({ "update_id": 1, "message": json_value })).unwrap()
    }

    #[test]
    fn command_message_is_parsed_with_args() {
        let update = wire_message(json!({
            "message_id": 10,
            "from": { "id": 7 },
            "chat": { "id": -100 },
            "text": "/authorize@my_bot 12345"
        }));
        match convert_update(update) {
            Some(InboundEvent::Command {
                user_id,
                chat_id,
                name,
                args,
                ..
            }) => {
                assert_eq!(user_id, 7);
                assert_eq!(chat_id, -100);
                assert_eq!(name, "authorize");
                assert_eq!(args, vec!["12345"]);
            }
            other => panic!("意外的事件: {:?}", other),
        }
    }

    #[test]
    fn quiz_poll_message_becomes_question() {
        let update = wire_message(json!({
            "message_id": 11,
            "from": { "id": 7 },
            "chat": { "id": 7 },
            "poll": {
                "question": "1+1=?",
                "options": [{ "text": "1" }, { "text": "2" }],
                "type": "quiz",
                "correct_option_id": 1,
                "explanation": "算术"
            }
        }));
        match convert_update(update) {
            Some(InboundEvent::QuizPoll {
                question, is_quiz, ..
            }) => {
                assert!(is_quiz);
                assert_eq!(question.text, "1+1=?");
                assert_eq!(question.correct_index, 1);
                assert_eq!(question.explanation.as_deref(), Some("算术"));
            }
            other => panic!("意外的事件: {:?}", other),
        }
    }

    #[test]
    fn regular_poll_defaults_to_first_option() {
        let update = wire_message(json!({
            "message_id": 12,
            "from": { "id": 7 },
            "chat": { "id": 7 },
            "poll": {
                "question": "喜欢哪个？",
                "options": [{ "text": "A" }, { "text": "B" }],
                "type": "regular"
            }
        }));
        match convert_update(update) {
            Some(InboundEvent::QuizPoll {
                question, is_quiz, ..
            }) => {
                assert!(!is_quiz);
                assert_eq!(question.correct_index, 0);
            }
            other => panic!("意外的事件: {:?}", other),
        }
    }

    #[test]
    fn largest_photo_size_is_selected() {
        let update = wire_message(json!({
            "message_id": 13,
            "from": { "id": 7 },
            "chat": { "id": 7 },
            "photo": [{ "file_id": "small" }, { "file_id": "big" }]
        }));
        match convert_update(update) {
            Some(InboundEvent::Photo { file_id, .. }) => assert_eq!(file_id, "big"),
            other => panic!("意外的事件: {:?}", other),
        }
    }

    #[test]
    fn keyboard_serializes_to_inline_rows() {
        let keyboard = vec![vec![InlineButton::new("📢 Post", "post_x")]];
        let value = keyboard_json(&keyboard);
        assert_eq!(
            value["inline_keyboard"][0][0],
            json!({ "text": "📢 Post", "callback_data": "post_x" })
        );
    }
}
