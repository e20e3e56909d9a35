//! 提取 API 客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use tracing::{debug, warn};

use crate::config::Config;

/// 提取 API 客户端
///
/// 只负责与模型服务通信，不关心提示词内容和响应解析
pub struct ExtractionClient {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl ExtractionClient {
    /// 创建新的提取客户端
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.extraction_api_key)
            .with_api_base(&config.extraction_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.extraction_model_name.clone(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// 携带单张页面图片调用模型
    ///
    /// # 参数
    /// - `system_message`: 系统消息
    /// - `user_message`: 用户消息文本
    /// - `image_data_url`: 页面图片的 data URL
    ///
    /// # 返回
    /// 返回模型的响应内容（字符串）
    pub async fn ask_with_image(
        &self,
        system_message: &str,
        user_message: &str,
        image_data_url: &str,
    ) -> Result<String> {
        let mut messages = Vec::new();

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_message)
            .build()?;
        messages.push(ChatCompletionRequestMessage::System(system_msg));

        // 构建包含文本和图片的用户消息
        let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
        content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
            ChatCompletionRequestMessageContentPartText {
                text: user_message.to_string(),
            },
        ));
        content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
            ChatCompletionRequestMessageContentPartImage {
                image_url: ImageUrl {
                    url: image_data_url.to_string(),
                    detail: Some(ImageDetail::Auto),
                },
            },
        ));

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
            .build()?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.3)
            .max_tokens(4096u32)
            .build()?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("提取 API 调用失败: {}", e);
            anyhow::anyhow!("提取 API 调用失败: {}", e)
        })?;

        debug!("提取 API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("提取返回内容为空"))?;

        Ok(content.trim().to_string())
    }
}
