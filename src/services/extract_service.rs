//! 页面提取服务 - 业务能力层
//!
//! 只负责"单页图片 → 题目列表"能力，不关心流程
//!
//! ## 职责
//! - 按处理模式构建提示词
//! - 调用提取客户端
//! - 解析并校验模型响应
//! - 只处理单个页面，不出现 Vec<PageImage>

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::clients::ExtractionClient;
use crate::config::Config;
use crate::models::{PageImage, ProcessingMode, Question};

/// 页面提取能力接口
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// 从单页图片提取零或多道题目
    async fn extract_page(&self, page: &PageImage, mode: ProcessingMode) -> Result<Vec<Question>>;
}

const SYSTEM_PROMPT: &str = "你是一个专业的选择题整理助手。\
只输出 JSON 数组，不要输出任何其他文字。\
每个元素包含 text（题干）、options（2-5 个选项）、\
correct_index（0-based 正确选项索引）、explanation（可选解析）。";

fn prompt_for_mode(mode: ProcessingMode) -> &'static str {
    match mode {
        ProcessingMode::Extraction => {
            "请转录这张图片中已有的所有选择题，保持原文不变。\
             没有选择题时输出空数组 []。"
        }
        ProcessingMode::Generation => {
            "请根据这张图片的内容出题，生成尽可能多的高质量选择题。\
             无法出题时输出空数组 []。"
        }
    }
}

/// 基于 LLM 的页面提取服务
pub struct LlmExtractor {
    client: ExtractionClient,
}

impl LlmExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            client: ExtractionClient::new(config),
        }
    }
}

#[async_trait]
impl PageExtractor for LlmExtractor {
    async fn extract_page(&self, page: &PageImage, mode: ProcessingMode) -> Result<Vec<Question>> {
        let data_url = encode_image(&page.path).await?;

        let response = self
            .client
            .ask_with_image(SYSTEM_PROMPT, prompt_for_mode(mode), &data_url)
            .await
            .with_context(|| format!("第 {} 页提取调用失败", page.index + 1))?;

        let questions = convert_questions(parse_questions(&response)?);
        debug!("第 {} 页解析出 {} 道题目", page.index + 1, questions.len());
        Ok(questions)
    }
}

/// 读取图片文件并编码为 data URL
async fn encode_image(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("读取页面图片失败: {}", path.display()))?;
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    };
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

/// 模型响应中的原始题目结构
#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(alias = "question", alias = "question_description")]
    text: String,
    options: Vec<String>,
    #[serde(alias = "correct_answer_index", alias = "answer_index", default)]
    correct_index: usize,
    #[serde(default)]
    explanation: Option<String>,
}

/// 解析模型响应为题目列表
///
/// 兼容 ```json 代码块包裹的输出；
/// 选项少于 2 个的题目在此处排除，索引收敛到有效范围
fn parse_questions(response: &str) -> Result<Vec<RawQuestion>> {
    let payload = strip_code_fence(response);
    let raw: Vec<RawQuestion> = serde_json::from_str(payload)
        .with_context(|| format!("无法解析提取响应: {}", crate::utils::truncate_text(response, 120)))?;
    Ok(raw)
}

fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

impl From<RawQuestion> for Question {
    fn from(raw: RawQuestion) -> Self {
        Question::new(raw.text, raw.options, raw.correct_index)
            .with_explanation(raw.explanation.unwrap_or_default())
    }
}

fn convert_questions(raw: Vec<RawQuestion>) -> Vec<Question> {
    raw.into_iter()
        .map(Question::from)
        .filter(|q| q.is_valid())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_response_is_parsed() {
        let response = r#"```json
[{"text": "1+1=?", "options": ["1", "2"], "correct_index": 1}]
```"#;
        let questions = convert_questions(parse_questions(response).unwrap());
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "1+1=?");
        assert_eq!(questions[0].correct_index, 1);
    }

    #[test]
    fn alias_fields_and_invalid_questions() {
        let response = r#"[
            {"question": "只有一个选项", "options": ["A"], "correct_answer_index": 0},
            {"question_description": "正常题目", "options": ["A", "B", "C"], "correct_answer_index": 9}
        ]"#;
        let questions = convert_questions(parse_questions(response).unwrap());
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "正常题目");
        // 越界索引被收敛
        assert_eq!(questions[0].correct_index, 2);
    }

    #[test]
    fn empty_array_is_zero_questions() {
        let questions = convert_questions(parse_questions("[]").unwrap());
        assert!(questions.is_empty());
    }

    #[test]
    fn garbage_response_is_an_error() {
        assert!(parse_questions("这不是 JSON").is_err());
    }
}
