use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// 选择题最少选项数
pub const MIN_OPTIONS: usize = 2;
/// 选择题最多选项数
pub const MAX_OPTIONS: usize = 5;

/// 选择题数据结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub text: String,
    pub options: Vec<String>,
    /// 正确选项索引（0-based），始终保证 < options.len()
    pub correct_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    pub fn new(text: impl Into<String>, options: Vec<String>, correct_index: usize) -> Self {
        let mut q = Self {
            text: text.into(),
            options,
            correct_index,
            explanation: None,
        };
        q.clamp_correct_index();
        q
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        let text = explanation.into();
        if !text.is_empty() {
            self.explanation = Some(text);
        }
        self
    }

    /// 选项数量是否在有效范围内
    ///
    /// 少于 2 个选项的题目无效，在上游被排除
    pub fn is_valid(&self) -> bool {
        self.options.len() >= MIN_OPTIONS && self.options.len() <= MAX_OPTIONS
    }

    /// 将正确选项索引收敛到有效范围
    pub fn clamp_correct_index(&mut self) {
        if !self.options.is_empty() && self.correct_index >= self.options.len() {
            self.correct_index = self.options.len() - 1;
        }
    }

    /// 返回清理后的副本：去除 [标签] 和链接，压缩空白
    pub fn cleaned(&self) -> Self {
        let mut q = Self {
            text: cleanup_text(&self.text),
            options: self.options.iter().map(|o| cleanup_text(o)).collect(),
            correct_index: self.correct_index,
            explanation: self
                .explanation
                .as_deref()
                .map(cleanup_text)
                .filter(|e| !e.is_empty()),
        };
        q.clamp_correct_index();
        q
    }
}

/// 清理文本：去除 [任意标签]、URL 链接，压缩多余空白
pub fn cleanup_text(text: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    static SPACE_RE: OnceLock<Regex> = OnceLock::new();

    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"\[[^\]]+\]").unwrap());
    let url_re =
        URL_RE.get_or_init(|| Regex::new(r"https?://\S+|www\.\S+|t\.me/\S+").unwrap());
    let space_re = SPACE_RE.get_or_init(|| Regex::new(r"\s+").unwrap());

    let text = tag_re.replace_all(text, "");
    let text = url_re.replace_all(&text, "");
    space_re.replace_all(&text, " ").trim().to_string()
}

/// 整理题目列表：清理文本、过滤无效题目、收敛索引
///
/// 顺序保持不变
pub fn sanitize_questions(questions: Vec<Question>) -> Vec<Question> {
    questions
        .into_iter()
        .map(|q| q.cleaned())
        .filter(|q| q.is_valid())
        .collect()
}
