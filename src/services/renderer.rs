//! 文档渲染服务 - 业务能力层
//!
//! 把题目列表按模板渲染为可下发的文档文件。
//! 纯同步转换，不修改题目数据

use anyhow::{Context, Result};
use chrono::Local;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::models::{ExportTemplate, Question};

/// 文档渲染接口
pub trait DocumentRenderer: Send + Sync {
    /// 渲染题目列表，返回产出文件路径
    fn render(
        &self,
        questions: &[Question],
        template: ExportTemplate,
        title: &str,
        output_dir: &Path,
    ) -> Result<PathBuf>;
}

/// 纯文本排版实现
pub struct TextRenderer;

impl TextRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentRenderer for TextRenderer {
    fn render(
        &self,
        questions: &[Question],
        template: ExportTemplate,
        title: &str,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let mut body = String::new();
        let _ = writeln!(body, "{}", title);
        let _ = writeln!(body, "{}", "=".repeat(40));
        let _ = writeln!(body);

        for (number, question) in questions.iter().enumerate() {
            render_question(&mut body, template, number + 1, question);
        }

        let file_name = format!(
            "{}_{}.txt",
            sanitize_file_name(title),
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let path = output_dir.join(file_name);
        std::fs::write(&path, body)
            .with_context(|| format!("写入导出文档失败: {}", path.display()))?;
        Ok(path)
    }
}

fn render_question(body: &mut String, template: ExportTemplate, number: usize, question: &Question) {
    let letter = |idx: usize| (b'A' + idx as u8) as char;

    match template {
        ExportTemplate::Compact => {
            let options = question
                .options
                .iter()
                .enumerate()
                .map(|(i, o)| format!("{}. {}", letter(i), o))
                .collect::<Vec<_>>()
                .join("  ");
            let _ = writeln!(body, "{}. {}", number, question.text);
            let _ = writeln!(body, "   {}", options);
            let _ = writeln!(body, "   Ans: {}", letter(question.correct_index));
            let _ = writeln!(body);
        }
        ExportTemplate::Detailed => {
            let _ = writeln!(body, "{}. {}", number, question.text);
            for (i, option) in question.options.iter().enumerate() {
                let _ = writeln!(body, "   {}. {}", letter(i), option);
            }
            let _ = writeln!(body, "   Answer: {}", letter(question.correct_index));
            if let Some(explanation) = &question.explanation {
                let _ = writeln!(body, "   Explanation: {}", explanation);
            }
            let _ = writeln!(body);
        }
        ExportTemplate::AnswerTable => {
            let _ = writeln!(body, "{}. {}", number, letter(question.correct_index));
        }
    }
}

/// 去除文件名中的危险字符
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "questions".to_string()
    } else {
        cleaned
    }
}
