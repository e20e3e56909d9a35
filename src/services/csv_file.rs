//! 行式产物文件的写入与解析 - 业务能力层
//!
//! 固定列序：questions, option1..option5, answer（1-based 正确选项序号）,
//! explanation, type, section。type 与 section 为固定分类列，恒为 "1"

use anyhow::{Context, Result};
use std::path::Path;

use crate::models::{Question, MAX_OPTIONS, MIN_OPTIONS};

/// 产物文件的列头
const HEADERS: [&str; 10] = [
    "questions", "option1", "option2", "option3", "option4", "option5", "answer", "explanation",
    "type", "section",
];

/// 把题目列表写为产物文件
pub fn questions_to_csv(questions: &[Question], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("创建产物文件失败: {}", path.display()))?;

    writer.write_record(HEADERS)?;

    for question in questions {
        let mut record: Vec<String> = Vec::with_capacity(HEADERS.len());
        record.push(question.text.clone());
        for i in 0..MAX_OPTIONS {
            record.push(question.options.get(i).cloned().unwrap_or_default());
        }
        record.push((question.correct_index + 1).to_string());
        record.push(question.explanation.clone().unwrap_or_default());
        record.push("1".to_string());
        record.push("1".to_string());
        writer.write_record(&record)?;
    }

    writer
        .flush()
        .with_context(|| format!("写入产物文件失败: {}", path.display()))?;
    Ok(())
}

/// 从导入的文件内容解析题目列表
///
/// 行映射规则与产物格式对称：
/// - questions 为空的行跳过
/// - 依次收集非空的 option1..option5
/// - 选项少于 2 个的行跳过
/// - answer 按 1-based 解析，越界收敛到 [0, len-1]，解析失败取 0
pub fn parse_csv_bytes(content: &[u8]) -> Result<Vec<Question>> {
    let mut reader = csv::Reader::from_reader(content);
    let headers = reader.headers().context("读取列头失败")?.clone();

    let field = |record: &csv::StringRecord, name: &str| -> String {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| record.get(idx))
            .unwrap_or("")
            .trim()
            .to_string()
    };

    let mut questions = Vec::new();
    for record in reader.records() {
        let record = record.context("读取数据行失败")?;

        let text = field(&record, "questions");
        if text.is_empty() {
            continue;
        }

        let options: Vec<String> = (1..=MAX_OPTIONS)
            .map(|i| field(&record, &format!("option{}", i)))
            .filter(|o| !o.is_empty())
            .collect();
        if options.len() < MIN_OPTIONS {
            continue;
        }

        let answer: i64 = field(&record, "answer").parse().unwrap_or(1);
        let correct_index = (answer - 1).clamp(0, options.len() as i64 - 1) as usize;

        questions.push(
            Question::new(text, options, correct_index)
                .with_explanation(field(&record, "explanation")),
        );
    }

    Ok(questions)
}
