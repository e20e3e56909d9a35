use chrono::Local;
use std::path::PathBuf;

use crate::models::question::Question;

/// 处理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    /// 提取：转录页面上已有的题目
    Extraction,
    /// 生成：根据页面内容生成新题目
    Generation,
}

impl ProcessingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingMode::Extraction => "extraction",
            ProcessingMode::Generation => "generation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "extraction" => Some(ProcessingMode::Extraction),
            "generation" => Some(ProcessingMode::Generation),
            _ => None,
        }
    }
}

/// 会话内容来源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// 文档（按页转图片后提取）
    Document,
    /// 图片列表
    Images,
    /// 导入的表格行（已是结构化题目）
    ImportedRows,
}

/// 当前等待用户输入的字段
///
/// 同一时刻只有一个字段处于等待状态；未等待任何字段时收到的
/// 自由文本会被忽略，不报错
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpectedInput {
    #[default]
    None,
    /// 等待群组子话题 ID（0 表示不使用话题）
    DestinationTopic {
        group_id: i64,
    },
    /// 等待 "频道ID 频道名称" 格式的文本
    ChannelEntry,
    /// 等待 "群组ID 群组名称" 格式的文本
    GroupEntry,
    /// 等待导出文档的标题
    DocumentTitle,
}

/// 文档导出模板
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTemplate {
    /// 紧凑排版：题目与选项连排
    Compact,
    /// 详细排版：逐项展开并附解析
    Detailed,
    /// 答案表：仅题号与正确选项
    AnswerTable,
}

impl ExportTemplate {
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(ExportTemplate::Compact),
            2 => Some(ExportTemplate::Detailed),
            3 => Some(ExportTemplate::AnswerTable),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ExportTemplate::Compact => "Compact",
            ExportTemplate::Detailed => "Detailed",
            ExportTemplate::AnswerTable => "Answer Table",
        }
    }
}

/// 单用户会话：记录多步流程当前所处的步骤及各步累积的数据
///
/// 每个用户最多同时存在一个会话。创建于首次合规上传，
/// 在投递完成、用户取消或步骤发现缺失时销毁
#[derive(Debug, Clone)]
pub struct Session {
    pub owner_id: i64,
    pub session_id: String,
    pub expected_input: ExpectedInput,
    pub pending_questions: Vec<Question>,
    pub content_kind: ContentKind,
    pub raw_inputs: Vec<PathBuf>,
    pub chosen_mode: Option<ProcessingMode>,
    pub artifact_path: Option<PathBuf>,
    pub selected_destination: Option<i64>,
    pub export_template: Option<ExportTemplate>,
    pub export_title: Option<String>,
}

impl Session {
    pub fn new(owner_id: i64, content_kind: ContentKind) -> Self {
        let prefix = match content_kind {
            ContentKind::Document | ContentKind::Images => "gen",
            ContentKind::ImportedRows => "csv",
        };
        let session_id = format!(
            "{}_{}_{}",
            prefix,
            owner_id,
            Local::now().format("%Y%m%d_%H%M%S")
        );
        Self {
            owner_id,
            session_id,
            expected_input: ExpectedInput::None,
            pending_questions: Vec::new(),
            content_kind,
            raw_inputs: Vec::new(),
            chosen_mode: None,
            artifact_path: None,
            selected_destination: None,
            export_template: None,
            export_title: None,
        }
    }

    pub fn with_raw_inputs(mut self, raw_inputs: Vec<PathBuf>) -> Self {
        self.raw_inputs = raw_inputs;
        self
    }

    pub fn with_questions(mut self, questions: Vec<Question>) -> Self {
        self.pending_questions = questions;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_prefix_follows_content_kind() {
        assert!(Session::new(1, ContentKind::Document).session_id.starts_with("gen_1_"));
        assert!(Session::new(1, ContentKind::Images).session_id.starts_with("gen_1_"));
        assert!(Session::new(2, ContentKind::ImportedRows).session_id.starts_with("csv_2_"));
    }

    #[test]
    fn new_session_expects_no_input() {
        let session = Session::new(1, ContentKind::Document);
        assert_eq!(session.expected_input, ExpectedInput::None);
        assert!(session.pending_questions.is_empty());
        assert!(session.artifact_path.is_none());
    }
}
