//! 测验投递服务 - 业务能力层
//!
//! 只负责"投递单条测验"能力，不关心流程
//!
//! ## 职责
//! - 按用户偏好给题干 / 解析加标注
//! - 收敛字段长度到平台限制
//! - 只处理单个 Question，不出现 Vec<Question>

use std::sync::Arc;

use crate::clients::{QuizPost, Transport};
use crate::error::AppResult;
use crate::models::Question;
use crate::services::directory::UserSettings;
use crate::utils::truncate_text;

/// 平台对测验题干的长度限制
const MAX_QUESTION_LEN: usize = 300;
/// 平台对单个选项的长度限制
const MAX_OPTION_LEN: usize = 100;
/// 平台对解析的长度限制
const MAX_EXPLANATION_LEN: usize = 200;

/// 测验投递服务
pub struct QuizPoster {
    transport: Arc<dyn Transport>,
}

impl QuizPoster {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// 投递单条测验到目标会话（可选子话题）
    pub async fn post_one(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        question: &Question,
        settings: &UserSettings,
    ) -> AppResult<()> {
        let quiz = build_quiz(question, settings);
        self.transport.send_quiz(chat_id, thread_id, &quiz).await
    }
}

/// 按用户偏好组装测验内容
fn build_quiz(question: &Question, settings: &UserSettings) -> QuizPost {
    let text = if settings.quiz_marker.is_empty() {
        question.text.clone()
    } else {
        format!("{} {}", settings.quiz_marker, question.text)
    };

    let options: Vec<String> = question
        .options
        .iter()
        .map(|o| truncate_text(o, MAX_OPTION_LEN))
        .collect();

    let explanation = match (&question.explanation, settings.explanation_tag.is_empty()) {
        (Some(explanation), false) => Some(format!("{}\n{}", explanation, settings.explanation_tag)),
        (Some(explanation), true) => Some(explanation.clone()),
        (None, false) => Some(settings.explanation_tag.clone()),
        (None, true) => None,
    }
    .map(|e| truncate_text(&e, MAX_EXPLANATION_LEN));

    // 发送前最后一道保险：索引永不越界
    let correct_index = question.correct_index.min(options.len().saturating_sub(1));

    QuizPost {
        question: truncate_text(&text, MAX_QUESTION_LEN),
        options,
        correct_index,
        explanation,
    }
}
