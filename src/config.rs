use std::str::FromStr;

/// 单页提取失败时的处理策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageFailurePolicy {
    /// 跳过失败页面，视为该页 0 道题目（默认）
    SkipPage,
    /// 任意一页失败即中止整个任务
    AbortTask,
}

impl FromStr for PageFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" | "skip_page" => Ok(PageFailurePolicy::SkipPage),
            "abort" | "abort_task" => Ok(PageFailurePolicy::AbortTask),
            other => Err(format!("未知的页面失败策略: {}", other)),
        }
    }
}

/// 已有会话时收到新上传的处理策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionReplacePolicy {
    /// 拒绝新上传，提示任务进行中（默认，与队列准入行为一致）
    Reject,
    /// 静默替换旧会话
    Replace,
}

impl FromStr for SessionReplacePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(SessionReplacePolicy::Reject),
            "replace" => Ok(SessionReplacePolicy::Replace),
            other => Err(format!("未知的会话替换策略: {}", other)),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 机器人名称（展示用）
    pub bot_name: String,
    /// 机器人 API Token
    pub bot_token: String,
    /// 机器人 API 基础地址
    pub bot_api_base_url: String,
    /// 同时提取的页面数量
    pub max_concurrent_pages: usize,
    /// 任务队列容量上限
    pub max_queue_size: usize,
    /// 临时文件目录（下载的原始输入）
    pub temp_dir: String,
    /// 输出文件目录（生成的产物文件）
    pub output_dir: String,
    /// 是否启用授权检查
    pub auth_enabled: bool,
    /// 管理员用户 ID 列表
    pub sudo_user_ids: Vec<i64>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 单页提取失败策略
    pub page_failure_policy: PageFailurePolicy,
    /// 会话替换策略
    pub session_replace_policy: SessionReplacePolicy,
    /// 文档转图片的外部命令
    pub document_converter_cmd: String,
    // --- 提取服务配置 ---
    pub extraction_api_key: String,
    pub extraction_api_base_url: String,
    pub extraction_model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_name: "MCQ Quiz Bot".to_string(),
            bot_token: String::new(),
            bot_api_base_url: "https://api.telegram.org".to_string(),
            max_concurrent_pages: 5,
            max_queue_size: 10,
            temp_dir: "temp".to_string(),
            output_dir: "output".to_string(),
            auth_enabled: true,
            sudo_user_ids: Vec::new(),
            verbose_logging: false,
            page_failure_policy: PageFailurePolicy::SkipPage,
            session_replace_policy: SessionReplacePolicy::Reject,
            document_converter_cmd: "pdftoppm".to_string(),
            extraction_api_key: String::new(),
            extraction_api_base_url: "http://menshen.xdf.cn/v1".to_string(),
            extraction_model_name: "gemini-3.0-pro-preview".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            bot_name: std::env::var("BOT_NAME").unwrap_or(default.bot_name),
            bot_token: std::env::var("BOT_TOKEN").unwrap_or(default.bot_token),
            bot_api_base_url: std::env::var("BOT_API_BASE_URL").unwrap_or(default.bot_api_base_url),
            max_concurrent_pages: std::env::var("MAX_CONCURRENT_PAGES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_pages),
            max_queue_size: std::env::var("MAX_QUEUE_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_queue_size),
            temp_dir: std::env::var("TEMP_DIR").unwrap_or(default.temp_dir),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or(default.output_dir),
            auth_enabled: std::env::var("AUTH_ENABLED").ok().and_then(|v| v.parse().ok()).unwrap_or(default.auth_enabled),
            sudo_user_ids: std::env::var("SUDO_USER_IDS").map(|v| parse_id_list(&v)).unwrap_or(default.sudo_user_ids),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            page_failure_policy: std::env::var("PAGE_FAILURE_POLICY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.page_failure_policy),
            session_replace_policy: std::env::var("SESSION_REPLACE_POLICY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.session_replace_policy),
            document_converter_cmd: std::env::var("DOCUMENT_CONVERTER_CMD").unwrap_or(default.document_converter_cmd),
            extraction_api_key: std::env::var("EXTRACTION_API_KEY").unwrap_or(default.extraction_api_key),
            extraction_api_base_url: std::env::var("EXTRACTION_API_BASE_URL").unwrap_or(default.extraction_api_base_url),
            extraction_model_name: std::env::var("EXTRACTION_MODEL_NAME").unwrap_or(default.extraction_model_name),
        }
    }
}

/// 解析逗号分隔的用户 ID 列表
fn parse_id_list(value: &str) -> Vec<i64> {
    value
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_list_skips_invalid_entries() {
        assert_eq!(parse_id_list("1, 2,abc, 3"), vec![1, 2, 3]);
        assert_eq!(parse_id_list(""), Vec::<i64>::new());
    }

    #[test]
    fn policies_parse_from_str() {
        assert_eq!(
            "skip".parse::<PageFailurePolicy>().unwrap(),
            PageFailurePolicy::SkipPage
        );
        assert_eq!(
            "abort_task".parse::<PageFailurePolicy>().unwrap(),
            PageFailurePolicy::AbortTask
        );
        assert!("无效".parse::<PageFailurePolicy>().is_err());
        assert_eq!(
            "replace".parse::<SessionReplacePolicy>().unwrap(),
            SessionReplacePolicy::Replace
        );
    }
}
