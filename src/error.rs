use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 任务队列准入错误
    Queue(QueueError),
    /// 会话状态错误
    Session(SessionError),
    /// 内容处理管线错误
    Pipeline(PipelineError),
    /// 消息传输错误
    Transport(TransportError),
    /// 提取服务错误
    Extract(ExtractError),
    /// 文件操作错误
    File(FileError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Queue(e) => write!(f, "队列错误: {}", e),
            AppError::Session(e) => write!(f, "会话错误: {}", e),
            AppError::Pipeline(e) => write!(f, "管线错误: {}", e),
            AppError::Transport(e) => write!(f, "传输错误: {}", e),
            AppError::Extract(e) => write!(f, "提取错误: {}", e),
            AppError::File(e) => write!(f, "文件错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Queue(e) => Some(e),
            AppError::Session(e) => Some(e),
            AppError::Pipeline(e) => Some(e),
            AppError::Transport(e) => Some(e),
            AppError::Extract(e) => Some(e),
            AppError::File(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 任务队列准入错误
///
/// 用户可见，不自动重试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// 该用户已有排队或处理中的任务
    AlreadyQueued,
    /// 队列已满
    QueueFull {
        capacity: usize,
    },
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::AlreadyQueued => write!(f, "该用户已有排队或处理中的任务"),
            QueueError::QueueFull { capacity } => {
                write!(f, "队列已满 (容量: {})", capacity)
            }
        }
    }
}

impl std::error::Error for QueueError {}

/// 会话状态错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// 会话不存在或已过期，用户需要重新开始流程
    Expired {
        owner_id: i64,
    },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Expired { owner_id } => {
                write!(f, "会话不存在或已过期 (用户: {})", owner_id)
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// 内容处理管线错误
#[derive(Debug)]
pub enum PipelineError {
    /// 规范化阶段失败（无法读取文档或图片），整个任务中止
    NormalizeFailed {
        reason: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    /// 所有页面提取后没有得到任何有效题目
    NoQuestions,
    /// 单页提取失败（仅在 AbortTask 策略下向上传播）
    PageExtractionFailed {
        page_index: usize,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::NormalizeFailed { reason, .. } => {
                write!(f, "内容规范化失败: {}", reason)
            }
            PipelineError::NoQuestions => write!(f, "没有找到任何有效题目"),
            PipelineError::PageExtractionFailed { page_index, source } => {
                write!(f, "第 {} 页提取失败: {}", page_index + 1, source)
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::NormalizeFailed { source, .. } => source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn std::error::Error + 'static)),
            PipelineError::NoQuestions => None,
            PipelineError::PageExtractionFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

/// 消息传输错误
#[derive(Debug)]
pub enum TransportError {
    /// 网络请求失败
    RequestFailed {
        method: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// API 返回错误响应
    BadResponse {
        method: String,
        description: Option<String>,
    },
    /// 文件下载失败
    DownloadFailed {
        file_id: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::RequestFailed { method, source } => {
                write!(f, "传输请求失败 ({}): {}", method, source)
            }
            TransportError::BadResponse {
                method,
                description,
            } => {
                write!(f, "传输返回错误响应 ({}): {:?}", method, description)
            }
            TransportError::DownloadFailed { file_id, source } => {
                write!(f, "文件下载失败 ({}): {}", file_id, source)
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::RequestFailed { source, .. }
            | TransportError::DownloadFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 提取服务错误
#[derive(Debug)]
pub enum ExtractError {
    /// API 调用失败
    ApiCallFailed {
        model: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回内容为空
    EmptyContent {
        model: String,
    },
    /// 响应解析失败
    ParseFailed {
        response: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::ApiCallFailed { model, source } => {
                write!(f, "提取 API 调用失败 (模型: {}): {}", model, source)
            }
            ExtractError::EmptyContent { model } => {
                write!(f, "提取返回内容为空 (模型: {})", model)
            }
            ExtractError::ParseFailed { response, source } => {
                write!(f, "无法解析提取响应 (响应: {}): {}", response, source)
            }
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractError::ApiCallFailed { source, .. }
            | ExtractError::ParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 文件操作错误
#[derive(Debug)]
pub enum FileError {
    /// 读取文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文件失败
    WriteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 删除文件失败
    DeleteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// CSV 解析失败
    CsvParseFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::ReadFailed { path, source } => {
                write!(f, "读取文件失败 ({}): {}", path, source)
            }
            FileError::WriteFailed { path, source } => {
                write!(f, "写入文件失败 ({}): {}", path, source)
            }
            FileError::DeleteFailed { path, source } => {
                write!(f, "删除文件失败 ({}): {}", path, source)
            }
            FileError::CsvParseFailed { source } => {
                write!(f, "CSV解析失败: {}", source)
            }
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::ReadFailed { source, .. }
            | FileError::WriteFailed { source, .. }
            | FileError::DeleteFailed { source, .. }
            | FileError::CsvParseFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 环境变量不存在
    EnvVarNotFound {
        var_name: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
            ConfigError::EnvVarNotFound { var_name } => {
                write!(f, "环境变量 {} 不存在", var_name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        AppError::Queue(err)
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError::Session(err)
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        AppError::Transport(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Transport(TransportError::RequestFailed {
            method: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Extract(ExtractError::ParseFailed {
            response: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建传输请求失败错误
    pub fn transport_request_failed(
        method: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Transport(TransportError::RequestFailed {
            method: method.into(),
            source: Box::new(source),
        })
    }

    /// 创建传输错误响应错误
    pub fn transport_bad_response(
        method: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        AppError::Transport(TransportError::BadResponse {
            method: method.into(),
            description,
        })
    }

    /// 创建规范化失败错误
    pub fn normalize_failed(reason: impl Into<String>) -> Self {
        AppError::Pipeline(PipelineError::NormalizeFailed {
            reason: reason.into(),
            source: None,
        })
    }

    /// 创建提取 API 调用错误
    pub fn extract_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Extract(ExtractError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
