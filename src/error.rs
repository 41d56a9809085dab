use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// `got` 字段的最大长度，超出部分截断
const MAX_GOT_LEN: usize = 500;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 模型输出结构不符合预期
    #[error("解析错误: {0}")]
    Parse(#[from] ParseError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 沙箱相关错误
    #[error("沙箱错误: {0}")]
    Sandbox(#[from] SandboxError),
    /// 提示阶段错误（重试耗尽）
    #[error("阶段错误: {0}")]
    Stage(#[from] StageError),
    /// 检索存储错误
    #[error("检索错误: {0}")]
    Retrieval(#[from] RetrievalError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件读写错误
    #[error("文件错误: {0}")]
    Io(#[from] std::io::Error),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 模型输出解析错误
///
/// 除了错误信息，还携带"期望什么 / 实际收到什么"，
/// 其 `Display` 文本会原样作为纠正上下文回传给模型。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParseError {
    pub message: String,
    pub expected: Vec<String>,
    pub got: Option<String>,
    pub details: BTreeMap<String, String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn expected<I, S>(mut self, expected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected = expected.into_iter().map(Into::into).collect();
        self
    }

    /// 记录实际收到的内容（超过 500 字符时截断）
    pub fn got(mut self, got: impl AsRef<str>) -> Self {
        let got = got.as_ref();
        let truncated = if got.chars().count() > MAX_GOT_LEN {
            got.chars().take(MAX_GOT_LEN - 3).collect::<String>() + "..."
        } else {
            got.to_string()
        };
        self.got = Some(truncated);
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.message.is_empty() {
            parts.push(self.message.clone());
        }
        if !self.expected.is_empty() {
            parts.push(format!("expected: {}", self.expected.join(", ")));
        }
        if let Some(got) = &self.got {
            parts.push(format!("got: {}", got));
        }
        if !self.details.is_empty() {
            let details: Vec<String> = self
                .details
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect();
            parts.push(format!("details: {{{}}}", details.join(", ")));
        }
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ParseError {}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// 构建请求失败
    #[error("构建 LLM 请求失败: {0}")]
    RequestBuild(String),
    /// API 调用失败（已重试）
    #[error("LLM API调用失败 (模型: {model}, 尝试 {attempts} 次): {message}")]
    ApiCallFailed {
        model: String,
        attempts: u32,
        message: String,
    },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
}

/// 沙箱相关错误
#[derive(Debug, Error)]
pub enum SandboxError {
    /// 代码为空或只包含空白
    #[error("代码不能为空")]
    EmptyCode,
}

/// 提示阶段错误
#[derive(Debug, Error)]
pub enum StageError {
    /// 解析重试耗尽，携带最后一次解析错误
    #[error("阶段 {stage} 在 {attempts} 次尝试后仍无法解析: {last}")]
    Exhausted {
        stage: &'static str,
        attempts: u32,
        last: ParseError,
    },
}

/// 检索存储错误
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// 存储后端不可用
    #[error("检索存储不可用: {0}")]
    Unavailable(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置值不合法
    #[error("配置项 {name} 的值 '{value}' 不合法: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON 序列化失败: {}", err))
    }
}

// ========== 便捷判断 ==========

impl AppError {
    /// 是否为阶段重试耗尽
    pub fn is_stage_exhausted(&self) -> bool {
        matches!(self, AppError::Stage(StageError::Exhausted { .. }))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
