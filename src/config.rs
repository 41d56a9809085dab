use std::time::Duration;

use crate::error::ConfigError;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时处理的主题数量
    pub max_concurrent_topics: usize,
    /// 评审意见 TOML 文件存放目录
    pub comments_folder: String,
    /// 结果输出文件（JSON）
    pub output_file: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    // --- 检索 / 流程配置 ---
    /// 复用已有练习所需的最低相似度
    pub similarity_threshold: f64,
    /// 每次检索返回的候选数量
    pub retrieval_k: usize,
    /// 单个提示阶段的解析尝试次数
    pub stage_max_attempts: u32,
    /// 校验 / 修正循环的最大轮数
    pub max_validation_rounds: u32,
    /// 修 bug 循环的最大轮数
    pub max_bugfix_rounds: u32,
    // --- 沙箱配置 ---
    pub sandbox_image: String,
    pub sandbox_memory_limit: String,
    pub sandbox_cpu_quota: f64,
    pub sandbox_pids_limit: u32,
    pub sandbox_tmpfs_size: String,
    pub sandbox_default_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_topics: 8,
            comments_folder: "input_toml".to_string(),
            output_file: "micro_projects.json".to_string(),
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            llm_temperature: 0.3,
            llm_max_tokens: 4096,
            similarity_threshold: 0.7,
            retrieval_k: 5,
            stage_max_attempts: 3,
            max_validation_rounds: 3,
            max_bugfix_rounds: 3,
            sandbox_image: "aipg-sandbox:latest".to_string(),
            sandbox_memory_limit: "128m".to_string(),
            sandbox_cpu_quota: 0.5,
            sandbox_pids_limit: 128,
            sandbox_tmpfs_size: "64m".to_string(),
            sandbox_default_timeout_secs: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_topics: env_parse("MAX_CONCURRENT_TOPICS", default.max_concurrent_topics),
            comments_folder: std::env::var("COMMENTS_FOLDER").unwrap_or(default.comments_folder),
            output_file: std::env::var("OUTPUT_FILE").unwrap_or(default.output_file),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            verbose_logging: env_parse("VERBOSE_LOGGING", default.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_temperature: env_parse("LLM_TEMPERATURE", default.llm_temperature),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS", default.llm_max_tokens),
            similarity_threshold: env_parse("SIMILARITY_THRESHOLD", default.similarity_threshold),
            retrieval_k: env_parse("RETRIEVAL_K", default.retrieval_k),
            stage_max_attempts: env_parse("STAGE_MAX_ATTEMPTS", default.stage_max_attempts),
            max_validation_rounds: env_parse("MAX_VALIDATION_ROUNDS", default.max_validation_rounds),
            max_bugfix_rounds: env_parse("MAX_BUGFIX_ROUNDS", default.max_bugfix_rounds),
            sandbox_image: std::env::var("SANDBOX_IMAGE").unwrap_or(default.sandbox_image),
            sandbox_memory_limit: std::env::var("SANDBOX_MEMORY_LIMIT").unwrap_or(default.sandbox_memory_limit),
            sandbox_cpu_quota: env_parse("SANDBOX_CPU_QUOTA", default.sandbox_cpu_quota),
            sandbox_pids_limit: env_parse("SANDBOX_PIDS_LIMIT", default.sandbox_pids_limit),
            sandbox_tmpfs_size: std::env::var("SANDBOX_TMPFS_SIZE").unwrap_or(default.sandbox_tmpfs_size),
            sandbox_default_timeout_secs: env_parse("SANDBOX_DEFAULT_TIMEOUT_SECS", default.sandbox_default_timeout_secs),
        }
    }

    /// 检查取值范围，避免带着无意义的配置启动
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(invalid("SIMILARITY_THRESHOLD", self.similarity_threshold, "必须在 [0, 1] 之间"));
        }
        if self.max_concurrent_topics == 0 {
            return Err(invalid("MAX_CONCURRENT_TOPICS", self.max_concurrent_topics, "必须大于 0"));
        }
        if self.stage_max_attempts == 0 {
            return Err(invalid("STAGE_MAX_ATTEMPTS", self.stage_max_attempts, "必须大于 0"));
        }
        if self.sandbox_default_timeout_secs == 0 {
            return Err(invalid("SANDBOX_DEFAULT_TIMEOUT_SECS", self.sandbox_default_timeout_secs, "必须大于 0"));
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            similarity_threshold: self.similarity_threshold,
            stage_max_attempts: self.stage_max_attempts,
            max_validation_rounds: self.max_validation_rounds,
            max_bugfix_rounds: self.max_bugfix_rounds,
        }
    }

    pub fn sandbox_settings(&self) -> SandboxSettings {
        SandboxSettings {
            image: self.sandbox_image.clone(),
            memory_limit: self.sandbox_memory_limit.clone(),
            cpu_quota: self.sandbox_cpu_quota,
            pids_limit: self.sandbox_pids_limit,
            tmpfs_size: self.sandbox_tmpfs_size.clone(),
            default_timeout: Duration::from_secs(self.sandbox_default_timeout_secs),
        }
    }

    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            api_key: self.llm_api_key.clone(),
            api_base_url: self.llm_api_base_url.clone(),
            model_name: self.llm_model_name.clone(),
            temperature: self.llm_temperature,
            max_tokens: self.llm_max_tokens,
        }
    }
}

/// 单主题流程的参数
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    pub similarity_threshold: f64,
    pub stage_max_attempts: u32,
    pub max_validation_rounds: u32,
    pub max_bugfix_rounds: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Config::default().pipeline_settings()
    }
}

/// Docker 沙箱的资源限制
#[derive(Clone, Debug, PartialEq)]
pub struct SandboxSettings {
    pub image: String,
    pub memory_limit: String,
    pub cpu_quota: f64,
    pub pids_limit: u32,
    pub tmpfs_size: String,
    pub default_timeout: Duration,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Config::default().sandbox_settings()
    }
}

/// LLM 客户端参数
#[derive(Clone, Debug)]
pub struct LlmSettings {
    pub api_key: String,
    pub api_base_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn invalid(name: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
