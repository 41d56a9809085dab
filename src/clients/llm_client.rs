//! LLM API 客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use std::sync::OnceLock;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::LlmSettings;
use crate::error::LlmError;

/// 传输层最大尝试次数
const MAX_TRANSPORT_ATTEMPTS: u32 = 3;
/// 第一次重试前的等待时间，之后每次翻倍
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// 一条对话消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// 语言模型端口：一次 chat-completion 调用
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn query(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// 兼容 OpenAI API 的模型客户端
///
/// 底层 HTTP 客户端在第一次调用时才创建
pub struct OpenAiClient {
    settings: LlmSettings,
    client: OnceLock<Client<OpenAIConfig>>,
}

impl OpenAiClient {
    /// 创建新的 LLM 客户端
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            settings,
            client: OnceLock::new(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.settings.model_name
    }

    fn client(&self) -> &Client<OpenAIConfig> {
        self.client.get_or_init(|| {
            debug!("创建 LLM HTTP 客户端: {}", self.settings.api_base_url);
            let openai_config = OpenAIConfig::new()
                .with_api_key(&self.settings.api_key)
                .with_api_base(&self.settings.api_base_url);
            Client::with_config(openai_config)
        })
    }

    /// 构建请求
    fn build_request(
        &self,
        messages: &[ChatMessage],
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()?;

        CreateChatCompletionRequestArgs::default()
            .model(&self.settings.model_name)
            .messages(messages)
            .temperature(self.settings.temperature)
            .max_tokens(self.settings.max_tokens)
            .build()
            .map_err(|e| LlmError::RequestBuild(e.to_string()))
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn query(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let model = self.settings.model_name.clone();
        debug!(
            "调用 LLM API，模型: {}，消息数: {}，总长度: {} 字符",
            model,
            messages.len(),
            messages.iter().map(|m| m.content.len()).sum::<usize>()
        );

        let request = self.build_request(messages)?;

        let mut last_error = String::new();
        for attempt in 1..=MAX_TRANSPORT_ATTEMPTS {
            match self.client().chat().create(request.clone()).await {
                Ok(response) => {
                    debug!("LLM API 调用成功 (尝试 {}/{})", attempt, MAX_TRANSPORT_ATTEMPTS);
                    let content = response
                        .choices
                        .first()
                        .and_then(|choice| choice.message.content.clone())
                        .ok_or_else(|| LlmError::EmptyContent {
                            model: model.clone(),
                        })?;
                    return Ok(content.trim().to_string());
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < MAX_TRANSPORT_ATTEMPTS {
                        let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                        warn!(
                            "LLM API 调用失败 (尝试 {}/{}): {}，{:?} 后重试...",
                            attempt, MAX_TRANSPORT_ATTEMPTS, e, backoff
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(LlmError::ApiCallFailed {
            model,
            attempts: MAX_TRANSPORT_ATTEMPTS,
            message: last_error,
        })
    }
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, LlmError> {
    let build_err = |e: async_openai::error::OpenAIError| LlmError::RequestBuild(e.to_string());
    let content = message.content.as_str();
    Ok(match message.role {
        ChatRole::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()
                .map_err(build_err)?,
        ),
        ChatRole::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()
                .map_err(build_err)?,
        ),
        ChatRole::Assistant => ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(content)
                .build()
                .map_err(build_err)?,
        ),
    })
}
