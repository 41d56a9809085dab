//! 提示阶段与重试包装
//!
//! 一个阶段 = 提示词模板 + 解析器。解析失败时把模型回复和纠正说明
//! 追加到对话里再问一次，次数有上限。

use tracing::{debug, error, warn};

use crate::clients::{ChatMessage, LanguageModel};
use crate::error::{AppResult, ParseError, StageError};

/// 提示阶段
pub trait PromptStage: Send + Sync {
    type Output: Send;

    fn name(&self) -> &'static str;

    fn system_prompt(&self) -> String;

    fn user_prompt(&self) -> String;

    fn parse(&self, reply: &str) -> Result<Self::Output, ParseError>;

    /// 解析失败后追加的纠正说明
    fn corrective_instruction(&self, error: &ParseError) -> String {
        format!(
            "Your previous reply could not be parsed: {}\n\
             Reply again with the complete answer in exactly the requested format, \
             without any commentary.",
            error
        )
    }
}

/// 运行一个阶段
///
/// # 返回
/// 解析结果；重试耗尽时返回 `StageError::Exhausted`，模型调用错误直接向上传递
pub async fn run_stage<S: PromptStage>(
    model: &dyn LanguageModel,
    stage: &S,
    max_attempts: u32,
) -> AppResult<S::Output> {
    let max_attempts = max_attempts.max(1);
    let mut messages = vec![
        ChatMessage::system(stage.system_prompt()),
        ChatMessage::user(stage.user_prompt()),
    ];

    let mut attempt = 1;
    loop {
        let reply = model.query(&messages).await?;
        debug!(
            "阶段 {} 第 {} 次回复，长度: {} 字符",
            stage.name(),
            attempt,
            reply.len()
        );

        match stage.parse(&reply) {
            Ok(output) => return Ok(output),
            Err(parse_error) if attempt < max_attempts => {
                warn!(
                    "⚠️ 阶段 {} 解析失败 (尝试 {}/{}): {}",
                    stage.name(),
                    attempt,
                    max_attempts,
                    parse_error
                );
                messages.push(ChatMessage::assistant(reply));
                messages.push(ChatMessage::user(stage.corrective_instruction(&parse_error)));
                attempt += 1;
            }
            Err(parse_error) => {
                error!(
                    "❌ 阶段 {} 在 {} 次尝试后仍无法解析: {}",
                    stage.name(),
                    max_attempts,
                    parse_error
                );
                return Err(StageError::Exhausted {
                    stage: stage.name(),
                    attempts: max_attempts,
                    last: parse_error,
                }
                .into());
            }
        }
    }
}
