//! 学员反馈流程 - 流程层
//!
//! 流程顺序：学员代码 → 代入自动测试 → 沙箱执行 → 反馈阶段

use std::sync::Arc;

use tracing::info;

use crate::clients::LanguageModel;
use crate::error::{AppResult, SandboxError};
use crate::models::{ExerciseDocument, FeedbackReport};
use crate::services::{run_stage, FeedbackStage, SandboxService};
use crate::utils::truncate_text;
use crate::workflow::autotest::run_autotest;

/// 学员反馈流程
pub struct FeedbackFlow {
    model: Arc<dyn LanguageModel>,
    sandbox: Arc<SandboxService>,
    max_attempts: u32,
}

impl FeedbackFlow {
    pub fn new(model: Arc<dyn LanguageModel>, sandbox: Arc<SandboxService>, max_attempts: u32) -> Self {
        Self {
            model,
            sandbox,
            max_attempts,
        }
    }

    /// 运行学员提交并生成反馈
    ///
    /// # 参数
    /// - `exercise`: 练习
    /// - `learner_code`: 学员提交的代码，不能为空
    pub async fn run(
        &self,
        exercise: &ExerciseDocument,
        learner_code: &str,
    ) -> AppResult<FeedbackReport> {
        if learner_code.trim().is_empty() {
            return Err(SandboxError::EmptyCode.into());
        }

        info!(
            "[feedback \"{}\"] ▶️ 运行学员代码: {}",
            exercise.topic,
            truncate_text(learner_code.lines().next().unwrap_or_default(), 60)
        );
        let execution = run_autotest(&self.sandbox, exercise, learner_code).await?;
        info!(
            "[feedback \"{}\"] 自动测试 exit_code {}，超时 {}",
            exercise.topic, execution.exit_code, execution.timed_out
        );

        let report = run_stage(
            self.model.as_ref(),
            &FeedbackStage {
                learner_code,
                exercise,
                execution: &execution,
            },
            self.max_attempts,
        )
        .await?;
        info!("[feedback \"{}\"] ✓ 结论: {}", exercise.topic, report.verdict);
        Ok(report)
    }
}
