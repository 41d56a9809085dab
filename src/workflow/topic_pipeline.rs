//! 单主题处理流程 - 流程层
//!
//! 核心职责：定义"一个主题"的完整处理流程
//!
//! 流程顺序：
//! 1. 检索 → 排序，命中阈值则直接复用
//! 2. 生成 → 校验 / 修正（有上限，失败回滚到循环前快照）
//! 3. 沙箱验证 → 修 bug（有上限）
//! 4. 保存

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::clients::LanguageModel;
use crate::config::PipelineSettings;
use crate::error::{AppError, AppResult};
use crate::models::{ExecutionResult, ExerciseDocument, ValidationReport};
use crate::services::{
    run_stage, BugFixingStage, ExerciseCorrectionStage, ExerciseGenerationStage,
    ExerciseValidationStage, RankingPort, RetrievalPort, SandboxService,
};
use crate::workflow::autotest::run_autotest;
use crate::workflow::topic_run::{TopicCtx, TopicRun};

/// 主题的最终结果（流程错误由 `Err` 表示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TopicOutcome {
    /// 复用了已有练习
    Adopted {
        exercise: ExerciseDocument,
        score: f64,
    },
    /// 新生成并已保存
    Persisted {
        exercise: ExerciseDocument,
        autotest_passed: bool,
    },
    /// 新生成但校验不通过，已丢弃
    Invalid,
}

impl TopicOutcome {
    pub fn exercise(&self) -> Option<&ExerciseDocument> {
        match self {
            TopicOutcome::Adopted { exercise, .. } | TopicOutcome::Persisted { exercise, .. } => {
                Some(exercise)
            }
            TopicOutcome::Invalid => None,
        }
    }
}

/// 单主题处理流程
///
/// - 编排检索、提示阶段和沙箱调用
/// - 阶段严格顺序执行
/// - 只持有共享的能力（Arc），工作状态每次新建
pub struct TopicPipeline {
    model: Arc<dyn LanguageModel>,
    retrieval: Arc<dyn RetrievalPort>,
    ranker: Arc<dyn RankingPort>,
    sandbox: Arc<SandboxService>,
    settings: PipelineSettings,
}

impl TopicPipeline {
    /// 创建新的主题处理流程
    pub fn new(
        model: Arc<dyn LanguageModel>,
        retrieval: Arc<dyn RetrievalPort>,
        ranker: Arc<dyn RankingPort>,
        sandbox: Arc<SandboxService>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            model,
            retrieval,
            ranker,
            sandbox,
            settings,
        }
    }

    /// 处理一个主题
    ///
    /// # 参数
    /// - `index`: 主题序号（仅用于日志）
    /// - `topic`: 主题
    pub async fn run(&self, index: usize, topic: &str) -> AppResult<TopicOutcome> {
        let mut run = TopicRun::new(index, topic);

        // ========== 1. 检索 ==========
        info!("{} 🔍 检索已有练习...", run.ctx);
        run.candidates = self.retrieval.lookup(topic).await?;
        info!("{} ✓ 检索到 {} 个候选", run.ctx, run.candidates.len());

        // ========== 2. 排序 ==========
        if let Some((best, score)) = self.rank(&run).await? {
            let candidate = run.candidates.swap_remove(best);
            info!(
                "{} ♻️ 复用已有练习 \"{}\" (得分 {:.2})",
                run.ctx, candidate.topic, score
            );
            self.retrieval
                .save(&candidate.topic, &candidate.exercise)
                .await?;
            return Ok(TopicOutcome::Adopted {
                exercise: candidate.exercise,
                score,
            });
        }

        // ========== 3. 生成 ==========
        info!("{} ✏️ 生成新练习...", run.ctx);
        let generated = run_stage(
            self.model.as_ref(),
            &ExerciseGenerationStage { topic },
            self.settings.stage_max_attempts,
        )
        .await?;
        info!("{} ✓ 生成完成: \"{}\"", run.ctx, generated.topic);
        run.exercise = Some(generated);

        // ========== 4. 校验 / 修正 ==========
        if !self.validate_and_correct(&mut run).await? {
            warn!("{} ⚠️ 练习未通过校验，丢弃", run.ctx);
            return Ok(TopicOutcome::Invalid);
        }

        // ========== 5-6. 验证 / 修 bug ==========
        let Some(exercise) = run.exercise.take() else {
            return Ok(TopicOutcome::Invalid);
        };
        let (exercise, execution) = self.verify_and_fix(&run.ctx, exercise).await?;
        run.execution = Some(execution);
        let autotest_passed = run.autotest_passed();

        // ========== 7. 保存 ==========
        let key = self.retrieval.save(topic, &exercise).await?;
        info!(
            "{} 💾 已保存 (key {}, 自动测试{})",
            run.ctx,
            &key[..key.len().min(12)],
            if autotest_passed { "通过" } else { "未通过" }
        );

        Ok(TopicOutcome::Persisted {
            exercise,
            autotest_passed,
        })
    }

    /// 给候选打分，返回达到阈值的最佳候选 (下标, 分数)
    async fn rank(&self, run: &TopicRun) -> AppResult<Option<(usize, f64)>> {
        if run.candidates.is_empty() {
            return Ok(None);
        }

        let candidate_topics: Vec<String> =
            run.candidates.iter().map(|c| c.topic.clone()).collect();
        let scores = self.ranker.rank(run.topic(), &candidate_topics).await?;

        if scores.len() != candidate_topics.len() {
            warn!(
                "{} ⚠️ 分数个数 {} 与候选数 {} 不一致，视为无匹配",
                run.ctx,
                scores.len(),
                candidate_topics.len()
            );
            return Ok(None);
        }

        let best = pick_best(&scores, self.settings.similarity_threshold);
        match best {
            Some((_, score)) => info!("{} ✓ 最佳候选得分 {:.2}", run.ctx, score),
            None => info!(
                "{} 候选得分均低于阈值 {:.2}，改为生成",
                run.ctx, self.settings.similarity_threshold
            ),
        }
        Ok(best)
    }

    /// 校验 / 修正循环
    ///
    /// 返回是否以确认通过的状态结束。失败时 `run.exercise` 回到循环前快照，
    /// `run.validation` 被清空
    async fn validate_and_correct(&self, run: &mut TopicRun) -> AppResult<bool> {
        let Some(previous) = run.exercise.clone() else {
            return Ok(false);
        };
        let rounds = self.settings.max_validation_rounds;

        for round in 1..=rounds {
            let report = self.validate(run).await?;
            let is_valid = report.is_valid;
            info!(
                "{} 🧪 第 {}/{} 轮校验: {}",
                run.ctx,
                round,
                rounds,
                if is_valid { "通过" } else { "未通过" }
            );
            run.validation = Some(report);
            if is_valid {
                return Ok(true);
            }

            match self.correct(run).await {
                Ok(corrected) => {
                    info!("{} 🔧 第 {}/{} 轮修正完成", run.ctx, round, rounds);
                    run.exercise = Some(corrected);
                }
                Err(e) if e.is_stage_exhausted() => {
                    warn!("{} ⚠️ 修正失败，恢复到循环前的版本: {}", run.ctx, e);
                    run.exercise = Some(previous.clone());
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        // 最后一次确认
        let report = self.validate(run).await?;
        if report.is_valid {
            info!("{} ✓ 最终校验通过", run.ctx);
            run.validation = Some(report);
            return Ok(true);
        }

        warn!("{} ⚠️ 最终校验仍未通过，回滚", run.ctx);
        run.exercise = Some(previous);
        run.validation = None;
        Ok(false)
    }

    async fn validate(&self, run: &TopicRun) -> AppResult<ValidationReport> {
        let Some(exercise) = run.exercise.as_ref() else {
            return Ok(ValidationReport {
                is_valid: false,
                checks: Vec::new(),
            });
        };
        run_stage(
            self.model.as_ref(),
            &ExerciseValidationStage { exercise },
            self.settings.stage_max_attempts,
        )
        .await
    }

    async fn correct(&self, run: &TopicRun) -> AppResult<ExerciseDocument> {
        let (Some(exercise), Some(report)) = (run.exercise.as_ref(), run.validation.as_ref())
        else {
            return Err(AppError::Other("没有可修正的练习或校验报告".to_string()));
        };
        run_stage(
            self.model.as_ref(),
            &ExerciseCorrectionStage { exercise, report },
            self.settings.stage_max_attempts,
        )
        .await
    }

    /// 沙箱验证与修 bug 循环
    ///
    /// 修 bug 轮数用尽时保留最后的练习和失败结果
    async fn verify_and_fix(
        &self,
        ctx: &TopicCtx,
        mut exercise: ExerciseDocument,
    ) -> AppResult<(ExerciseDocument, ExecutionResult)> {
        let mut execution = self.verify(ctx, &exercise).await?;
        let rounds = self.settings.max_bugfix_rounds;

        let mut round = 0;
        while !execution.passed() && round < rounds {
            round += 1;
            info!(
                "{} 🐛 第 {}/{} 轮修 bug (exit_code {}, 超时 {})",
                ctx, round, rounds, execution.exit_code, execution.timed_out
            );
            exercise = run_stage(
                self.model.as_ref(),
                &BugFixingStage {
                    exercise: &exercise,
                    execution: &execution,
                },
                self.settings.stage_max_attempts,
            )
            .await?;
            execution = self.verify(ctx, &exercise).await?;
        }

        if !execution.passed() {
            error!(
                "{} ❌ 修 bug {} 轮后自动测试仍未通过 (exit_code {})",
                ctx, rounds, execution.exit_code
            );
        }
        Ok((exercise, execution))
    }

    async fn verify(&self, ctx: &TopicCtx, exercise: &ExerciseDocument) -> AppResult<ExecutionResult> {
        if !exercise.has_placeholder() {
            warn!("{} ⚠️ 自动测试缺少占位符，跳过沙箱", ctx);
        }
        let execution =
            run_autotest(&self.sandbox, exercise, &exercise.reference_solution_code).await?;
        info!(
            "{} ▶️ 自动测试{} (exit_code {})",
            ctx,
            if execution.passed() { "通过" } else { "失败" },
            execution.exit_code
        );
        Ok(execution)
    }
}

/// 取分数最高者（并列取第一个），低于阈值返回 `None`
pub fn pick_best(scores: &[f64], threshold: f64) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((idx, score));
        }
    }
    best.filter(|(_, score)| *score >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ChatMessage;
    use crate::error::LlmError;
    use crate::infrastructure::SandboxExecutor;
    use crate::parsing::parse_exercise_document;
    use crate::services::{InMemoryExerciseStore, LlmRanker};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    const INVALID: &str = "is_valid: false\nchecks:\n  - rule_id: R1\n    passed: false\n";

    struct Scripted(Mutex<VecDeque<String>>);

    #[async_trait]
    impl LanguageModel for Scripted {
        async fn query(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::EmptyContent { model: "m".into() })
        }
    }

    struct NoSandbox;

    #[async_trait]
    impl SandboxExecutor for NoSandbox {
        async fn run(&self, _code: &str, _stdin: Option<&str>, _timeout: Duration) -> ExecutionResult {
            ExecutionResult::failure("sandbox should not run")
        }
    }

    fn doc(goal: &str) -> String {
        format!(
            "# Micro-project: loops\n\n## Goal\n{}\n\n## Description\nd\n\n## Input\nn\n\n\
             ## Expected output\n```\n1\n```\n\n## Reference solution\n```python\nprint(1)\n```\n\n\
             ## Autotest\n```python\n{{STUDENT_SOLUTION}}\n```\n",
            goal
        )
    }

    fn pipeline(replies: Vec<String>, rounds: u32) -> TopicPipeline {
        let model: Arc<dyn LanguageModel> = Arc::new(Scripted(Mutex::new(replies.into())));
        TopicPipeline::new(
            model.clone(),
            Arc::new(InMemoryExerciseStore::new(5)),
            Arc::new(LlmRanker::new(model, 3)),
            Arc::new(SandboxService::new(Arc::new(NoSandbox), Duration::from_secs(1))),
            PipelineSettings {
                max_validation_rounds: rounds,
                ..PipelineSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn test_failed_corrections_leave_pre_loop_snapshot() {
        let original = parse_exercise_document(&doc("original")).unwrap();
        let pipeline = pipeline(
            vec![
                INVALID.to_string(),
                doc("draft 1"),
                INVALID.to_string(),
                doc("draft 2"),
                INVALID.to_string(),
            ],
            2,
        );
        let mut run = TopicRun::new(1, "loops");
        run.exercise = Some(original.clone());

        let validated = pipeline.validate_and_correct(&mut run).await.unwrap();

        assert!(!validated);
        assert_eq!(run.exercise, Some(original));
        assert!(run.validation.is_none());
    }

    #[tokio::test]
    async fn test_zero_rounds_still_runs_final_validation() {
        let original = parse_exercise_document(&doc("original")).unwrap();
        let pipeline = pipeline(vec!["is_valid: true\nchecks: []".to_string()], 0);
        let mut run = TopicRun::new(1, "loops");
        run.exercise = Some(original);

        assert!(pipeline.validate_and_correct(&mut run).await.unwrap());
        assert!(run.is_validated());
    }

    #[test]
    fn test_pick_best_first_on_ties() {
        assert_eq!(pick_best(&[0.8, 0.9, 0.9], 0.7), Some((1, 0.9)));
    }

    #[test]
    fn test_pick_best_threshold_is_inclusive() {
        assert_eq!(pick_best(&[0.7], 0.7), Some((0, 0.7)));
        assert_eq!(pick_best(&[0.69, 0.1], 0.7), None);
        assert_eq!(pick_best(&[], 0.7), None);
    }

    #[test]
    fn test_outcome_exercise() {
        assert!(TopicOutcome::Invalid.exercise().is_none());
    }
}
