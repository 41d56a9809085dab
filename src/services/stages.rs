//! 各提示阶段
//!
//! 每个阶段只把输入拼进模板，并把回复交给对应的解析器

use crate::error::ParseError;
use crate::models::{ExecutionResult, ExerciseDocument, FeedbackReport, ValidationReport};
use crate::parsing::{
    format_validation_report, parse_and_check_json, parse_exercise_document,
    parse_ranking_scores, parse_topics, parse_validation_report, JsonShape, SnapRule,
};
use crate::services::prompt_stage::PromptStage;
use crate::services::prompts;

/// 从评审意见中提取主题
pub struct TopicExtractionStage<'a> {
    pub comments: &'a [String],
}

impl PromptStage for TopicExtractionStage<'_> {
    type Output = Vec<String>;

    fn name(&self) -> &'static str {
        "topic_extraction"
    }

    fn system_prompt(&self) -> String {
        prompts::TOPIC_EXTRACTION_SYSTEM.to_string()
    }

    fn user_prompt(&self) -> String {
        prompts::topic_extraction_user(self.comments)
    }

    fn parse(&self, reply: &str) -> Result<Self::Output, ParseError> {
        parse_topics(reply)
    }
}

/// 为主题生成新练习
pub struct ExerciseGenerationStage<'a> {
    pub topic: &'a str,
}

impl PromptStage for ExerciseGenerationStage<'_> {
    type Output = ExerciseDocument;

    fn name(&self) -> &'static str {
        "exercise_generation"
    }

    fn system_prompt(&self) -> String {
        prompts::GENERATION_SYSTEM.to_string()
    }

    fn user_prompt(&self) -> String {
        prompts::generation_user(self.topic)
    }

    fn parse(&self, reply: &str) -> Result<Self::Output, ParseError> {
        parse_exercise_document(reply)
    }
}

/// 校验练习的一致性
pub struct ExerciseValidationStage<'a> {
    pub exercise: &'a ExerciseDocument,
}

impl PromptStage for ExerciseValidationStage<'_> {
    type Output = ValidationReport;

    fn name(&self) -> &'static str {
        "exercise_validation"
    }

    fn system_prompt(&self) -> String {
        prompts::VALIDATION_SYSTEM.to_string()
    }

    fn user_prompt(&self) -> String {
        prompts::validation_user(self.exercise.as_markdown())
    }

    fn parse(&self, reply: &str) -> Result<Self::Output, ParseError> {
        parse_validation_report(reply)
    }
}

/// 按校验报告修正练习
pub struct ExerciseCorrectionStage<'a> {
    pub exercise: &'a ExerciseDocument,
    pub report: &'a ValidationReport,
}

impl PromptStage for ExerciseCorrectionStage<'_> {
    type Output = ExerciseDocument;

    fn name(&self) -> &'static str {
        "exercise_correction"
    }

    fn system_prompt(&self) -> String {
        prompts::CORRECTION_SYSTEM.to_string()
    }

    fn user_prompt(&self) -> String {
        prompts::correction_user(
            self.exercise.as_markdown(),
            &format_validation_report(self.report),
        )
    }

    fn parse(&self, reply: &str) -> Result<Self::Output, ParseError> {
        parse_exercise_document(reply)
    }
}

/// 根据失败的自动测试修复练习
pub struct BugFixingStage<'a> {
    pub exercise: &'a ExerciseDocument,
    pub execution: &'a ExecutionResult,
}

impl PromptStage for BugFixingStage<'_> {
    type Output = ExerciseDocument;

    fn name(&self) -> &'static str {
        "bug_fixing"
    }

    fn system_prompt(&self) -> String {
        prompts::BUGFIX_SYSTEM.to_string()
    }

    fn user_prompt(&self) -> String {
        prompts::bugfix_user(self.exercise.as_markdown(), self.execution)
    }

    fn parse(&self, reply: &str) -> Result<Self::Output, ParseError> {
        parse_exercise_document(reply)
    }
}

/// 对学员提交给出反馈
pub struct FeedbackStage<'a> {
    pub learner_code: &'a str,
    pub exercise: &'a ExerciseDocument,
    pub execution: &'a ExecutionResult,
}

impl FeedbackStage<'_> {
    fn shape() -> JsonShape {
        JsonShape {
            required: &["verdict", "feedback"],
            snapped: vec![SnapRule {
                key: "verdict",
                allowed: &FeedbackReport::VERDICTS,
                default: Some("fail"),
            }],
        }
    }
}

impl PromptStage for FeedbackStage<'_> {
    type Output = FeedbackReport;

    fn name(&self) -> &'static str {
        "feedback"
    }

    fn system_prompt(&self) -> String {
        prompts::FEEDBACK_SYSTEM.to_string()
    }

    fn user_prompt(&self) -> String {
        prompts::feedback_user(self.learner_code, self.exercise, self.execution)
    }

    fn parse(&self, reply: &str) -> Result<Self::Output, ParseError> {
        let fields = parse_and_check_json(reply, &Self::shape())?;
        FeedbackReport::from_fields(&fields, self.execution.clone())
    }
}

/// 给候选主题打分
///
/// 分数个数必须与候选数一致，否则视为解析失败并重试
pub struct RankingStage<'a> {
    pub topic: &'a str,
    pub candidates: &'a [String],
}

impl PromptStage for RankingStage<'_> {
    type Output = Vec<f64>;

    fn name(&self) -> &'static str {
        "ranking"
    }

    fn system_prompt(&self) -> String {
        prompts::RANKING_SYSTEM.to_string()
    }

    fn user_prompt(&self) -> String {
        prompts::ranking_user(self.topic, self.candidates)
    }

    fn parse(&self, reply: &str) -> Result<Self::Output, ParseError> {
        let scores = parse_ranking_scores(reply)?;
        if scores.len() != self.candidates.len() {
            return Err(ParseError::new("number of scores does not match candidates")
                .expected([format!("{} scores", self.candidates.len())])
                .got(format!("{} scores", scores.len())));
        }
        Ok(scores)
    }
}
