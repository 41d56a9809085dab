//! 主题处理上下文与工作状态
//!
//! 封装"我正在处理第几个主题、它现在是什么状态"这一信息

use std::fmt::Display;

use crate::models::{Candidate, ExecutionResult, ExerciseDocument, ValidationReport};

/// 主题处理上下文（仅用于日志）
#[derive(Debug, Clone)]
pub struct TopicCtx {
    /// 主题在批次中的序号（从 1 开始）
    pub index: usize,
    pub topic: String,
}

impl TopicCtx {
    /// 创建新的主题上下文
    pub fn new(index: usize, topic: impl Into<String>) -> Self {
        Self {
            index,
            topic: topic.into(),
        }
    }
}

impl Display for TopicCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[topic #{} \"{}\"]", self.index, self.topic)
    }
}

/// 单个主题的工作状态
///
/// 只属于一次 TopicPipeline 运行，结束后折叠进批次结果
#[derive(Debug, Clone)]
pub struct TopicRun {
    pub ctx: TopicCtx,
    pub candidates: Vec<Candidate>,
    pub exercise: Option<ExerciseDocument>,
    pub validation: Option<ValidationReport>,
    pub execution: Option<ExecutionResult>,
}

impl TopicRun {
    pub fn new(index: usize, topic: impl Into<String>) -> Self {
        Self {
            ctx: TopicCtx::new(index, topic),
            candidates: Vec::new(),
            exercise: None,
            validation: None,
            execution: None,
        }
    }

    pub fn topic(&self) -> &str {
        &self.ctx.topic
    }

    /// 最近一次校验是否通过
    pub fn is_validated(&self) -> bool {
        self.validation.as_ref().is_some_and(|r| r.is_valid)
    }

    /// 最近一次自动测试是否通过
    pub fn autotest_passed(&self) -> bool {
        self.execution.as_ref().is_some_and(ExecutionResult::passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctx_display() {
        let ctx = TopicCtx::new(3, "off-by-one loop bound");
        assert_eq!(ctx.to_string(), "[topic #3 \"off-by-one loop bound\"]");
    }

    #[test]
    fn test_new_run_is_empty() {
        let run = TopicRun::new(1, "loops");
        assert_eq!(run.topic(), "loops");
        assert!(run.exercise.is_none());
        assert!(!run.is_validated());
        assert!(!run.autotest_passed());
    }

    #[test]
    fn test_autotest_passed_follows_last_execution() {
        let mut run = TopicRun::new(1, "loops");
        run.execution = Some(ExecutionResult::failure("AssertionError"));
        assert!(!run.autotest_passed());
        run.execution = Some(ExecutionResult::success("15\n"));
        assert!(run.autotest_passed());
    }
}
