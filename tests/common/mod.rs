//! 集成测试共用的假协作者
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use micro_project_gen::clients::{ChatMessage, LanguageModel};
use micro_project_gen::config::PipelineSettings;
use micro_project_gen::error::{AppResult, LlmError};
use micro_project_gen::infrastructure::SandboxExecutor;
use micro_project_gen::models::ExecutionResult;
use micro_project_gen::services::{InMemoryExerciseStore, RankingPort, SandboxService};
use micro_project_gen::workflow::TopicPipeline;

pub const VALID_REPORT: &str = "is_valid: true\nchecks:\n  - rule_id: R1\n    passed: true\n";
pub const INVALID_REPORT: &str =
    "```yaml\nis_valid: false\nchecks:\n  - rule_id: R1\n    passed: false\n    comment: expected output does not match the reference solution\n```";

// ========== 练习文档 ==========

/// 生成一份完整的练习文档
pub fn exercise_markdown(topic: &str, goal: &str) -> String {
    format!(
        "# Micro-project: {topic}

## Goal
{goal}

## Description
Sum the numbers from 1 to n.

## Input
A single integer n.

## Expected output
```
15
```

## Reference solution
```python
n = int(input())
print(sum(range(1, n + 1)))
```

## Autotest
```python
import subprocess, sys
code = '''{{STUDENT_SOLUTION}}'''
out = subprocess.run([sys.executable, '-c', code], input='5', capture_output=True, text=True).stdout
assert out.strip() == '15'
```
"
    )
}

/// 自动测试里没有占位符的练习文档
pub fn exercise_without_placeholder(topic: &str) -> String {
    exercise_markdown(topic, "Practice loop bounds.").replace("{STUDENT_SOLUTION}", "print(15)")
}

// ========== 模型 ==========

/// 按顺序返回预设回复的模型，并记录每次调用的消息
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    /// 第 n 次调用中最后一条消息的内容
    pub fn last_message_of(&self, call: usize) -> String {
        let calls = self.calls.lock().unwrap();
        calls[call]
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn query(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::EmptyContent {
                model: "scripted".to_string(),
            })
    }
}

/// 由闭包决定回复的模型，适合并发场景
pub struct FnModel<F>(pub F);

#[async_trait]
impl<F> LanguageModel for FnModel<F>
where
    F: Fn(&[ChatMessage]) -> Result<String, LlmError> + Send + Sync,
{
    async fn query(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        // 让出调度，使并发任务交错执行
        tokio::time::sleep(Duration::from_millis(5)).await;
        (self.0)(messages)
    }
}

// ========== 排序 ==========

/// 总是返回同一组分数的排序器
pub struct FixedRanker(pub Vec<f64>);

#[async_trait]
impl RankingPort for FixedRanker {
    async fn rank(&self, _topic: &str, _candidate_topics: &[String]) -> AppResult<Vec<f64>> {
        Ok(self.0.clone())
    }
}

// ========== 沙箱 ==========

/// 按顺序返回预设结果的沙箱，结果用完后总是成功
#[derive(Default)]
pub struct RecordingSandbox {
    results: Mutex<VecDeque<ExecutionResult>>,
    codes: Mutex<Vec<String>>,
}

impl RecordingSandbox {
    pub fn new(results: Vec<ExecutionResult>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            codes: Mutex::new(Vec::new()),
        })
    }

    pub fn codes(&self) -> Vec<String> {
        self.codes.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxExecutor for RecordingSandbox {
    async fn run(&self, code: &str, _stdin: Option<&str>, _timeout: Duration) -> ExecutionResult {
        self.codes.lock().unwrap().push(code.to_string());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ExecutionResult::success("ok\n"))
    }
}

// ========== 组装 ==========

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        similarity_threshold: 0.7,
        stage_max_attempts: 3,
        max_validation_rounds: 3,
        max_bugfix_rounds: 3,
    }
}

pub fn sandbox_service(sandbox: Arc<RecordingSandbox>) -> Arc<SandboxService> {
    Arc::new(SandboxService::new(sandbox, Duration::from_secs(5)))
}

/// 用给定的模型、练习库、排序器和沙箱组装流程
pub fn pipeline(
    model: Arc<dyn LanguageModel>,
    store: Arc<InMemoryExerciseStore>,
    ranker: Arc<dyn RankingPort>,
    sandbox: Arc<RecordingSandbox>,
    settings: PipelineSettings,
) -> TopicPipeline {
    TopicPipeline::new(model, store, ranker, sandbox_service(sandbox), settings)
}
