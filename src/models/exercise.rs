use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::ParseError;
use crate::models::execution::ExecutionResult;

/// 自动测试中的占位符，执行前会被替换为参考答案或学员提交的代码
pub const STUDENT_SOLUTION_PLACEHOLDER: &str = "{STUDENT_SOLUTION}";

/// 主题（一个误区 / 薄弱点的简短标签）
pub type Topic = String;

/// 微项目练习
///
/// 所有字段在解析成功时都非空，`raw_source_text` 是其余字段的来源文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseDocument {
    pub raw_source_text: String,
    pub topic: String,
    pub goal: String,
    pub description: String,
    pub input_spec: String,
    pub expected_output: String,
    pub reference_solution_code: String,
    pub autotest_code: String,
}

impl ExerciseDocument {
    /// 是否包含占位符
    pub fn has_placeholder(&self) -> bool {
        self.autotest_code.contains(STUDENT_SOLUTION_PLACEHOLDER)
    }

    /// 将代码代入自动测试的占位符
    ///
    /// # 返回
    /// 缺少占位符时返回 `None`
    pub fn render_autotest(&self, solution_code: &str) -> Option<String> {
        if !self.has_placeholder() {
            return None;
        }
        Some(
            self.autotest_code
                .replace(STUDENT_SOLUTION_PLACEHOLDER, solution_code),
        )
    }

    /// 用于提示词的 Markdown 文本
    pub fn as_markdown(&self) -> &str {
        &self.raw_source_text
    }
}

/// 单条校验规则的结论
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub rule_id: String,
    pub passed: bool,
    #[serde(default)]
    pub comment: String,
}

/// 模型给出的校验报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub checks: Vec<ValidationCheck>,
}

impl ValidationReport {
    /// 未通过的检查项
    pub fn failed_checks(&self) -> impl Iterator<Item = &ValidationCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// 检索命中的候选练习
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub topic: String,
    pub exercise: ExerciseDocument,
}

/// 学员提交的反馈
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackReport {
    /// "pass" 或 "fail"
    pub verdict: String,
    pub feedback: String,
    pub execution: ExecutionResult,
}

impl FeedbackReport {
    pub const VERDICTS: [&'static str; 2] = ["pass", "fail"];

    /// 从已校验的 JSON 字段构建反馈
    ///
    /// 字段映射是固定的：`verdict` → verdict，`feedback` → feedback
    pub fn from_fields(
        fields: &Map<String, JsonValue>,
        execution: ExecutionResult,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            verdict: string_field(fields, "verdict")?,
            feedback: string_field(fields, "feedback")?,
            execution,
        })
    }

    pub fn passed(&self) -> bool {
        self.verdict == "pass"
    }
}

fn string_field(fields: &Map<String, JsonValue>, key: &str) -> Result<String, ParseError> {
    match fields.get(key) {
        Some(JsonValue::String(s)) => Ok(s.trim().to_string()),
        Some(JsonValue::Null) | None => Err(ParseError::new(format!("missing key '{}'", key))
            .expected([key])
            .detail("present_keys", fields.keys().cloned().collect::<Vec<_>>().join(", "))),
        Some(other) => Ok(other.to_string()),
    }
}
