//! 提示词模板（英文）
//!
//! 系统提示词是常量，用户提示词由各阶段的输入拼出。

use crate::models::{ExecutionResult, ExerciseDocument};

/// 练习文档的格式说明，生成与修正类阶段共用
const DOCUMENT_FORMAT: &str = r#"Format the micro-project as Markdown with exactly this structure:

# Micro-project: <topic>

## Goal
<one or two sentences on what the learner practises>

## Description
<the task statement>

## Input
<what the program reads from stdin>

## Expected output
```
<exact stdout for the example input>
```

## Reference solution
```python
<a complete, correct Python solution>
```

## Autotest
```python
<a Python script that embeds {STUDENT_SOLUTION} verbatim, runs it and asserts on its behaviour;
it must exit with status 0 on a correct solution and non-zero otherwise>
```

The autotest must contain the literal placeholder {STUDENT_SOLUTION} exactly where the solution code
is inserted. Do not add any text before the title or after the autotest block."#;

pub const TOPIC_EXTRACTION_SYSTEM: &str = r#"You are an experienced programming mentor. You read code-review comments
left on a learner's work and name the underlying misconceptions or skill gaps.

Return a YAML mapping with a single key `topics` whose value is a list of short topic labels
(a few words each, lowercase, no trailing punctuation). Merge comments that point to the same gap.
Wrap the YAML in a ```yaml fenced block and output nothing else."#;

pub const GENERATION_SYSTEM: &str = "You are an author of short programming exercises (micro-projects). \
Each micro-project targets exactly one misconception and can be solved in under 30 lines of Python.";

pub const VALIDATION_SYSTEM: &str = r#"You review programming micro-projects for internal consistency.

Check at least these rules:
- R1: the goal, description and topic agree with each other;
- R2: the input section fully specifies what the program reads;
- R3: the expected output is exactly what the reference solution prints for the described input;
- R4: the autotest embeds {STUDENT_SOLUTION} and would pass for the reference solution;
- R5: the task is solvable with the Python standard library only.

Return YAML in a ```yaml fenced block with this shape and nothing else:

is_valid: <true|false>
checks:
  - rule_id: <R1..R5>
    passed: <true|false>
    comment: <short justification>"#;

pub const CORRECTION_SYSTEM: &str = "You fix programming micro-projects according to a reviewer's report. \
Address every failed check, keep everything that already passes, and keep the topic unchanged.";

pub const BUGFIX_SYSTEM: &str = "You fix programming micro-projects whose reference solution fails its own autotest. \
Decide whether the solution, the autotest or the expected output is wrong, and fix it so the autotest passes.";

pub const FEEDBACK_SYSTEM: &str = r#"You are a friendly programming mentor reviewing a learner's solution to a micro-project.
You are given the task, the learner's code and the result of running the autotest against it.
Never reveal the reference solution.

Return a JSON object in a ```json fenced block with exactly these keys:
{"verdict": "pass" | "fail", "feedback": "<two to five sentences of constructive feedback>"}"#;

pub const RANKING_SYSTEM: &str = r#"You compare a learner's problem with a list of previously seen problems and judge
how well an exercise written for each listed problem would also address the learner's problem.

Return a JSON array with one score per listed problem, in the same order, each between 0 and 1
(1 = the same problem, 0 = unrelated). Output only the array."#;

pub fn topic_extraction_user(comments: &[String]) -> String {
    let list: String = comments.iter().map(|c| format!("\n- {}", c)).collect();
    format!("[Reviewer comments]:{}", list)
}

pub fn generation_user(topic: &str) -> String {
    format!("{}\n\n[Topic]: {}", DOCUMENT_FORMAT, topic)
}

pub fn validation_user(document: &str) -> String {
    format!("[Micro-project to review]:\n\n---\n\n{}\n\n---", document)
}

pub fn correction_user(document: &str, report_yaml: &str) -> String {
    format!(
        "{}\n\n[Original micro-project]:\n\n---\n\n{}\n\n---\n\n[Validator report]:\n\n---\n\n{}\n\n---",
        DOCUMENT_FORMAT, document, report_yaml
    )
}

pub fn bugfix_user(document: &str, execution: &ExecutionResult) -> String {
    let stdout = execution.stdout.trim_end();
    let stderr = execution.stderr.trim_end();
    let out_fence = fence_for(stdout);
    let err_fence = fence_for(stderr);
    format!(
        "{}\n\n[Micro-project]:\n\n---\n\n{}\n\n---\n\n[Autotest run with the reference solution]:\n\
         stdout:\n{out_fence}\n{}\n{out_fence}\nstderr:\n{err_fence}\n{}\n{err_fence}\nexit_code: {}\nis_timed_out: {}",
        DOCUMENT_FORMAT,
        document,
        stdout,
        stderr,
        execution.exit_code,
        execution.timed_out
    )
}

/// 比内容中最长的反引号串多一个的围栏（至少三个）
fn fence_for(content: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in content.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

pub fn feedback_user(
    learner_code: &str,
    exercise: &ExerciseDocument,
    execution: &ExecutionResult,
) -> String {
    format!(
        "[Learner code]:\n<student_solution>\n{}\n</student_solution>\n\n\
         [Autotest result]:\nexit_code: {}\nis_timed_out: {}\nstdout:\n{}\nstderr:\n{}\n\n\
         --------------------------------\n\n\
         [Task goal]:\n<project_goal>\n{}\n</project_goal>\n\
         [Task description]:\n<project_description>\n{}\n</project_description>\n\
         [Input]:\n<project_input>\n{}\n</project_input>\n\
         [Expected output]:\n<project_output>\n{}\n</project_output>",
        learner_code,
        execution.exit_code,
        execution.timed_out,
        execution.stdout.trim_end(),
        execution.stderr.trim_end(),
        exercise.goal,
        exercise.description,
        exercise.input_spec,
        exercise.expected_output
    )
}

pub fn ranking_user(topic: &str, candidates: &[String]) -> String {
    let numbered: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, c))
        .collect();
    format!(
        "[Learner problem]: {}\n[Similar problems]:\n{}",
        topic,
        numbered.join("\n")
    )
}
