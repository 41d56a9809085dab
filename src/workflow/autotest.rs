use crate::error::AppResult;
use crate::models::{ExecutionResult, ExerciseDocument, STUDENT_SOLUTION_PLACEHOLDER};
use crate::services::SandboxService;

/// 把代码代入自动测试并在沙箱中执行
///
/// 缺少占位符时不调用沙箱，直接返回 exit_code=1 的合成结果
pub(crate) async fn run_autotest(
    sandbox: &SandboxService,
    exercise: &ExerciseDocument,
    solution_code: &str,
) -> AppResult<ExecutionResult> {
    match exercise.render_autotest(solution_code) {
        Some(script) => Ok(sandbox.run_code(&script, None, None).await?),
        None => Ok(missing_placeholder_result()),
    }
}

pub(crate) fn missing_placeholder_result() -> ExecutionResult {
    ExecutionResult::failure(format!(
        "autotest does not contain the {} placeholder, so the solution could not be inserted",
        STUDENT_SOLUTION_PLACEHOLDER
    ))
}
