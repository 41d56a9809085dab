use serde::{Deserialize, Serialize};

/// 超时时使用的退出码（与 coreutils `timeout` 一致）
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// 一次沙箱执行的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            timed_out: false,
        }
    }

    /// 正常退出的结果
    pub fn success(stdout: impl Into<String>) -> Self {
        Self::new(stdout, "", 0)
    }

    /// 合成的失败结果（环境故障、缺少占位符等），退出码为 1
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self::new("", stderr, 1)
    }

    /// 超时结果
    pub fn timeout(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: TIMEOUT_EXIT_CODE,
            timed_out: true,
        }
    }

    /// 退出码为 0 且没有超时
    pub fn passed(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}
