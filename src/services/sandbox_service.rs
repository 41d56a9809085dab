//! 沙箱服务 - 业务能力层
//!
//! 在执行器前做输入检查并补上默认超时

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::SandboxError;
use crate::infrastructure::SandboxExecutor;
use crate::models::ExecutionResult;

/// 沙箱服务
pub struct SandboxService {
    executor: Arc<dyn SandboxExecutor>,
    default_timeout: Duration,
}

impl SandboxService {
    pub fn new(executor: Arc<dyn SandboxExecutor>, default_timeout: Duration) -> Self {
        Self {
            executor,
            default_timeout,
        }
    }

    /// 执行代码
    ///
    /// # 参数
    /// - `code`: 要执行的 Python 代码，不能为空
    /// - `stdin`: 程序输入（可选）
    /// - `timeout`: 超时时间，缺省时使用默认值
    pub async fn run_code(
        &self,
        code: &str,
        stdin: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, SandboxError> {
        if code.trim().is_empty() {
            return Err(SandboxError::EmptyCode);
        }
        let timeout = timeout.unwrap_or(self.default_timeout);
        debug!("提交沙箱执行，超时: {:?}", timeout);
        Ok(self.executor.run(code, stdin, timeout).await)
    }
}
