//! 沙箱执行器 - 基础设施层
//!
//! 持有唯一的"运行不可信代码"能力，只暴露 run()

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::SandboxSettings;
use crate::models::ExecutionResult;

/// 代码通过该环境变量传入容器
pub const CODE_ENV_VAR: &str = "MPG_SANDBOX_CODE";

/// 容器内执行的引导脚本：从环境变量取出代码并以 __main__ 身份执行
const BOOTSTRAP: &str = "import os\nexec(compile(os.environ.pop('MPG_SANDBOX_CODE'), '<solution>', 'exec'), {'__name__': '__main__'})";

/// 清理容器的最长等待时间
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);
/// 进程结束后收集残留输出的最长等待时间
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
/// 每个输出流最多保留的字节数，超出部分读出后丢弃
pub const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

/// 沙箱执行端口
///
/// 普通的程序失败（非零退出、超时）体现在结果里；
/// 环境故障也会转换为 exit_code=1 的合成结果，不会向上抛出
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn run(&self, code: &str, stdin: Option<&str>, timeout: Duration) -> ExecutionResult;
}

/// 基于 Docker CLI 的 Python 沙箱
///
/// 职责：
/// - 无网络、只读根文件系统、不可执行的 tmpfs
/// - 限制内存、CPU、进程数，以 nobody 用户运行
/// - 由本进程强制墙钟超时，超时后杀掉 CLI 并删除容器
pub struct DockerSandboxExecutor {
    settings: SandboxSettings,
    program: String,
    leading_args: Vec<String>,
}

impl DockerSandboxExecutor {
    /// 创建新的 Docker 沙箱执行器
    pub fn new(settings: SandboxSettings) -> Self {
        Self {
            settings,
            program: "docker".to_string(),
            leading_args: Vec::new(),
        }
    }

    /// 替换 CLI 程序（例如测试中用 `sh -c` 模拟 docker）
    pub fn with_cli(mut self, program: impl Into<String>, leading_args: Vec<String>) -> Self {
        self.program = program.into();
        self.leading_args = leading_args;
        self
    }

    /// `docker run` 的完整参数（不含代码本身）
    pub fn run_args(&self, container_name: &str) -> Vec<String> {
        let s = &self.settings;
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "-i".to_string(),
            "--name".to_string(),
            container_name.to_string(),
            "--network".to_string(),
            "none".to_string(),
            "--read-only".to_string(),
            "--tmpfs".to_string(),
            format!("/tmp:rw,noexec,nosuid,size={}", s.tmpfs_size),
            "--cpus".to_string(),
            s.cpu_quota.to_string(),
            "--memory".to_string(),
            s.memory_limit.clone(),
            "--pids-limit".to_string(),
            s.pids_limit.to_string(),
            "--security-opt".to_string(),
            "no-new-privileges:true".to_string(),
            "--user".to_string(),
            "65534:65534".to_string(),
            "-e".to_string(),
            CODE_ENV_VAR.to_string(),
            s.image.clone(),
            "python".to_string(),
            "-c".to_string(),
            BOOTSTRAP.to_string(),
        ]
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args).args(args);
        cmd
    }

    fn guard(&self, container_name: &str) -> ContainerGuard {
        ContainerGuard {
            program: self.program.clone(),
            leading_args: self.leading_args.clone(),
            name: container_name.to_string(),
            armed: true,
        }
    }
}

/// 容器守卫
///
/// 运行中的 future 被丢弃时，杀掉 CLI 并不会停止容器，
/// 所以守卫在 drop 时补一次 `docker rm -f`。正常退出（`--rm` 已清理）时解除
struct ContainerGuard {
    program: String,
    leading_args: Vec<String>,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    fn rm_args(&self) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.extend(["rm".to_string(), "-f".to_string(), self.name.clone()]);
        args
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    /// 尽力删除容器并等待完成，任何错误都只记录日志
    async fn remove(mut self) {
        self.armed = false;
        let mut cmd = Command::new(&self.program);
        cmd.args(self.rm_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(CLEANUP_TIMEOUT, cmd.status()).await {
            Ok(Ok(status)) => debug!("容器 {} 已清理 ({})", self.name, status),
            Ok(Err(e)) => debug!("清理容器 {} 失败: {}", self.name, e),
            Err(_) => debug!("清理容器 {} 超时", self.name),
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("⚠️ 沙箱运行被中断，清理容器 {}", self.name);
        let program = self.program.clone();
        let args = self.rm_args();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let name = self.name.clone();
                handle.spawn(async move {
                    let mut cmd = Command::new(&program);
                    cmd.args(&args)
                        .stdin(Stdio::null())
                        .stdout(Stdio::null())
                        .stderr(Stdio::null())
                        .kill_on_drop(true);
                    if let Ok(Err(e)) = tokio::time::timeout(CLEANUP_TIMEOUT, cmd.status()).await {
                        debug!("清理容器 {} 失败: {}", name, e);
                    }
                });
            }
            Err(_) => {
                // 运行时已不可用，退回到不等待的同步进程
                let spawned = std::process::Command::new(&program)
                    .args(&args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn();
                if let Err(e) = spawned {
                    debug!("清理容器 {} 失败: {}", self.name, e);
                }
            }
        }
    }
}

#[async_trait]
impl SandboxExecutor for DockerSandboxExecutor {
    async fn run(&self, code: &str, stdin: Option<&str>, timeout: Duration) -> ExecutionResult {
        let container_name = format!("py-sbx-{}", uuid::Uuid::new_v4().simple());
        debug!(
            "启动沙箱容器 {}，代码长度: {} 字符，超时: {:?}",
            container_name,
            code.len(),
            timeout
        );

        let mut cmd = self.command(&self.run_args(&container_name));
        cmd.env(CODE_ENV_VAR, code)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("⚠️ 无法启动沙箱 ({}): {}", self.program, e);
                return ExecutionResult::failure(format!("docker execution failed: {}", e));
            }
        };
        let guard = self.guard(&container_name);

        if let Some(mut pipe) = child.stdin.take() {
            let input = stdin.unwrap_or_default().to_string();
            tokio::spawn(async move {
                // 写完后 drop 关闭 stdin
                let _ = pipe.write_all(input.as_bytes()).await;
            });
        }
        let stdout_task = child.stdout.take().map(spawn_reader);
        let stderr_task = child.stderr.take().map(spawn_reader);

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                guard.disarm();
                let stdout = collect(stdout_task).await;
                let stderr = collect(stderr_task).await;
                ExecutionResult::new(stdout, stderr, status.code().unwrap_or(1))
            }
            Ok(Err(e)) => {
                warn!("⚠️ 等待沙箱进程失败: {}", e);
                let _ = child.start_kill();
                guard.remove().await;
                ExecutionResult::failure(format!("docker execution failed: {}", e))
            }
            Err(_) => {
                warn!("⏱️ 沙箱执行超时 ({:?})，终止容器 {}", timeout, container_name);
                let _ = child.start_kill();
                let _ = child.wait().await;
                guard.remove().await;

                let stdout = collect(stdout_task).await;
                let stderr = collect(stderr_task).await;
                let notice = format!("execution timed out after {:.1}s", timeout.as_secs_f64());
                let stderr = if stderr.trim().is_empty() {
                    notice
                } else {
                    format!("{}\n{}", stderr.trim_end(), notice)
                };
                ExecutionResult::timeout(stdout, stderr)
            }
        }
    }
}

/// 读取一个输出流，最多保留 `MAX_OUTPUT_BYTES`，其余读出丢弃以免子进程阻塞
fn spawn_reader<R>(mut reader: R) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = (&mut reader).take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
        let discarded = tokio::io::copy(&mut reader, &mut tokio::io::sink())
            .await
            .unwrap_or(0);

        let mut text = String::from_utf8_lossy(&buf).to_string();
        if discarded > 0 {
            text.push_str(&format!("\n[output truncated: {} bytes omitted]", discarded));
        }
        text
    })
}

async fn collect(task: Option<JoinHandle<String>>) -> String {
    let Some(task) = task else {
        return String::new();
    };
    match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
        Ok(Ok(text)) => text,
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 用 sh 模拟 docker：`run` 时回显 stdin，并把代码写到 stderr
    fn fake_docker(script: &str) -> DockerSandboxExecutor {
        DockerSandboxExecutor::new(SandboxSettings::default()).with_cli(
            "sh",
            vec!["-c".to_string(), script.to_string(), "docker".to_string()],
        )
    }

    #[test]
    fn test_run_args_contain_isolation_flags() {
        let executor = DockerSandboxExecutor::new(SandboxSettings::default());
        let args = executor.run_args("py-sbx-test");
        let joined = args.join(" ");
        assert!(joined.contains("--network none"));
        assert!(joined.contains("--read-only"));
        assert!(joined.contains("--tmpfs /tmp:rw,noexec,nosuid,size=64m"));
        assert!(joined.contains("--memory 128m"));
        assert!(joined.contains("--cpus 0.5"));
        assert!(joined.contains("--pids-limit 128"));
        assert!(joined.contains("--security-opt no-new-privileges:true"));
        assert!(joined.contains("--user 65534:65534"));
        assert!(joined.contains("aipg-sandbox:latest python -c"));
    }

    #[tokio::test]
    async fn test_missing_cli_becomes_failing_result() {
        let executor = DockerSandboxExecutor::new(SandboxSettings::default())
            .with_cli("/nonexistent/docker-binary", Vec::new());
        let result = executor
            .run("print(1)", None, Duration::from_secs(1))
            .await;
        assert_eq!(result.exit_code, 1);
        assert!(!result.timed_out);
        assert!(result.stderr.starts_with("docker execution failed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdin_and_code_reach_the_cli() {
        let executor = fake_docker(
            r#"if [ "$1" = run ]; then cat; printf '%s' "$MPG_SANDBOX_CODE" >&2; fi"#,
        );
        let result = executor
            .run("print('hi')", Some("5\n"), Duration::from_secs(5))
            .await;
        assert!(result.passed(), "{:?}", result);
        assert_eq!(result.stdout, "5\n");
        assert_eq!(result.stderr, "print('hi')");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        let executor = fake_docker(r#"echo boom >&2; exit 3"#);
        let result = executor.run("x", None, Duration::from_secs(5)).await;
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stderr.trim(), "boom");
        assert!(!result.passed());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_and_reports_124() {
        let executor = fake_docker(r#"if [ "$1" = run ]; then exec sleep 30; fi"#);
        let started = std::time::Instant::now();
        let result = executor.run("x", None, Duration::from_millis(200)).await;
        assert!(result.timed_out);
        assert_eq!(result.exit_code, 124);
        assert!(result.stderr.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    /// 记录每次 CLI 调用参数的假 docker
    #[cfg(unix)]
    fn logging_docker(log: &std::path::Path, run_body: &str) -> DockerSandboxExecutor {
        fake_docker(&format!(
            r#"if [ "$1" = rm ]; then echo "$@" >> '{log}'; else echo "$1" >> '{log}'; fi
if [ "$1" = run ]; then {run_body}; fi"#,
            log = log.display(),
            run_body = run_body
        ))
    }

    #[cfg(unix)]
    fn cli_calls(log: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_run_removes_container() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("cli.log");
        let executor = logging_docker(&log, "exec sleep 30");

        let cancelled = tokio::time::timeout(
            Duration::from_millis(300),
            executor.run("while True: pass", None, Duration::from_secs(20)),
        )
        .await;
        assert!(cancelled.is_err());
        tokio::time::sleep(Duration::from_millis(500)).await;

        let calls = cli_calls(&log);
        assert_eq!(calls[0], "run");
        assert!(
            calls.iter().any(|c| c.starts_with("rm -f py-sbx-")),
            "calls: {:?}",
            calls
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_normal_exit_skips_container_removal() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("cli.log");
        let executor = logging_docker(&log, "echo done");

        let result = executor.run("print(1)", None, Duration::from_secs(5)).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(result.passed(), "{:?}", result);
        assert_eq!(cli_calls(&log), vec!["run"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_removes_container() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("cli.log");
        let executor = logging_docker(&log, "exec sleep 30");

        let result = executor.run("x", None, Duration::from_millis(200)).await;

        assert!(result.timed_out);
        let calls = cli_calls(&log);
        assert_eq!(calls.len(), 2, "calls: {:?}", calls);
        assert!(calls[1].starts_with("rm -f py-sbx-"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_is_capped() {
        let executor = fake_docker(
            r#"if [ "$1" = run ]; then head -c 3000000 /dev/zero | tr '\0' a; fi"#,
        );
        let result = executor.run("x", None, Duration::from_secs(10)).await;

        assert!(result.passed(), "exit {}", result.exit_code);
        assert!(result.stdout.len() < MAX_OUTPUT_BYTES as usize + 100);
        assert!(result.stdout.starts_with("aaaa"));
        assert!(result
            .stdout
            .ends_with(&format!("[output truncated: {} bytes omitted]", 3_000_000 - MAX_OUTPUT_BYTES)));
    }

    #[tokio::test]
    #[ignore] // 需要本地 Docker 和 aipg-sandbox 镜像
    async fn test_docker_runs_python() {
        let executor = DockerSandboxExecutor::new(SandboxSettings::default());
        let result = executor
            .run("print(int(input()) * 2)", Some("21"), Duration::from_secs(10))
            .await;
        assert!(result.passed(), "{:?}", result);
        assert_eq!(result.stdout.trim(), "42");
    }

    #[tokio::test]
    #[ignore] // 需要本地 Docker 和 aipg-sandbox 镜像
    async fn test_docker_enforces_timeout() {
        let executor = DockerSandboxExecutor::new(SandboxSettings::default());
        let result = executor
            .run("while True: pass", None, Duration::from_secs(2))
            .await;
        assert!(result.timed_out);
        assert_eq!(result.exit_code, 124);
    }
}
