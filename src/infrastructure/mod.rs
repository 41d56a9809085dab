//! 基础设施层（Infrastructure Layer）
//!
//! 持有稀缺资源（隔离的执行环境），只暴露能力

pub mod sandbox_executor;

pub use sandbox_executor::{DockerSandboxExecutor, SandboxExecutor};
