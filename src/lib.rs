//! # Micro Project Gen
//!
//! 根据代码评审意见批量生成可自动判分的 Python 微项目练习
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure / Clients）
//! - `infrastructure/` - 持有稀缺资源（Docker 沙箱），只暴露 run() 能力
//! - `clients/` - OpenAI 兼容的 LLM 客户端，只暴露 query() 能力
//!
//! ### ② 解析层（Parsing）
//! - `parsing/` - 把模型的自由文本解析为带类型的记录，失败时给出可回传的 ParseError
//!
//! ### ③ 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `PromptStage` / `run_stage` - 带纠错重试的提示阶段
//! - `RetrievalPort` / `RankingPort` - 练习检索与排序
//! - `SandboxService` - 运行代码
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/` - 定义"一个主题"的完整处理流程
//! - `TopicPipeline` - 检索 → 排序 → 生成 → 校验/修正 → 验证/修 bug → 保存
//! - `FeedbackFlow` - 运行学员代码并生成反馈
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/topic_batch` - 批量主题处理器，管理并发和故障隔离
//! - `orchestrator/batch_processor` - 应用入口，管理资源和输入输出
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod parsing;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{ExecutionResult, ExerciseDocument, FeedbackReport};
pub use orchestrator::{App, BatchOrchestrator, BatchResult};
pub use workflow::{FeedbackFlow, TopicOutcome, TopicPipeline};
