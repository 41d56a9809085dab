//! 业务能力层（Services Layer）
//!
//! 描述"我能做什么"：提示阶段、检索端口、沙箱服务。
//! 不关心流程顺序，也不认识批次。

pub mod llm_ranker;
pub mod prompt_stage;
pub mod prompts;
pub mod retrieval;
pub mod sandbox_service;
pub mod stages;

pub use llm_ranker::LlmRanker;
pub use prompt_stage::{run_stage, PromptStage};
pub use retrieval::{content_hash, InMemoryExerciseStore, RankingPort, RetrievalPort};
pub use sandbox_service::SandboxService;
pub use stages::{
    BugFixingStage, ExerciseCorrectionStage, ExerciseGenerationStage, ExerciseValidationStage,
    FeedbackStage, RankingStage, TopicExtractionStage,
};
