//! 流程层（Workflow Layer）
//!
//! 定义"一个主题"和"一次学员提交"的完整处理流程

mod autotest;
pub mod feedback_flow;
pub mod topic_pipeline;
pub mod topic_run;

pub use feedback_flow::FeedbackFlow;
pub use topic_pipeline::{pick_best, TopicOutcome, TopicPipeline};
pub use topic_run::{TopicCtx, TopicRun};
