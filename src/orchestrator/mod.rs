//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 应用入口
//! - 管理应用生命周期（初始化、运行）
//! - 加载评审意见、提取主题
//! - 持有模型客户端、沙箱和练习库
//! - 输出结果文件和全局统计
//!
//! ### `topic_batch` - 批量主题处理器
//! - 主题去重
//! - 控制并发数量（JoinSet + Semaphore）
//! - 隔离单个主题的错误和 panic
//! - 汇总为 `BatchResult`
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (App)
//!     ↓
//! topic_batch (处理 Vec<Topic>)
//!     ↓
//! workflow::TopicPipeline (处理单个 Topic)
//!     ↓
//! services (能力层：stages / retrieval / sandbox)
//!     ↓
//! clients / infrastructure (LLM 客户端、Docker 沙箱)
//! ```

pub mod batch_processor;
pub mod topic_batch;

// 重新导出主要类型
pub use batch_processor::App;
pub use topic_batch::{dedup_topics, BatchEntry, BatchOrchestrator, BatchResult, DroppedTopic};
