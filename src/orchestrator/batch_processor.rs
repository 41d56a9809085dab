//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：校验配置、初始化日志文件、创建所有协作者
//! 2. **加载输入**：扫描评审意见 TOML 文件
//! 3. **主题提取**：调用主题提取阶段
//! 4. **批量处理**：委托 `BatchOrchestrator`
//! 5. **结果输出**：写出 JSON 结果并打印统计
//!
//! ## 设计特点
//!
//! - **资源所有者**：唯一创建模型客户端、沙箱和练习库的模块
//! - **向下委托**：不处理单个主题的细节

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};

use crate::clients::{LanguageModel, OpenAiClient};
use crate::config::Config;
use crate::infrastructure::DockerSandboxExecutor;
use crate::models::{collect_comments, load_all_comment_files};
use crate::orchestrator::topic_batch::{BatchOrchestrator, BatchResult};
use crate::services::{
    run_stage, InMemoryExerciseStore, LlmRanker, SandboxService, TopicExtractionStage,
};
use crate::utils::logging::{init_log_file, log_comments_loaded, log_startup, print_final_stats};
use crate::workflow::TopicPipeline;

/// 应用主结构
pub struct App {
    config: Config,
    model: Arc<dyn LanguageModel>,
    store: Arc<InMemoryExerciseStore>,
    orchestrator: BatchOrchestrator,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate().context("配置无效")?;

        init_log_file(&config.output_log_file)
            .with_context(|| format!("无法创建日志文件: {}", config.output_log_file))?;

        let client = OpenAiClient::new(config.llm_settings());
        log_startup(config.max_concurrent_topics, client.model_name());
        let model: Arc<dyn LanguageModel> = Arc::new(client);

        let sandbox_settings = config.sandbox_settings();
        let default_timeout = sandbox_settings.default_timeout;
        let sandbox = Arc::new(SandboxService::new(
            Arc::new(DockerSandboxExecutor::new(sandbox_settings)),
            default_timeout,
        ));

        let store = Arc::new(InMemoryExerciseStore::new(config.retrieval_k));
        let ranker = Arc::new(LlmRanker::new(
            Arc::clone(&model),
            config.stage_max_attempts,
        ));

        let pipeline = Arc::new(TopicPipeline::new(
            Arc::clone(&model),
            store.clone(),
            ranker,
            sandbox,
            config.pipeline_settings(),
        ));
        let orchestrator = BatchOrchestrator::new(pipeline, config.max_concurrent_topics);

        Ok(Self {
            config,
            model,
            store,
            orchestrator,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let comments = self.load_comments().await?;
        if comments.is_empty() {
            warn!("⚠️ 没有找到任何评审意见，程序结束");
            return Ok(());
        }

        info!("\n🧠 正在从评审意见中提取主题...");
        let topics = run_stage(
            self.model.as_ref(),
            &TopicExtractionStage {
                comments: &comments,
            },
            self.config.stage_max_attempts,
        )
        .await
        .context("主题提取失败")?;
        info!("✓ 提取到 {} 个主题", topics.len());

        let batch = self.orchestrator.run_batch(topics).await;
        self.write_results(&batch).await?;

        print_final_stats(
            batch.success_count(),
            batch.dropped.len(),
            batch.len(),
            &self.config.output_file,
            &self.config.output_log_file,
        );
        info!("💾 练习库中共有 {} 个练习", self.store.len().await);

        Ok(())
    }

    /// 加载评审意见
    async fn load_comments(&self) -> Result<Vec<String>> {
        info!("\n📁 正在扫描评审意见文件...");
        let files = load_all_comment_files(&self.config.comments_folder).await?;
        let comments = collect_comments(&files);
        log_comments_loaded(comments.len(), files.len());
        Ok(comments)
    }

    /// 写出 JSON 结果
    async fn write_results(&self, batch: &BatchResult) -> Result<()> {
        let json = serde_json::to_string_pretty(batch).context("序列化批次结果失败")?;
        fs::write(&self.config.output_file, json)
            .await
            .with_context(|| format!("无法写入结果文件: {}", self.config.output_file))?;
        Ok(())
    }
}
