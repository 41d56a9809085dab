//! 批量主题处理器 - 编排层
//!
//! ## 职责
//!
//! 1. **去重**：完全相同的主题只处理一次，保留首次出现的顺序
//! 2. **并发控制**：JoinSet + Semaphore 限制同时运行的主题数
//! 3. **故障隔离**：单个主题的错误或 panic 只影响它自己
//! 4. **结果汇总**：按请求顺序折叠为 `BatchResult`

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::models::ExerciseDocument;
use crate::utils::logging::{log_batch_complete, log_batch_start};
use crate::workflow::{TopicOutcome, TopicPipeline};

/// 单个主题在批次中的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    pub topic: String,
    /// adopted / persisted / invalid / pipeline_error
    pub outcome: &'static str,
    pub exercise: Option<ExerciseDocument>,
}

/// 没有得到练习的主题及原因
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedTopic {
    pub topic: String,
    pub reason: String,
}

/// 批次结果（顺序与去重后的请求顺序一致）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub entries: Vec<BatchEntry>,
    pub dropped: Vec<DroppedTopic>,
}

impl BatchResult {
    /// 所有得到练习的 (主题, 练习)
    pub fn exercises(&self) -> Vec<(&str, &ExerciseDocument)> {
        self.entries
            .iter()
            .filter_map(|e| e.exercise.as_ref().map(|doc| (e.topic.as_str(), doc)))
            .collect()
    }

    /// 按请求的主题查找练习
    pub fn get(&self, topic: &str) -> Option<&ExerciseDocument> {
        self.entries
            .iter()
            .find(|e| e.topic == topic)
            .and_then(|e| e.exercise.as_ref())
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.exercise.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, topic: String, result: Result<TopicOutcome, String>) {
        let (outcome, exercise, reason) = match result {
            Ok(TopicOutcome::Adopted { exercise, .. }) => ("adopted", Some(exercise), None),
            Ok(TopicOutcome::Persisted { exercise, .. }) => ("persisted", Some(exercise), None),
            Ok(TopicOutcome::Invalid) => (
                "invalid",
                None,
                Some("exercise did not pass validation".to_string()),
            ),
            Err(reason) => ("pipeline_error", None, Some(reason)),
        };
        if let Some(reason) = reason {
            self.dropped.push(DroppedTopic {
                topic: topic.clone(),
                reason,
            });
        }
        self.entries.push(BatchEntry {
            topic,
            outcome,
            exercise,
        });
    }
}

/// 批量主题处理器
pub struct BatchOrchestrator {
    pipeline: Arc<TopicPipeline>,
    max_concurrent: usize,
}

impl BatchOrchestrator {
    pub fn new(pipeline: Arc<TopicPipeline>, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 并发处理一批主题
    ///
    /// 总是返回（可能不完整的）结果，失败的主题记录在 `dropped` 中
    pub async fn run_batch(&self, topics: Vec<String>) -> BatchResult {
        let topics = dedup_topics(topics);
        let total = topics.len();
        log_batch_start(total, self.max_concurrent);

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut join_set = JoinSet::new();

        for (idx, topic) in topics.iter().cloned().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (idx, Err("concurrency limiter closed".to_string()));
                };
                let result = AssertUnwindSafe(pipeline.run(idx + 1, &topic))
                    .catch_unwind()
                    .await;
                let result = match result {
                    Ok(Ok(outcome)) => Ok(outcome),
                    Ok(Err(e)) => {
                        error!("[topic #{} \"{}\"] ❌ 处理过程中发生错误: {}", idx + 1, topic, e);
                        Err(e.to_string())
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!("[topic #{} \"{}\"] ❌ 任务 panic: {}", idx + 1, topic, message);
                        Err(format!("topic task panicked: {}", message))
                    }
                };
                (idx, result)
            });
        }

        let mut ordered: Vec<Option<Result<TopicOutcome, String>>> = vec![None; total];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, result)) => ordered[idx] = Some(result),
                Err(e) => warn!("⚠️ 主题任务未能完成: {}", e),
            }
        }

        let mut batch = BatchResult::default();
        for (topic, slot) in topics.into_iter().zip(ordered) {
            let result = slot.unwrap_or_else(|| Err("topic task did not complete".to_string()));
            batch.push(topic, result);
        }

        log_batch_complete(batch.success_count(), total);
        for dropped in &batch.dropped {
            info!("  ✗ \"{}\": {}", dropped.topic, dropped.reason);
        }
        batch
    }
}

/// 完全相同的主题只保留第一次出现
pub fn dedup_topics(topics: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    topics
        .into_iter()
        .filter(|topic| seen.insert(topic.clone()))
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let topics = vec![
            "loops".to_string(),
            "recursion".to_string(),
            "loops".to_string(),
            "Loops".to_string(),
        ];
        assert_eq!(dedup_topics(topics), vec!["loops", "recursion", "Loops"]);
    }

    #[test]
    fn test_push_records_dropped_reasons() {
        let mut batch = BatchResult::default();
        batch.push("a".to_string(), Ok(TopicOutcome::Invalid));
        batch.push("b".to_string(), Err("model unavailable".to_string()));

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.success_count(), 0);
        assert_eq!(batch.entries[0].outcome, "invalid");
        assert_eq!(batch.entries[1].outcome, "pipeline_error");
        assert_eq!(batch.dropped[1].reason, "model unavailable");
        assert!(batch.get("a").is_none());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
