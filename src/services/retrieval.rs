//! 检索与排序端口
//!
//! 向量检索、相似度排序的后端不在本 crate 内，这里只定义接口，
//! 并提供一个进程内的存储实现（二进制程序和测试使用）。

use std::collections::HashSet;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{AppResult, RetrievalError};
use crate::models::{Candidate, ExerciseDocument};

/// 检索存储端口
#[async_trait]
pub trait RetrievalPort: Send + Sync {
    /// 查找与主题相关的已有练习（按相关度排序）
    async fn lookup(&self, topic: &str) -> Result<Vec<Candidate>, RetrievalError>;

    /// 保存练习，以内容哈希为键，重复保存不会产生新记录
    ///
    /// # 返回
    /// 记录的键
    async fn save(&self, topic: &str, exercise: &ExerciseDocument)
        -> Result<String, RetrievalError>;
}

/// 相似度排序端口
#[async_trait]
pub trait RankingPort: Send + Sync {
    /// 每个候选主题一个 [0, 1] 分数，顺序与输入一致
    async fn rank(&self, topic: &str, candidate_topics: &[String]) -> AppResult<Vec<f64>>;
}

/// (主题, 原文) 的 SHA-256 十六进制摘要
pub fn content_hash(topic: &str, raw_source_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(topic.as_bytes());
    hasher.update([0u8]);
    hasher.update(raw_source_text.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
struct StoredExercise {
    key: String,
    topic: String,
    exercise: ExerciseDocument,
}

/// 进程内练习存储
///
/// 按词重叠度粗排，返回前 k 个候选；精排交给 [`RankingPort`]
pub struct InMemoryExerciseStore {
    records: RwLock<Vec<StoredExercise>>,
    k: usize,
}

impl InMemoryExerciseStore {
    pub fn new(k: usize) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            k,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// 所有已保存的练习（按保存顺序）
    pub async fn exercises(&self) -> Vec<(String, ExerciseDocument)> {
        self.records
            .read()
            .await
            .iter()
            .map(|r| (r.topic.clone(), r.exercise.clone()))
            .collect()
    }
}

#[async_trait]
impl RetrievalPort for InMemoryExerciseStore {
    async fn lookup(&self, topic: &str) -> Result<Vec<Candidate>, RetrievalError> {
        let query = tokens(topic);
        let records = self.records.read().await;

        let mut scored: Vec<(f64, &StoredExercise)> = records
            .iter()
            .map(|r| (overlap(&query, &tokens(&r.topic)), r))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        // 稳定排序，分数相同时保持保存顺序
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let candidates: Vec<Candidate> = scored
            .into_iter()
            .take(self.k)
            .map(|(_, r)| Candidate {
                topic: r.topic.clone(),
                exercise: r.exercise.clone(),
            })
            .collect();
        debug!("检索 '{}' 命中 {} 个候选", topic, candidates.len());
        Ok(candidates)
    }

    async fn save(
        &self,
        topic: &str,
        exercise: &ExerciseDocument,
    ) -> Result<String, RetrievalError> {
        let key = content_hash(topic, &exercise.raw_source_text);
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.key == key) {
            debug!("练习已存在，跳过保存: {}", &key[..12]);
            return Ok(key);
        }
        records.push(StoredExercise {
            key: key.clone(),
            topic: topic.to_string(),
            exercise: exercise.clone(),
        });
        Ok(key)
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard 系数
fn overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count() as f64;
    shared / a.union(b).count() as f64
}
