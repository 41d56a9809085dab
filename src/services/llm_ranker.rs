use std::sync::Arc;

use async_trait::async_trait;

use crate::clients::LanguageModel;
use crate::error::AppResult;
use crate::services::prompt_stage::run_stage;
use crate::services::retrieval::RankingPort;
use crate::services::stages::RankingStage;

/// 用语言模型给候选主题打分
pub struct LlmRanker {
    model: Arc<dyn LanguageModel>,
    max_attempts: u32,
}

impl LlmRanker {
    pub fn new(model: Arc<dyn LanguageModel>, max_attempts: u32) -> Self {
        Self {
            model,
            max_attempts,
        }
    }
}

#[async_trait]
impl RankingPort for LlmRanker {
    async fn rank(&self, topic: &str, candidate_topics: &[String]) -> AppResult<Vec<f64>> {
        if candidate_topics.is_empty() {
            return Ok(Vec::new());
        }
        let stage = RankingStage {
            topic,
            candidates: candidate_topics,
        };
        run_stage(self.model.as_ref(), &stage, self.max_attempts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ChatMessage;
    use crate::error::LlmError;
    use std::sync::Mutex;

    struct Replies(Mutex<Vec<String>>);

    #[async_trait]
    impl LanguageModel for Replies {
        async fn query(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
            Ok(self.0.lock().unwrap().remove(0))
        }
    }

    #[tokio::test]
    async fn test_retries_until_lengths_match() {
        let model = Arc::new(Replies(Mutex::new(vec![
            "[0.9]".to_string(),
            "```json\n[0.9, 0.2]\n```".to_string(),
        ])));
        let ranker = LlmRanker::new(model, 3);
        let scores = ranker
            .rank("loops", &["loop bound".to_string(), "recursion".to_string()])
            .await
            .unwrap();
        assert_eq!(scores, vec![0.9, 0.2]);
    }

    #[tokio::test]
    async fn test_no_candidates_skips_the_model() {
        let model = Arc::new(Replies(Mutex::new(Vec::new())));
        let ranker = LlmRanker::new(model, 3);
        assert!(ranker.rank("loops", &[]).await.unwrap().is_empty());
    }
}
