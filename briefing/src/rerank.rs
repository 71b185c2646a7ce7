//! Cross-encoder reranking of cluster candidates against the
//! cluster-central item.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use common_lib::settings::RerankerSettings;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::text_processing::clean_text_for_embedding;

/// Scores candidates against a query; returns candidate indices sorted by
/// descending relevance
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        model: &str,
        query: &str,
        candidates: &[String],
    ) -> anyhow::Result<Vec<usize>>;
}

#[derive(Deserialize)]
struct Scores {
    scores: Vec<f32>,
}

/// Remote cross-encoder behind `POST {origin}/rerank`
pub struct HttpReranker {
    client: ClientWithMiddleware,
    settings: RerankerSettings,
}

impl HttpReranker {
    pub fn new(client: ClientWithMiddleware, settings: RerankerSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        model: &str,
        query: &str,
        candidates: &[String],
    ) -> anyhow::Result<Vec<usize>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let start_time = Instant::now();

        let query = clean_text_for_embedding(query);
        let paragraphs: Vec<String> = candidates
            .iter()
            .map(|text| clean_text_for_embedding(text))
            .collect();
        let queries: Vec<&str> = paragraphs.iter().map(|_| query.as_str()).collect();

        let mut url: Url = self.settings.origin.clone();
        url.set_path("rerank");
        let response: Scores = self
            .client
            .post(url)
            .timeout(Duration::from_secs(self.settings.timeout_s))
            .json(&json!({
                "model": model,
                "queries": queries,
                "paragraphs": paragraphs,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        anyhow::ensure!(
            response.scores.len() == candidates.len(),
            "reranker returned {} scores for {} candidates",
            response.scores.len(),
            candidates.len()
        );

        let order = order_by_scores(&response.scores);
        tracing::info!(
            "rerank candidates={} took_ms={}",
            candidates.len(),
            start_time.elapsed().as_millis()
        );
        Ok(order)
    }
}

/// Indices sorted by descending score; ties keep input order
pub fn order_by_scores(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}
