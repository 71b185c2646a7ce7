//! Client for the remote embedding service.
//!
//! Texts are packed into batches under a token budget and sent to
//! `POST {origin}/embeddings`. Oversized payloads come back as HTTP 413
//! and are recovered by splitting the batch or trimming the text; the
//! returned vectors always align with the input indices.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use common_lib::settings::EmbeddingSettings;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use url::Url;

use crate::text_processing::{clean_text_for_embedding, truncate_chars};

const TRANSPORT_ATTEMPTS: u32 = 3;

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingsResponse {
    Data { data: Vec<EmbeddingData> },
    Plain { embeddings: Vec<Vec<f32>> },
}

impl EmbeddingsResponse {
    fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            EmbeddingsResponse::Data { data } => {
                data.into_iter().map(|d| d.embedding).collect()
            }
            EmbeddingsResponse::Plain { embeddings } => embeddings,
        }
    }
}

/// Pending work queue entry; `force_single` entries are sent alone
#[derive(Debug)]
struct WorkItem {
    index: usize,
    text: String,
    force_single: bool,
}

enum BatchOutcome {
    Vectors(Vec<Vec<f32>>),
    PayloadTooLarge,
}

pub struct EmbeddingClient {
    client: ClientWithMiddleware,
    settings: EmbeddingSettings,
}

impl EmbeddingClient {
    pub fn new(client: ClientWithMiddleware, settings: EmbeddingSettings) -> Self {
        Self { client, settings }
    }

    fn token_estimate(&self, text: &str) -> usize {
        let tokens = (text.chars().count() as f64 / self.settings.chars_per_token).ceil();
        (tokens as usize).max(1)
    }

    /// Character cap implied by the token budget
    fn budget_chars(&self) -> usize {
        let by_tokens =
            (self.settings.max_batch_tokens as f64 * self.settings.chars_per_token) as usize;
        self.settings.max_item_chars.min(by_tokens).max(1)
    }

    /// Embeds all texts, preserving index alignment with the input.
    /// A missing embedding after recovery is an error, never a hole
    pub async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start_time = Instant::now();

        let max_chars = self.budget_chars();
        let mut queue: VecDeque<WorkItem> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| WorkItem {
                index,
                text: truncate_chars(&clean_text_for_embedding(text), max_chars),
                force_single: false,
            })
            .collect();

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut requests = 0usize;

        while !queue.is_empty() {
            // An oversized head cannot be batched; shrink it and retry alone
            let head_tokens = self.token_estimate(&queue[0].text);
            if head_tokens > self.settings.max_batch_tokens {
                let mut item = queue.pop_front().unwrap();
                let len = item.text.chars().count();
                let reduced = (len / 2).min(self.budget_chars());
                anyhow::ensure!(
                    reduced >= 1 && reduced < len,
                    "text at index {} cannot be reduced to fit the embedding token budget",
                    item.index
                );
                item.text = truncate_chars(&item.text, reduced);
                item.force_single = true;
                queue.push_front(item);
                continue;
            }

            let batch = self.take_batch(&mut queue);
            let inputs: Vec<&str> = batch.iter().map(|item| item.text.as_str()).collect();
            requests += 1;

            match self.send_batch(&inputs).await? {
                BatchOutcome::Vectors(vectors) => {
                    anyhow::ensure!(
                        vectors.len() == batch.len(),
                        "embedding service returned {} vectors for {} inputs",
                        vectors.len(),
                        batch.len()
                    );
                    for (item, vector) in batch.into_iter().zip(vectors) {
                        results[item.index] = Some(vector);
                    }
                }
                BatchOutcome::PayloadTooLarge => {
                    self.requeue_after_413(batch, &mut queue)?;
                }
            }
        }

        let embeddings = results
            .into_iter()
            .enumerate()
            .map(|(index, vector)| {
                vector.ok_or_else(|| anyhow::anyhow!("missing embedding for text {}", index))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        tracing::info!(
            "embed_texts count={} requests={} took_ms={}",
            texts.len(),
            requests,
            start_time.elapsed().as_millis()
        );
        Ok(embeddings)
    }

    /// Pops queue entries while the running token sum stays within budget,
    /// stopping at `force_single` entries
    fn take_batch(&self, queue: &mut VecDeque<WorkItem>) -> Vec<WorkItem> {
        let first = queue.pop_front().unwrap();
        let single = first.force_single;
        let mut tokens = self.token_estimate(&first.text);
        let mut batch = vec![first];
        if single {
            return batch;
        }
        while let Some(next) = queue.front() {
            if next.force_single {
                break;
            }
            let next_tokens = self.token_estimate(&next.text);
            if tokens + next_tokens > self.settings.max_batch_tokens {
                break;
            }
            tokens += next_tokens;
            batch.push(queue.pop_front().unwrap());
        }
        batch
    }

    /// Splits a rejected batch in half, or trims a rejected singleton to
    /// 70% of its length. Recovery never consumes a transport attempt
    fn requeue_after_413(
        &self,
        mut batch: Vec<WorkItem>,
        queue: &mut VecDeque<WorkItem>,
    ) -> anyhow::Result<()> {
        if batch.len() > 1 {
            tracing::warn!("embedding payload too large, splitting batch of {}", batch.len());
            let tail = batch.split_off(batch.len() / 2);
            for mut item in batch.into_iter().chain(tail).rev() {
                item.force_single = true;
                queue.push_front(item);
            }
            return Ok(());
        }

        let mut item = batch.pop().unwrap();
        let len = item.text.chars().count();
        let reduced = ((len as f64 * 0.7) as usize).max(1);
        anyhow::ensure!(
            reduced < len,
            "embedding service rejected a minimal payload for text {}",
            item.index
        );
        tracing::warn!(
            "embedding payload too large, trimming text {} from {} to {} chars",
            item.index,
            len,
            reduced
        );
        item.text = truncate_chars(&item.text, reduced);
        item.force_single = true;
        queue.push_front(item);
        Ok(())
    }

    /// Sends one batch with transport retries; HTTP 413 is reported to the
    /// caller instead of being retried
    async fn send_batch(&self, inputs: &[&str]) -> anyhow::Result<BatchOutcome> {
        let mut url: Url = self.settings.origin.clone();
        url.set_path("embeddings");
        let timeout = Duration::from_secs(self.settings.timeout_s);

        let mut last_error = None;
        for attempt in 0..TRANSPORT_ATTEMPTS {
            let response = self
                .client
                .post(url.clone())
                .timeout(timeout)
                .json(&json!({ "input": inputs }))
                .send()
                .await;

            match response {
                Ok(response) if response.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                    return Ok(BatchOutcome::PayloadTooLarge);
                }
                Ok(response) if response.status().is_success() => {
                    match response.json::<EmbeddingsResponse>().await {
                        Ok(parsed) => return Ok(BatchOutcome::Vectors(parsed.into_vectors())),
                        Err(e) => last_error = Some(anyhow::Error::from(e)),
                    }
                }
                Ok(response) => {
                    last_error = Some(anyhow::anyhow!(
                        "embedding service returned {}",
                        response.status()
                    ));
                }
                Err(e) => last_error = Some(anyhow::Error::from(e)),
            }

            if attempt + 1 < TRANSPORT_ATTEMPTS {
                let delay = Duration::from_secs(1 << attempt);
                tracing::warn!(
                    "embedding request attempt {} failed, retrying in {:?}: {}",
                    attempt + 1,
                    delay,
                    last_error.as_ref().unwrap()
                );
                sleep(delay).await;
            }
        }
        Err(last_error
            .unwrap()
            .context(format!("embedding request failed after {TRANSPORT_ATTEMPTS} attempts")))
    }
}
