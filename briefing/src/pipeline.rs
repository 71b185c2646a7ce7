//! Content processing pipeline: time filtering, embedding, near-duplicate
//! suppression, density clustering and per-cluster candidate reranking.
//! Produces the cluster bundles consumed by the summarization stages.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use common_lib::briefing::{ClusterBundle, ClusterItem, RawItem};
use common_lib::settings::ProcessingSettings;
use tracing_unwrap::ResultExt;
use url::Url;

use crate::clustering::cluster_items;
use crate::embeddings::EmbeddingClient;
use crate::rerank::Reranker;
use crate::similarity::{most_central, near_duplicate_mask, top_k_by_centroid};

/// Drops items outside the recency horizon. Items whose timestamp cannot
/// be read as a UTC instant are dropped with a warning
fn filter_by_time_window(raw_items: Vec<RawItem>, time_window_hours: i64) -> Vec<RawItem> {
    let horizon = Utc::now() - Duration::hours(time_window_hours);
    let mut kept = Vec::with_capacity(raw_items.len());
    let mut too_old = 0usize;
    let mut invalid = 0usize;

    for item in raw_items {
        match item.timestamp.as_utc() {
            None => {
                tracing::warn!("failed to parse timestamp for item {}", item.id);
                invalid += 1;
            }
            Some(ts) if ts >= horizon => kept.push(item),
            Some(ts) => {
                too_old += 1;
                tracing::debug!(
                    "item {} filtered: too old (age={:.1} hours)",
                    item.id,
                    (Utc::now() - ts).num_minutes() as f64 / 60.0
                );
            }
        }
    }

    tracing::info!(
        "time filter: kept {} items, filtered {} old items, dropped {} invalid timestamps (window={} hours)",
        kept.len(),
        too_old,
        invalid,
        time_window_hours
    );
    kept
}

/// Runs the full embedding-and-clustering pipeline, returning bundles
/// sorted by cluster size (largest first)
pub async fn run_processing_pipeline(
    raw_items: Vec<RawItem>,
    settings: &ProcessingSettings,
    embedding_client: &EmbeddingClient,
    reranker: Arc<dyn Reranker>,
) -> anyhow::Result<Vec<ClusterBundle>> {
    if raw_items.is_empty() {
        return Ok(Vec::new());
    }
    let start_time = Instant::now();

    let items = filter_by_time_window(raw_items, settings.time_window_hours);
    if items.is_empty() {
        tracing::info!("pipeline: no items after time window filter");
        return Ok(Vec::new());
    }

    let texts: Vec<String> = items.iter().map(|item| item.text.clone()).collect();
    let embeddings = embedding_client.embed(&texts).await?;
    anyhow::ensure!(
        embeddings.len() == items.len(),
        "embedding count {} does not match item count {}",
        embeddings.len(),
        items.len()
    );

    let mask = near_duplicate_mask(&embeddings, settings.sim_near_dup);
    let items: Vec<RawItem> = items
        .into_iter()
        .zip(&mask)
        .filter_map(|(item, &keep)| keep.then_some(item))
        .collect();
    let embeddings: Vec<Vec<f32>> = embeddings
        .into_iter()
        .zip(&mask)
        .filter_map(|(embedding, &keep)| keep.then_some(embedding))
        .collect();
    if items.is_empty() {
        tracing::info!("pipeline: all items removed by near-duplicate filter");
        return Ok(Vec::new());
    }

    let clusters = cluster_items(&embeddings, settings.min_cluster_size);

    // Rerank every cluster's candidates in parallel
    let mut tasks = Vec::new();
    let mut picks = Vec::new();
    for (label, member_indices) in &clusters {
        let k = settings.initial_topk.min(member_indices.len());
        let mut pick = top_k_by_centroid(&embeddings, member_indices, k);
        pick.truncate(settings.max_candidates_per_cluster);

        let query_index = most_central(&embeddings, member_indices);
        let query = items[query_index].text.clone();
        let candidates: Vec<String> =
            pick.iter().map(|&index| items[index].text.clone()).collect();

        let reranker = Arc::clone(&reranker);
        let model = settings.reranker.model.clone();
        tasks.push(tokio::spawn(async move {
            reranker.rerank(&model, &query, &candidates).await
        }));
        picks.push((*label, pick));
    }

    let mut bundles = Vec::with_capacity(picks.len());
    for (task, (label, pick)) in tasks.into_iter().zip(picks) {
        let order = task.await.unwrap_or_log()?;
        let ordered_items: Vec<ClusterItem> = order
            .into_iter()
            .map(|i| ClusterItem::from_raw(&items[pick[i]]))
            .collect();

        let mut seen = HashSet::new();
        let canonical_links: Vec<Url> = ordered_items
            .iter()
            .filter_map(|item| item.http_url())
            .filter(|url| seen.insert(url.clone()))
            .collect();

        bundles.push(ClusterBundle {
            cluster_id: format!("cluster-{label}"),
            items: ordered_items,
            canonical_links,
        });
    }

    bundles.sort_by_key(|bundle| std::cmp::Reverse(bundle.items.len()));
    tracing::info!(
        "pipeline: bundles={} took_ms={}",
        bundles.len(),
        start_time.elapsed().as_millis()
    );
    Ok(bundles)
}
