//! Single-run driver: fetch, process, summarize, persist.

use std::sync::Arc;
use std::time::Instant;

use common_lib::briefing::{Briefing, PipelineState, RawItem};
use common_lib::settings::Settings;
use uuid::Uuid;

use crate::artifacts::ArtifactWriter;
use crate::embeddings::EmbeddingClient;
use crate::llm::StructuredGenerator;
use crate::metrics::{compute_metrics, Metrics};
use crate::pipeline::run_processing_pipeline;
use crate::rerank::Reranker;
use crate::sources::SourceAdapter;
use crate::stages::{run_multistage_pipeline, StageContext};

pub struct RunOutcome {
    pub briefing: Briefing,
    pub state: PipelineState,
    pub metrics: Metrics,
}

impl RunOutcome {
    /// An empty briefing is a valid outcome; the caller skips publishing
    pub fn is_empty(&self) -> bool {
        self.briefing.topics.is_empty()
    }
}

async fn fetch_items(sources: &[Box<dyn SourceAdapter>]) -> Vec<RawItem> {
    let mut items = Vec::new();
    for source in sources {
        match source.fetch().await {
            Ok(mut fetched) => {
                tracing::info!("source {}: fetched {} items", source.name(), fetched.len());
                items.append(&mut fetched);
            }
            Err(e) => {
                tracing::error!("source {} failed, continuing without it: {:#}", source.name(), e);
            }
        }
    }
    items
}

/// Executes one briefing run end to end. The run always terminates with a
/// summary log line and a metrics artifact; per-cluster failures are
/// recorded, not fatal
pub async fn run_once(
    settings: &Settings,
    sources: &[Box<dyn SourceAdapter>],
    embedding_client: &EmbeddingClient,
    reranker: Arc<dyn Reranker>,
    generator: Arc<dyn StructuredGenerator>,
) -> anyhow::Result<RunOutcome> {
    anyhow::ensure!(
        settings.processing.multi_stage,
        "single-stage summarization is selected outside this pipeline"
    );

    let run_id = Uuid::new_v4().simple().to_string()[..8].to_owned();
    tracing::info!(
        "=== run start id={} briefing_id={} title={} ===",
        run_id,
        settings.briefing_id,
        settings.briefing_title
    );

    let artifacts = Arc::new(ArtifactWriter::create(&settings.output.dir, &settings.briefing_id).await?);

    let t0 = Instant::now();
    let raw_items = fetch_items(sources).await;
    tracing::info!("fetched items={} took_ms={}", raw_items.len(), t0.elapsed().as_millis());

    let t1 = Instant::now();
    let bundles = run_processing_pipeline(
        raw_items,
        &settings.processing,
        embedding_client,
        reranker,
    )
    .await?;
    tracing::info!("processed bundles={} took_ms={}", bundles.len(), t1.elapsed().as_millis());

    let t2 = Instant::now();
    let (briefing, state) = run_multistage_pipeline(
        bundles,
        StageContext::from_settings(settings),
        generator,
        Some(Arc::clone(&artifacts)),
    )
    .await?;
    tracing::info!("summarized took_ms={}", t2.elapsed().as_millis());

    let metrics = compute_metrics(&state, &briefing);
    artifacts.write_metrics(&metrics).await?;

    if briefing.topics.is_empty() {
        tracing::info!("=== run end id={run_id}: empty briefing -> skip publish ===");
    } else {
        tracing::info!(
            "=== run end id={run_id}: {} topics, {} facts picked ===",
            metrics.topics_emitted,
            metrics.facts_picked
        );
    }

    Ok(RunOutcome {
        briefing,
        state,
        metrics,
    })
}
