use std::path::PathBuf;
use std::sync::Arc;

use briefing::embeddings::EmbeddingClient;
use briefing::llm::{create_generator, StructuredGenerator};
use briefing::net::{plain_client, retrying_client};
use briefing::orchestrator::run_once;
use briefing::rerank::{HttpReranker, Reranker};
use briefing::settings::read_settings_file;
use briefing::sources::create_sources;
use clap::Parser;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use tracing_unwrap::ResultExt;

#[derive(Debug, Parser)]
#[command(author, version, about = "Run a briefing generation task", long_about = None)]
struct Args {
    /// Path to the briefing settings TOML file
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let settings = read_settings_file(&args.config)
        .await
        .expect_or_log("Can't read settings");
    settings.validate().expect_or_log("Invalid settings");

    let sources = create_sources(&settings.sources).expect_or_log("Can't create sources");
    let embedding_client = EmbeddingClient::new(plain_client(), settings.processing.embedding.clone());
    let reranker: Arc<dyn Reranker> = Arc::new(HttpReranker::new(
        retrying_client(3),
        settings.processing.reranker.clone(),
    ));
    let generator: Arc<dyn StructuredGenerator> =
        Arc::from(create_generator(plain_client(), &settings.summarization)
            .expect_or_log("Can't create LLM provider"));

    match run_once(&settings, &sources, &embedding_client, reranker, generator).await {
        Ok(outcome) if outcome.is_empty() => {
            tracing::info!("empty briefing, nothing to publish");
        }
        Ok(_) => {
            tracing::info!("OK: briefing generated");
        }
        Err(e) => {
            tracing::error!("briefing run failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
