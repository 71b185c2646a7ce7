//! End-to-end run of the embedding-and-clustering pipeline against a stub
//! embedding service and a deterministic reranker.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::routing::post;
use axum::{Json, Router};
use briefing::embeddings::EmbeddingClient;
use briefing::net::plain_client;
use briefing::pipeline::run_processing_pipeline;
use briefing::rerank::Reranker;
use chrono::{Duration, Utc};
use common_lib::briefing::{ItemMetadata, RawItem, Timestamp};
use common_lib::settings::{EmbeddingSettings, ProcessingSettings};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

#[derive(Deserialize)]
struct EmbedRequest {
    input: Vec<String>,
}

/// Maps texts onto fixed vectors by keyword so dedup and clustering are
/// fully deterministic
async fn embed_by_keyword(Json(request): Json<EmbedRequest>) -> Json<Value> {
    let data: Vec<Value> = request
        .input
        .iter()
        .map(|text| {
            let embedding = if text.contains("alpha") {
                [1.0, 0.0, 0.0]
            } else {
                [0.0, 1.0, 0.0]
            };
            json!({ "embedding": embedding })
        })
        .collect();
    Json(json!({ "data": data }))
}

async fn spawn_server(app: Router) -> SocketAddr {
    let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap()).serve(app.into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

/// Reverses the candidate order, proving rerank ordering reaches the bundle
struct ReversingReranker;

#[async_trait]
impl Reranker for ReversingReranker {
    async fn rerank(
        &self,
        _model: &str,
        _query: &str,
        candidates: &[String],
    ) -> anyhow::Result<Vec<usize>> {
        Ok((0..candidates.len()).rev().collect())
    }
}

fn item(id: &str, text: &str, hours_ago: i64) -> RawItem {
    RawItem {
        id: id.to_owned(),
        text: text.to_owned(),
        url: format!("https://example.com/{id}"),
        author: None,
        timestamp: Timestamp::Utc(Utc::now() - Duration::hours(hours_ago)),
        metadata: ItemMetadata {
            source: "test".to_owned(),
            extra: Default::default(),
        },
    }
}

#[tokio::test]
async fn dedup_clustering_and_rerank_order() {
    let addr = spawn_server(Router::new().route("/embeddings", post(embed_by_keyword))).await;

    let settings = ProcessingSettings {
        time_window_hours: 24,
        embedding: EmbeddingSettings {
            origin: Url::parse(&format!("http://{addr}")).unwrap(),
            timeout_s: 5,
            ..Default::default()
        },
        ..Default::default()
    };
    let embedding_client = EmbeddingClient::new(plain_client(), settings.embedding.clone());

    let items = vec![
        item("alpha-1", "alpha news original", 1),
        item("alpha-2", "alpha news duplicate", 2),
        item("beta-1", "beta story", 3),
        item("stale-1", "alpha but ancient", 48),
    ];

    let bundles = run_processing_pipeline(
        items,
        &settings,
        &embedding_client,
        Arc::new(ReversingReranker),
    )
    .await
    .unwrap();

    // Too few survivors for a dense cluster: everything lands in the noise
    // bundle, with the near-duplicate and the stale item gone
    assert_eq!(bundles.len(), 1);
    let bundle = &bundles[0];
    assert_eq!(bundle.cluster_id, "cluster--1");
    assert_eq!(bundle.items.len(), 2);

    let ids: Vec<&str> = bundle
        .items
        .iter()
        .map(|item| item.item_id.as_deref().unwrap())
        .collect();
    // The reranker reversed centroid order, and alpha-2 was suppressed as
    // a near duplicate of alpha-1
    assert!(ids.contains(&"alpha-1"));
    assert!(ids.contains(&"beta-1"));
    assert!(!ids.contains(&"alpha-2"));
    assert!(!ids.contains(&"stale-1"));

    assert_eq!(bundle.canonical_links.len(), 2);
    assert!(bundle
        .canonical_links
        .iter()
        .all(|url| url.as_str().starts_with("https://example.com/")));
}

#[tokio::test]
async fn empty_input_short_circuits_without_network() {
    // No server is running on this port; an empty input must not call it
    let settings = ProcessingSettings {
        embedding: EmbeddingSettings {
            origin: Url::parse("http://127.0.0.1:9").unwrap(),
            timeout_s: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    let embedding_client = EmbeddingClient::new(plain_client(), settings.embedding.clone());

    let bundles = run_processing_pipeline(
        Vec::new(),
        &settings,
        &embedding_client,
        Arc::new(ReversingReranker),
    )
    .await
    .unwrap();
    assert!(bundles.is_empty());
}
