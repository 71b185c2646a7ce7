//! Embedding client behavior against a stub HTTP service: dynamic
//! batching under the token budget, 413 recovery and index alignment.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use briefing::embeddings::EmbeddingClient;
use briefing::net::plain_client;
use common_lib::settings::EmbeddingSettings;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

#[derive(Deserialize)]
struct EmbedRequest {
    input: Vec<String>,
}

type Calls = Arc<Mutex<Vec<Vec<String>>>>;

async fn spawn_server(app: Router) -> SocketAddr {
    let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap()).serve(app.into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

fn settings_for(addr: SocketAddr, max_batch_tokens: usize, max_item_chars: usize, chars_per_token: f64) -> EmbeddingSettings {
    EmbeddingSettings {
        origin: Url::parse(&format!("http://{addr}")).unwrap(),
        max_batch_tokens,
        max_item_chars,
        chars_per_token,
        timeout_s: 5,
    }
}

/// Returns `[char_count, first_char]` per text so tests can verify both
/// truncation and index alignment
async fn embed_ok(State(calls): State<Calls>, Json(request): Json<EmbedRequest>) -> Json<Value> {
    calls.lock().unwrap().push(request.input.clone());
    let data: Vec<Value> = request
        .input
        .iter()
        .map(|text| {
            let first = text.chars().next().map(|c| c as u32).unwrap_or(0);
            json!({ "embedding": [text.chars().count() as f32, first as f32] })
        })
        .collect();
    Json(json!({ "data": data }))
}

#[tokio::test]
async fn batching_respects_token_budget() {
    let calls: Calls = Default::default();
    let app = Router::new()
        .route("/embeddings", post(embed_ok))
        .with_state(Arc::clone(&calls));
    let addr = spawn_server(app).await;

    let client = EmbeddingClient::new(plain_client(), settings_for(addr, 100, 240, 2.0));
    let texts = vec!["a".repeat(400), "b".repeat(400), "c".repeat(120)];
    let embeddings = client.embed(&texts).await.unwrap();

    // Each text is truncated to min(240, 100 * 2.0) = 200 characters
    assert_eq!(embeddings.len(), 3);
    assert_eq!(embeddings[0][0], 200.0);
    assert_eq!(embeddings[1][0], 200.0);
    assert_eq!(embeddings[2][0], 120.0);

    // Index alignment survives batching
    assert_eq!(embeddings[0][1], f32::from(b'a'));
    assert_eq!(embeddings[1][1], f32::from(b'b'));
    assert_eq!(embeddings[2][1], f32::from(b'c'));

    // The token budget forces three separate requests, all within the cap
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|batch| batch.len() == 1));
    assert!(calls
        .iter()
        .all(|batch| batch.iter().all(|text| text.chars().count() <= 200)));
}

/// Rejects any multi-item batch and any text longer than 120 characters;
/// answers in the bare `embeddings` response shape
async fn embed_413(
    State(calls): State<Calls>,
    Json(request): Json<EmbedRequest>,
) -> Result<Json<Value>, StatusCode> {
    calls.lock().unwrap().push(request.input.clone());
    if request.input.len() > 1 || request.input.iter().any(|text| text.chars().count() > 120) {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }
    let embeddings: Vec<Vec<f32>> = request
        .input
        .iter()
        .map(|text| {
            let first = text.chars().next().map(|c| c as u32).unwrap_or(0);
            vec![text.chars().count() as f32, first as f32]
        })
        .collect();
    Ok(Json(json!({ "embeddings": embeddings })))
}

#[tokio::test]
async fn payload_too_large_recovers_by_splitting_and_trimming() {
    let calls: Calls = Default::default();
    let app = Router::new()
        .route("/embeddings", post(embed_413))
        .with_state(Arc::clone(&calls));
    let addr = spawn_server(app).await;

    let client = EmbeddingClient::new(plain_client(), settings_for(addr, 150, 400, 4.0));
    let texts = vec!["a".repeat(280), "b".repeat(280)];
    let embeddings = client.embed(&texts).await.unwrap();

    assert_eq!(embeddings.len(), 2);
    assert!(embeddings[0][0] <= 120.0);
    assert!(embeddings[1][0] <= 120.0);
    assert_eq!(embeddings[0][1], f32::from(b'a'));
    assert_eq!(embeddings[1][1], f32::from(b'b'));

    // A combined batch is attempted first, then progressively shorter singletons
    let calls = calls.lock().unwrap();
    assert_eq!(calls[0].iter().map(|t| t.chars().count()).collect::<Vec<_>>(), vec![280, 280]);
    assert!(calls[1..].iter().all(|batch| batch.len() == 1));
}

#[tokio::test]
async fn transient_error_consumes_a_retry_then_succeeds() {
    #[derive(Default)]
    struct FlakyState {
        calls: Mutex<u32>,
    }

    async fn flaky(
        State(state): State<Arc<FlakyState>>,
        Json(request): Json<EmbedRequest>,
    ) -> Result<Json<Value>, StatusCode> {
        let mut calls = state.calls.lock().unwrap();
        *calls += 1;
        if *calls == 1 {
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
        let data: Vec<Value> = request
            .input
            .iter()
            .map(|_| json!({ "embedding": [1.0] }))
            .collect();
        Ok(Json(json!({ "data": data })))
    }

    let state = Arc::new(FlakyState::default());
    let app = Router::new()
        .route("/embeddings", post(flaky))
        .with_state(Arc::clone(&state));
    let addr = spawn_server(app).await;

    let client = EmbeddingClient::new(plain_client(), settings_for(addr, 100, 240, 2.0));
    let embeddings = client.embed(&["hello".to_owned()]).await.unwrap();
    assert_eq!(embeddings, vec![vec![1.0]]);
    assert_eq!(*state.calls.lock().unwrap(), 2);
}
