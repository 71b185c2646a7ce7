//! Gemini structured outputs over the generateContent endpoint.

use async_trait::async_trait;
use common_lib::settings::ProviderOptions;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use super::openai::join_endpoint;
use super::schema::to_gemini;
use super::{StructuredGenerator, StructuredRequest};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/";
const API_KEY_ENVS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: String,
}

pub struct GeminiGenerator {
    client: ClientWithMiddleware,
    base_url: Url,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(client: ClientWithMiddleware, options: &ProviderOptions) -> anyhow::Result<Self> {
        let api_key = match &options.api_key_env {
            Some(key_env) => std::env::var(key_env)
                .map_err(|_| anyhow::anyhow!("{key_env} required for the gemini provider"))?,
            None => API_KEY_ENVS
                .iter()
                .find_map(|key_env| std::env::var(key_env).ok())
                .ok_or_else(|| {
                    anyhow::anyhow!("GOOGLE_API_KEY or GEMINI_API_KEY required for the gemini provider")
                })?,
        };
        let base_url = match &options.base_url {
            Some(url) => url.clone(),
            None => Url::parse(DEFAULT_BASE_URL).unwrap(),
        };
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl StructuredGenerator for GeminiGenerator {
    async fn structured_generate(&self, request: &StructuredRequest) -> anyhow::Result<Value> {
        let endpoint = join_endpoint(
            &self.base_url,
            &format!("v1beta/models/{}:generateContent", request.model),
        )?;
        let body = json!({
            "contents": [{ "parts": [{ "text": request.prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": to_gemini(&request.schema),
                "temperature": request.temperature,
            },
        });

        let response: GenerateResponse = self
            .client
            .post(endpoint)
            .timeout(request.timeout)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = &response
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .ok_or_else(|| anyhow::anyhow!("gemini response contains no candidates"))?
            .text;
        Ok(serde_json::from_str(text)?)
    }
}
