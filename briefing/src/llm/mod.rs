//! Structured generation against LLM providers. Each provider maps the
//! request onto its native strict-JSON-schema mode; the shared retry loop
//! treats transport failures, unparsable responses and schema-shape
//! violations uniformly as one failed attempt.

use std::time::Duration;

use async_trait::async_trait;
use common_lib::settings::SummarizationSettings;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::Value;
use tokio::time::sleep;

pub mod gemini;
pub mod openai;
pub mod schema;
pub mod schemas;

pub use gemini::GeminiGenerator;
pub use openai::OpenAiGenerator;

/// One structured-generation request
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub prompt: String,
    pub model: String,
    /// JSON schema the response must conform to
    pub schema: Value,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Provider-native structured output: returns the parsed JSON object
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn structured_generate(&self, request: &StructuredRequest) -> anyhow::Result<Value>;
}

/// Response-level checks applied inside the retry loop, on top of
/// deserialization
pub trait ValidateResponse {
    fn validate_response(&self) -> anyhow::Result<()>;
}

/// Builds the provider configured in the summarization settings.
/// An unknown provider is a fatal configuration error
pub fn create_generator(
    client: ClientWithMiddleware,
    settings: &SummarizationSettings,
) -> anyhow::Result<Box<dyn StructuredGenerator>> {
    match settings.llm_provider.to_lowercase().as_str() {
        "openai" => Ok(Box::new(OpenAiGenerator::new(client, &settings.openai_options)?)),
        "gemini" => Ok(Box::new(GeminiGenerator::new(client, &settings.gemini_options)?)),
        other => anyhow::bail!("unknown LLM provider: {other}"),
    }
}

/// Calls the provider with `retries + 1` total attempts, sleeping
/// `0.5 * 2^attempt` seconds between failures; the final error propagates
pub async fn call_with_schema<T>(
    generator: &dyn StructuredGenerator,
    request: &StructuredRequest,
    retries: u32,
) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned + ValidateResponse,
{
    let mut last_error = None;
    for attempt in 0..=retries {
        let result = async {
            let value = generator.structured_generate(request).await?;
            let parsed: T = serde_json::from_value(value)?;
            parsed.validate_response()?;
            Ok::<T, anyhow::Error>(parsed)
        }
        .await;

        match result {
            Ok(parsed) => return Ok(parsed),
            Err(e) => {
                if attempt < retries {
                    let delay = Duration::from_millis(500 * (1 << attempt));
                    tracing::warn!(
                        "structured call attempt {}/{} failed, retrying in {:?}: {}",
                        attempt + 1,
                        retries + 1,
                        delay,
                        e
                    );
                    sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap())
}
