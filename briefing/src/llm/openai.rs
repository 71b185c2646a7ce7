//! OpenAI structured outputs over the chat completions endpoint.

use async_trait::async_trait;
use common_lib::settings::ProviderOptions;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use super::schema::to_openai;
use super::schemas::schema_title;
use super::{StructuredGenerator, StructuredRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

pub struct OpenAiGenerator {
    client: ClientWithMiddleware,
    base_url: Url,
    api_key: String,
}

impl OpenAiGenerator {
    pub fn new(client: ClientWithMiddleware, options: &ProviderOptions) -> anyhow::Result<Self> {
        let key_env = options.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
        let api_key = std::env::var(key_env)
            .map_err(|_| anyhow::anyhow!("{key_env} required for the openai provider"))?;
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

    fn endpoint(&self) -> anyhow::Result<Url> {
        join_endpoint(&self.base_url, "chat/completions")
    }
}

#[async_trait]
impl StructuredGenerator for OpenAiGenerator {
    async fn structured_generate(&self, request: &StructuredRequest) -> anyhow::Result<Value> {
        let body = json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": request.temperature,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema_title(&request.schema),
                    "strict": true,
                    "schema": to_openai(&request.schema),
                }
            },
        });

        let response: ChatResponse = self
            .client
            .post(self.endpoint()?)
            .timeout(request.timeout)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = &response
            .choices
            .first()
            .ok_or_else(|| anyhow::anyhow!("openai response contains no choices"))?
            .message
            .content;
        Ok(serde_json::from_str(content)?)
    }
}

/// Joins an endpoint path onto a base URL, tolerating a missing
/// trailing slash in the configured base
pub(super) fn join_endpoint(base: &Url, endpoint: &str) -> anyhow::Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    Ok(base.join(endpoint)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_join_handles_trailing_slash() {
        let base = Url::parse("https://proxy.example.com/v1/").unwrap();
        assert_eq!(
            join_endpoint(&base, "chat/completions").unwrap().as_str(),
            "https://proxy.example.com/v1/chat/completions"
        );

        let base = Url::parse("https://proxy.example.com/v1").unwrap();
        assert_eq!(
            join_endpoint(&base, "chat/completions").unwrap().as_str(),
            "https://proxy.example.com/v1/chat/completions"
        );
    }
}
