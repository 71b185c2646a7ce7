use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub briefing_id: String,
    pub briefing_title: String,
    pub sources: Vec<SourceSettings>,
    pub processing: ProcessingSettings,
    pub summarization: SummarizationSettings,
    pub output: OutputSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            briefing_id: String::new(),
            briefing_title: String::new(),
            sources: Vec::new(),
            processing: Default::default(),
            summarization: Default::default(),
            output: Default::default(),
        }
    }
}

impl Settings {
    /// Checks the configuration before any network I/O; errors are fatal
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.briefing_id.is_empty(), "briefing_id is required");
        anyhow::ensure!(!self.briefing_title.is_empty(), "briefing_title is required");
        self.processing.validate()?;
        self.summarization.validate()?;
        Ok(())
    }
}

/// One configured content source; fetching itself is adapter-specific
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Adapter kind, e.g. "json_file"
    pub kind: String,
    /// Adapter-specific location (file path for "json_file")
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    /// Recency horizon; items older than this are dropped
    pub time_window_hours: i64,
    /// Cosine similarity above which a later item counts as a duplicate
    pub sim_near_dup: f32,
    pub min_cluster_size: usize,
    /// Candidates preselected by centroid similarity before reranking
    pub initial_topk: usize,
    pub max_candidates_per_cluster: usize,
    pub embedding: EmbeddingSettings,
    pub reranker: RerankerSettings,
    /// The in-crate summarization path is multi-stage; a single-stage
    /// path is selected outside this pipeline
    pub multi_stage: bool,
    /// Promote agentic-flagged topics into a leading "Agentic Focus" section
    pub agentic_section: bool,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            time_window_hours: 24,
            sim_near_dup: 0.92,
            min_cluster_size: 3,
            initial_topk: 1000,
            max_candidates_per_cluster: 300,
            embedding: Default::default(),
            reranker: Default::default(),
            multi_stage: true,
            agentic_section: false,
        }
    }
}

impl ProcessingSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.time_window_hours > 0, "time_window_hours must be positive");
        anyhow::ensure!(
            self.sim_near_dup > 0.0 && self.sim_near_dup <= 1.0,
            "sim_near_dup must be in (0, 1]"
        );
        anyhow::ensure!(self.min_cluster_size >= 2, "min_cluster_size must be at least 2");
        anyhow::ensure!(self.initial_topk >= 1, "initial_topk must be at least 1");
        anyhow::ensure!(
            self.max_candidates_per_cluster >= 1,
            "max_candidates_per_cluster must be at least 1"
        );
        self.embedding.validate()?;
        anyhow::ensure!(!self.reranker.model.is_empty(), "reranker model is required");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Origin of the embedding service, e.g. http://tei:3000
    pub origin: Url,
    /// Token budget for a single request
    pub max_batch_tokens: usize,
    /// Hard character cap for a single text
    pub max_item_chars: usize,
    /// Characters per token used for the token estimate
    pub chars_per_token: f64,
    pub timeout_s: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://127.0.0.1:3000").unwrap(),
            max_batch_tokens: 8192,
            max_item_chars: 8000,
            chars_per_token: 4.0,
            timeout_s: 60,
        }
    }
}

impl EmbeddingSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.max_batch_tokens >= 1, "max_batch_tokens must be at least 1");
        anyhow::ensure!(self.max_item_chars >= 1, "max_item_chars must be at least 1");
        anyhow::ensure!(
            self.chars_per_token >= 0.1,
            "chars_per_token must be at least 0.1"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerSettings {
    /// Origin of the cross-encoder service
    pub origin: Url,
    /// Model reference passed through to the service
    pub model: String,
    pub timeout_s: u64,
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://127.0.0.1:3001").unwrap(),
            model: "BAAI/bge-reranker-v2-m3".to_owned(),
            timeout_s: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationSettings {
    /// "openai" or "gemini"
    pub llm_provider: String,
    pub openai_model: String,
    pub gemini_model: String,
    pub temperature: f32,
    pub timeout_s: u64,
    /// Extra attempts on top of the first one
    pub retries: u32,
    /// Worker pool size for per-cluster stages
    pub max_concurrency: usize,
    pub openai_options: ProviderOptions,
    pub gemini_options: ProviderOptions,
}

impl Default for SummarizationSettings {
    fn default() -> Self {
        Self {
            llm_provider: "gemini".to_owned(),
            openai_model: "gpt-4o-2024-08-06".to_owned(),
            gemini_model: "gemini-2.0-flash-exp".to_owned(),
            temperature: 0.2,
            timeout_s: 600,
            retries: 0,
            max_concurrency: 4,
            openai_options: Default::default(),
            gemini_options: Default::default(),
        }
    }
}

impl SummarizationSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        let provider = self.llm_provider.to_lowercase();
        anyhow::ensure!(
            provider == "openai" || provider == "gemini",
            "unknown LLM provider: {}",
            self.llm_provider
        );
        anyhow::ensure!(self.max_concurrency >= 1, "max_concurrency must be at least 1");
        Ok(())
    }

    /// Model name for the configured provider
    pub fn model(&self) -> &str {
        if self.llm_provider.to_lowercase() == "openai" {
            &self.openai_model
        } else {
            &self.gemini_model
        }
    }
}

/// Provider-specific connection options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    /// Endpoint override, e.g. a proxy in front of the provider
    pub base_url: Option<Url>,
    /// Environment variable holding the API key, overriding the default
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Directory under which per-run artifact directories are created
    pub dir: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("out"),
        }
    }
}
