//! Source adapter contract. Adapters normalize URLs and timestamps and
//! return a uniform item list; network adapters live outside this crate.

use std::path::PathBuf;

use async_trait::async_trait;
use common_lib::briefing::RawItem;
use common_lib::settings::SourceSettings;

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> anyhow::Result<Vec<RawItem>>;
}

/// Reads a pre-fetched item list from a JSON file. This is the minimal
/// in-tree adapter; anything that can write the `RawItem` JSON shape can
/// feed the pipeline
pub struct JsonFileSource {
    name: String,
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(name: String, path: PathBuf) -> Self {
        Self { name, path }
    }
}

#[async_trait]
impl SourceAdapter for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> anyhow::Result<Vec<RawItem>> {
        let data = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// Builds the configured adapters; an unknown kind is a fatal
/// configuration error
pub fn create_sources(sources: &[SourceSettings]) -> anyhow::Result<Vec<Box<dyn SourceAdapter>>> {
    sources
        .iter()
        .map(|source| match source.kind.as_str() {
            "json_file" => Ok(Box::new(JsonFileSource::new(
                format!("json_file:{}", source.path.display()),
                source.path.clone(),
            )) as Box<dyn SourceAdapter>),
            other => anyhow::bail!("unknown source type: {other}"),
        })
        .collect()
}
