use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use url::Url;

/// Timestamp as delivered by a source adapter.
/// Adapters normally emit UTC instants, but feeds also carry raw strings
/// and epoch seconds; the pipeline parses or drops those at the time filter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Utc(DateTime<Utc>),
    EpochSeconds(f64),
    Text(String),
}

impl Timestamp {
    /// Returns the timestamp as a UTC instant, or `None` if it can't be parsed
    pub fn as_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Utc(dt) => Some(*dt),
            Timestamp::EpochSeconds(secs) => {
                let naive = NaiveDateTime::from_timestamp_opt(
                    secs.trunc() as i64,
                    (secs.fract() * 1e9) as u32,
                )?;
                Some(DateTime::from_utc(naive, Utc))
            }
            Timestamp::Text(raw) => parse_datetime_text(raw),
        }
    }
}

/// Parses a timestamp string in one of the formats seen in source feeds
pub fn parse_datetime_text(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

/// Parses a URL, accepting only http/https
pub fn parse_http_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Source metadata attached to an item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Channel name, e.g. hn/twitter/reddit
    #[serde(default)]
    pub source: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Uniform item as produced by a source adapter
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawItem {
    pub id: String,
    pub text: String,
    /// Raw URL; validated to http/https before facts may reference it
    pub url: String,
    pub author: Option<String>,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub metadata: ItemMetadata,
}

/// Single item grouped into a cluster before LLM processing
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterItem {
    pub item_id: Option<String>,
    pub text: String,
    pub url: String,
    pub source: Option<String>,
    pub author: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ClusterItem {
    pub fn from_raw(item: &RawItem) -> Self {
        Self {
            item_id: Some(item.id.clone()),
            text: item.text.clone(),
            url: item.url.clone(),
            source: (!item.metadata.source.is_empty()).then(|| item.metadata.source.clone()),
            author: item.author.clone(),
            timestamp: item.timestamp.as_utc(),
        }
    }

    /// URL of the item if it is a valid http/https URL
    pub fn http_url(&self) -> Option<Url> {
        parse_http_url(&self.url)
    }
}

/// Post-reranking representation of a cluster, ready for LLM consumption.
/// Items are ordered by rerank score (descending)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterBundle {
    pub cluster_id: String,
    pub items: Vec<ClusterItem>,
    #[serde(default)]
    pub canonical_links: Vec<Url>,
}

impl ClusterBundle {
    /// URLs of items that facts are allowed to reference
    pub fn allowed_urls(&self) -> HashSet<String> {
        self.items
            .iter()
            .filter_map(|item| item.http_url())
            .map(String::from)
            .collect()
    }
}

/// Single atomic claim extracted from a cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub fact_id: String,
    pub text: String,
    pub url: Url,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedFact {
    pub fact_id: Option<String>,
    pub item_id: Option<String>,
    pub reason: String,
}

/// Stage 1 output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterFacts {
    pub cluster_id: String,
    #[serde(default)]
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub rejected: Vec<RejectedFact>,
}

/// Multi-dimensional fact scores with bounded ranges
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FactScores {
    pub actionability: u8,
    pub novelty: u8,
    pub impact: u8,
    pub reusability: u8,
    pub reliability: u8,
    #[serde(default)]
    pub agentic_bonus: u8,
}

impl FactScores {
    pub fn weighted_total(&self) -> u32 {
        u32::from(self.actionability)
            + u32::from(self.novelty)
            + u32::from(self.impact)
            + u32::from(self.reusability)
            + u32::from(self.reliability)
            + u32::from(self.agentic_bonus)
    }

    /// Checks the per-dimension upper bounds
    pub fn validate(&self) -> anyhow::Result<()> {
        let bounds = [
            ("actionability", self.actionability, 3),
            ("novelty", self.novelty, 2),
            ("impact", self.impact, 2),
            ("reusability", self.reusability, 2),
            ("reliability", self.reliability, 1),
            ("agentic_bonus", self.agentic_bonus, 1),
        ];
        for (name, value, max) in bounds {
            anyhow::ensure!(value <= max, "score {} = {} exceeds maximum {}", name, value, max);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredFact {
    pub fact_id: String,
    pub text: String,
    pub url: Url,
    pub scores: FactScores,
    #[serde(default)]
    pub strategic_flag: bool,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedFact {
    pub fact_id: String,
    pub reason: String,
}

/// Stage 2 output
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSelection {
    pub cluster_id: String,
    #[serde(default)]
    pub picked: Vec<ScoredFact>,
    #[serde(default)]
    pub dropped: Vec<DroppedFact>,
    pub notes: Option<String>,
}

impl ClusterSelection {
    pub fn max_score(&self) -> u32 {
        self.picked
            .iter()
            .map(|fact| fact.scores.weighted_total())
            .max()
            .unwrap_or(0)
    }

    pub fn has_agentic(&self) -> bool {
        self.picked.iter().any(|fact| fact.scores.agentic_bonus > 0)
    }

    pub fn has_strategic(&self) -> bool {
        self.picked.iter().any(|fact| fact.strategic_flag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletDraft {
    pub text: String,
    pub url: Url,
    #[serde(default)]
    pub fact_ids: Vec<String>,
}

/// Agentic/strategic markers emitted by the drafting stage
#[skip_serializing_none]
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TopicAnnotations {
    pub agentic: Option<bool>,
    pub strategic: Option<bool>,
}

impl TopicAnnotations {
    pub fn is_agentic(&self) -> bool {
        self.agentic.unwrap_or(false)
    }
}

/// Stage 3 output
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicDraft {
    pub topic_id: String,
    pub headline: String,
    #[serde(default)]
    pub bullets: Vec<BulletDraft>,
    #[serde(default)]
    pub annotations: TopicAnnotations,
    pub notes: Option<String>,
}

impl TopicDraft {
    /// Checks the draft-local constraints: 1-4 bullets with distinct URLs
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=4).contains(&self.bullets.len()),
            "draft {} must include 1-4 bullets, got {}",
            self.topic_id,
            self.bullets.len()
        );
        let mut urls = HashSet::new();
        for bullet in &self.bullets {
            anyhow::ensure!(
                urls.insert(bullet.url.as_str()),
                "draft {} repeats bullet URL {}",
                self.topic_id,
                bullet.url
            );
        }
        Ok(())
    }

    /// Checks the cross-stage constraints: bullet URLs and fact ids must
    /// come from the picked facts of the cluster's selection
    pub fn validate_against(&self, selection: &ClusterSelection) -> anyhow::Result<()> {
        let picked_urls: HashSet<&str> = selection
            .picked
            .iter()
            .map(|fact| fact.url.as_str())
            .collect();
        let picked_ids: HashSet<&str> = selection
            .picked
            .iter()
            .map(|fact| fact.fact_id.as_str())
            .collect();
        for bullet in &self.bullets {
            anyhow::ensure!(
                picked_urls.contains(bullet.url.as_str()),
                "draft {} bullet URL {} is not among picked facts",
                self.topic_id,
                bullet.url
            );
            for fact_id in &bullet.fact_ids {
                anyhow::ensure!(
                    picked_ids.contains(fact_id.as_str()),
                    "draft {} references unknown fact {}",
                    self.topic_id,
                    fact_id
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bullet {
    pub text: String,
    pub url: Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub topic_id: String,
    pub headline: String,
    pub bullets: Vec<Bullet>,
}

/// Final briefing document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Briefing {
    pub title: String,
    pub date: DateTime<Utc>,
    pub topics: Vec<Topic>,
}

impl Briefing {
    /// Re-checks the per-topic bullet constraints on the assembled document
    pub fn validate(&self) -> anyhow::Result<()> {
        for topic in &self.topics {
            anyhow::ensure!(
                (1..=4).contains(&topic.bullets.len()),
                "topic {} must include 1-4 bullets",
                topic.topic_id
            );
            let mut urls = HashSet::new();
            for bullet in &topic.bullets {
                anyhow::ensure!(
                    urls.insert(bullet.url.as_str()),
                    "topic {} repeats bullet URL {}",
                    topic.topic_id,
                    bullet.url
                );
            }
        }
        Ok(())
    }
}

/// Stage at which a cluster failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Facts,
    Scores,
    Draft,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Facts => write!(f, "facts"),
            PipelineStage::Scores => write!(f, "scores"),
            PipelineStage::Draft => write!(f, "draft"),
        }
    }
}

/// Per-cluster failure record; failed clusters are skipped, not fatal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterFailure {
    pub cluster_id: String,
    pub stage: PipelineStage,
    pub error: String,
}

/// Per-cluster artifacts accumulated over a run, in bundle order
#[derive(Debug, Default)]
pub struct PipelineState {
    pub facts: Vec<ClusterFacts>,
    pub selections: Vec<ClusterSelection>,
    pub drafts: Vec<TopicDraft>,
    pub failures: Vec<ClusterFailure>,
    pub artifact_root: Option<PathBuf>,
}

impl PipelineState {
    pub fn selection_for(&self, cluster_id: &str) -> Option<&ClusterSelection> {
        self.selections
            .iter()
            .find(|selection| selection.cluster_id == cluster_id)
    }
}
