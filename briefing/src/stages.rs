//! Multi-stage summarization: per-cluster fact extraction, scoring and
//! drafting, then briefing assembly.
//!
//! Clusters are processed by a bounded worker pool; stages within one
//! cluster run sequentially. A failed cluster is recorded and skipped,
//! never fatal for the run.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common_lib::briefing::{
    Briefing, Bullet, ClusterBundle, ClusterFacts, ClusterFailure, ClusterSelection, DroppedFact,
    PipelineStage, PipelineState, RejectedFact, Topic, TopicDraft,
};
use common_lib::settings::Settings;
use tokio::sync::Semaphore;
use tracing_unwrap::ResultExt;
use url::Url;

use crate::artifacts::ArtifactWriter;
use crate::llm::schemas::{cluster_facts_schema, cluster_selection_schema, topic_draft_schema};
use crate::llm::{call_with_schema, StructuredGenerator, StructuredRequest, ValidateResponse};
use crate::prompts::{stage1_prompt, stage2_prompt, stage3_prompt};

impl ValidateResponse for ClusterFacts {
    fn validate_response(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl ValidateResponse for ClusterSelection {
    fn validate_response(&self) -> anyhow::Result<()> {
        for fact in &self.picked {
            fact.scores.validate()?;
        }
        Ok(())
    }
}

impl ValidateResponse for TopicDraft {
    fn validate_response(&self) -> anyhow::Result<()> {
        self.validate()
    }
}

/// Run-level parameters for the summarization stages
#[derive(Debug, Clone)]
pub struct StageContext {
    pub briefing_title: String,
    pub agentic_section: bool,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub retries: u32,
    pub max_concurrency: usize,
}

impl StageContext {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            briefing_title: settings.briefing_title.clone(),
            agentic_section: settings.processing.agentic_section,
            model: settings.summarization.model().to_owned(),
            temperature: settings.summarization.temperature,
            timeout: Duration::from_secs(settings.summarization.timeout_s),
            retries: settings.summarization.retries,
            max_concurrency: settings.summarization.max_concurrency,
        }
    }

    fn request(&self, prompt: String, schema: serde_json::Value) -> StructuredRequest {
        StructuredRequest {
            prompt,
            model: self.model.clone(),
            schema,
            temperature: self.temperature,
            timeout: self.timeout,
        }
    }
}

struct ClusterOutput {
    facts: ClusterFacts,
    selection: ClusterSelection,
    draft: TopicDraft,
}

/// Moves facts whose URL is not among the cluster's item URLs into
/// `rejected`
fn enforce_fact_urls(facts: &mut ClusterFacts, allowed_urls: &HashSet<String>) {
    let (kept, rejected): (Vec<_>, Vec<_>) = std::mem::take(&mut facts.facts)
        .into_iter()
        .partition(|fact| allowed_urls.contains(fact.url.as_str()));
    for fact in rejected {
        tracing::warn!(
            "cluster {}: fact {} rejected, URL {} not among cluster sources",
            facts.cluster_id,
            fact.fact_id,
            fact.url
        );
        facts.rejected.push(RejectedFact {
            fact_id: Some(fact.fact_id),
            item_id: None,
            reason: "url not among cluster sources".to_owned(),
        });
    }
    facts.facts = kept;
}

/// Reconciles the scorer's output with the extracted facts: picked entries
/// that don't match a known fact are dropped, and facts the scorer ignored
/// are recorded as dropped
fn reconcile_selection(selection: &mut ClusterSelection, facts: &ClusterFacts) {
    let known: std::collections::HashMap<&str, &Url> = facts
        .facts
        .iter()
        .map(|fact| (fact.fact_id.as_str(), &fact.url))
        .collect();

    let (kept, unknown): (Vec<_>, Vec<_>) = std::mem::take(&mut selection.picked)
        .into_iter()
        .partition(|picked| known.get(picked.fact_id.as_str()) == Some(&&picked.url));
    for picked in unknown {
        tracing::warn!(
            "cluster {}: picked entry {} does not match an extracted fact",
            selection.cluster_id,
            picked.fact_id
        );
        selection.dropped.push(DroppedFact {
            fact_id: picked.fact_id,
            reason: "does not match an extracted fact".to_owned(),
        });
    }
    selection.picked = kept;

    let addressed: HashSet<String> = selection
        .picked
        .iter()
        .map(|fact| fact.fact_id.clone())
        .chain(selection.dropped.iter().map(|fact| fact.fact_id.clone()))
        .collect();
    for fact in &facts.facts {
        if !addressed.contains(fact.fact_id.as_str()) {
            selection.dropped.push(DroppedFact {
                fact_id: fact.fact_id.clone(),
                reason: "not addressed by scorer".to_owned(),
            });
        }
    }
}

async fn process_cluster(
    bundle: ClusterBundle,
    ctx: Arc<StageContext>,
    generator: Arc<dyn StructuredGenerator>,
    artifacts: Option<Arc<ArtifactWriter>>,
) -> Result<ClusterOutput, ClusterFailure> {
    let cluster_id = bundle.cluster_id.clone();
    let fail = |stage: PipelineStage, error: anyhow::Error| ClusterFailure {
        cluster_id: cluster_id.clone(),
        stage,
        error: format!("{error:#}"),
    };

    // Items without a valid http(s) URL never reach the model; a mixed
    // cluster proceeds with its valid items only
    let total_items = bundle.items.len();
    let valid_items: Vec<_> = bundle
        .items
        .into_iter()
        .filter(|item| item.http_url().is_some())
        .collect();
    if valid_items.len() < total_items {
        tracing::warn!(
            "cluster {}: dropped {} items without a valid URL",
            cluster_id,
            total_items - valid_items.len()
        );
    }
    if valid_items.is_empty() {
        return Err(fail(
            PipelineStage::Facts,
            anyhow::anyhow!("no items with a valid URL"),
        ));
    }
    let mut seen = HashSet::new();
    let canonical_links: Vec<Url> = valid_items
        .iter()
        .filter_map(|item| item.http_url())
        .filter(|url| seen.insert(url.clone()))
        .collect();
    let bundle = ClusterBundle {
        cluster_id: cluster_id.clone(),
        items: valid_items,
        canonical_links,
    };

    // Stage 1: fact extraction
    let request = ctx.request(
        stage1_prompt(&ctx.briefing_title, &bundle),
        cluster_facts_schema(),
    );
    let mut facts: ClusterFacts = call_with_schema(generator.as_ref(), &request, ctx.retries)
        .await
        .map_err(|e| fail(PipelineStage::Facts, e))?;
    facts.cluster_id = cluster_id.clone();
    enforce_fact_urls(&mut facts, &bundle.allowed_urls());
    if let Some(writer) = &artifacts {
        writer
            .write_stage1(&facts)
            .await
            .map_err(|e| fail(PipelineStage::Facts, e))?;
    }
    if facts.facts.is_empty() {
        return Err(fail(
            PipelineStage::Facts,
            anyhow::anyhow!("no valid facts extracted"),
        ));
    }

    // Stage 2: scoring and selection
    let request = ctx.request(
        stage2_prompt(&ctx.briefing_title, &bundle, &facts),
        cluster_selection_schema(),
    );
    let mut selection: ClusterSelection =
        call_with_schema(generator.as_ref(), &request, ctx.retries)
            .await
            .map_err(|e| fail(PipelineStage::Scores, e))?;
    selection.cluster_id = cluster_id.clone();
    reconcile_selection(&mut selection, &facts);
    if let Some(writer) = &artifacts {
        writer
            .write_stage2(&selection)
            .await
            .map_err(|e| fail(PipelineStage::Scores, e))?;
    }
    if selection.picked.is_empty() {
        return Err(fail(
            PipelineStage::Scores,
            anyhow::anyhow!("scorer picked no facts"),
        ));
    }

    // Stage 3: topic drafting
    let request = ctx.request(
        stage3_prompt(&ctx.briefing_title, &bundle, &selection),
        topic_draft_schema(),
    );
    let mut draft: TopicDraft = call_with_schema(generator.as_ref(), &request, ctx.retries)
        .await
        .map_err(|e| fail(PipelineStage::Draft, e))?;
    draft.topic_id = cluster_id.clone();
    draft
        .validate_against(&selection)
        .map_err(|e| fail(PipelineStage::Draft, e))?;
    if let Some(writer) = &artifacts {
        writer
            .write_stage3(&draft)
            .await
            .map_err(|e| fail(PipelineStage::Draft, e))?;
    }

    Ok(ClusterOutput {
        facts,
        selection,
        draft,
    })
}

/// Runs stages 1-3 for every bundle with bounded parallelism, assembles
/// the briefing and persists the stage-4 artifact
pub async fn run_multistage_pipeline(
    bundles: Vec<ClusterBundle>,
    ctx: StageContext,
    generator: Arc<dyn StructuredGenerator>,
    artifacts: Option<Arc<ArtifactWriter>>,
) -> anyhow::Result<(Briefing, PipelineState)> {
    let ctx = Arc::new(ctx);
    let semaphore = Arc::new(Semaphore::new(ctx.max_concurrency));

    let mut tasks = Vec::new();
    let mut cluster_ids = Vec::new();
    for bundle in bundles {
        cluster_ids.push(bundle.cluster_id.clone());
        let ctx = Arc::clone(&ctx);
        let generator = Arc::clone(&generator);
        let artifacts = artifacts.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.unwrap_or_log();
            process_cluster(bundle, ctx, generator, artifacts).await
        }));
    }

    let mut state = PipelineState {
        artifact_root: artifacts.as_ref().map(|writer| writer.root().to_path_buf()),
        ..Default::default()
    };
    for (task, cluster_id) in tasks.into_iter().zip(cluster_ids) {
        match task.await.unwrap_or_log() {
            Ok(output) => {
                state.facts.push(output.facts);
                state.selections.push(output.selection);
                state.drafts.push(output.draft);
            }
            Err(failure) => {
                tracing::warn!(
                    "cluster {} skipped at stage {}: {}",
                    cluster_id,
                    failure.stage,
                    failure.error
                );
                state.failures.push(failure);
            }
        }
    }

    let briefing = assemble_briefing(&ctx, &state);
    briefing.validate()?;
    if let Some(writer) = &artifacts {
        writer.write_briefing(&briefing).await?;
    }
    tracing::info!(
        "multistage pipeline: {} topics from {} clusters ({} failed)",
        briefing.topics.len(),
        state.drafts.len() + state.failures.len(),
        state.failures.len()
    );
    Ok((briefing, state))
}

fn project_topic(draft: &TopicDraft) -> Topic {
    Topic {
        topic_id: draft.topic_id.clone(),
        headline: draft.headline.clone(),
        bullets: draft
            .bullets
            .iter()
            .map(|bullet| Bullet {
                text: bullet.text.clone(),
                url: bullet.url.clone(),
            })
            .collect(),
    }
}

/// Stage 4: ranks drafts and optionally promotes agentic topics into a
/// leading "Agentic Focus" section
pub fn assemble_briefing(ctx: &StageContext, state: &PipelineState) -> Briefing {
    let mut ranked: Vec<(&TopicDraft, u32)> = state
        .drafts
        .iter()
        .filter(|draft| !draft.bullets.is_empty())
        .map(|draft| {
            let max_score = state
                .selection_for(&draft.topic_id)
                .map(ClusterSelection::max_score)
                .unwrap_or(0);
            (draft, max_score)
        })
        .collect();
    ranked.sort_by_key(|(draft, max_score)| (Reverse(*max_score), draft.topic_id.clone()));

    let mut topics = Vec::new();
    if ctx.agentic_section && ranked.iter().any(|(draft, _)| draft.annotations.is_agentic()) {
        let mut seen = HashSet::new();
        let focus_bullets: Vec<Bullet> = ranked
            .iter()
            .filter(|(draft, _)| draft.annotations.is_agentic())
            .flat_map(|(draft, _)| &draft.bullets)
            .filter(|bullet| seen.insert(bullet.url.clone()))
            .take(4)
            .map(|bullet| Bullet {
                text: bullet.text.clone(),
                url: bullet.url.clone(),
            })
            .collect();
        topics.push(Topic {
            topic_id: "agentic-focus".to_owned(),
            headline: "Agentic Focus".to_owned(),
            bullets: focus_bullets,
        });
        topics.extend(
            ranked
                .iter()
                .filter(|(draft, _)| !draft.annotations.is_agentic())
                .map(|(draft, _)| project_topic(draft)),
        );
    } else {
        topics.extend(ranked.iter().map(|(draft, _)| project_topic(draft)));
    }

    Briefing {
        title: ctx.briefing_title.clone(),
        date: Utc::now(),
        topics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_lib::briefing::{BulletDraft, Fact, FactScores, ScoredFact, TopicAnnotations};

    fn ctx(agentic_section: bool) -> StageContext {
        StageContext {
            briefing_title: "Daily AI Brief".to_owned(),
            agentic_section,
            model: "stub".to_owned(),
            temperature: 0.2,
            timeout: Duration::from_secs(5),
            retries: 0,
            max_concurrency: 2,
        }
    }

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    fn fact(fact_id: &str, url_str: &str) -> Fact {
        Fact {
            fact_id: fact_id.to_owned(),
            text: "fact".to_owned(),
            url: url(url_str),
        }
    }

    fn scored(fact_id: &str, url_str: &str, actionability: u8, agentic_bonus: u8) -> ScoredFact {
        ScoredFact {
            fact_id: fact_id.to_owned(),
            text: "fact".to_owned(),
            url: url(url_str),
            scores: FactScores {
                actionability,
                novelty: 2,
                impact: 2,
                reusability: 2,
                reliability: 1,
                agentic_bonus,
            },
            strategic_flag: false,
            rationale: "ok".to_owned(),
        }
    }

    fn draft(topic_id: &str, headline: &str, url_str: &str, agentic: bool) -> TopicDraft {
        TopicDraft {
            topic_id: topic_id.to_owned(),
            headline: headline.to_owned(),
            bullets: vec![BulletDraft {
                text: "bullet".to_owned(),
                url: url(url_str),
                fact_ids: vec!["fact-0".to_owned()],
            }],
            annotations: TopicAnnotations {
                agentic: agentic.then_some(true),
                strategic: None,
            },
            notes: None,
        }
    }

    fn selection(cluster_id: &str, facts: Vec<ScoredFact>) -> ClusterSelection {
        ClusterSelection {
            cluster_id: cluster_id.to_owned(),
            picked: facts,
            dropped: Vec::new(),
            notes: None,
        }
    }

    #[test]
    fn facts_with_foreign_urls_move_to_rejected() {
        let mut facts = ClusterFacts {
            cluster_id: "cluster-1".to_owned(),
            facts: vec![
                fact("f1", "https://valid.example.com/ok"),
                fact("f2", "https://elsewhere.example.com/bad"),
            ],
            rejected: Vec::new(),
        };
        let allowed: HashSet<String> = ["https://valid.example.com/ok".to_owned()].into();
        enforce_fact_urls(&mut facts, &allowed);
        assert_eq!(facts.facts.len(), 1);
        assert_eq!(facts.facts[0].fact_id, "f1");
        assert_eq!(facts.rejected.len(), 1);
        assert_eq!(facts.rejected[0].fact_id.as_deref(), Some("f2"));
    }

    #[test]
    fn unaddressed_facts_land_in_dropped() {
        let facts = ClusterFacts {
            cluster_id: "cluster-1".to_owned(),
            facts: vec![
                fact("f1", "https://example.com/1"),
                fact("f2", "https://example.com/2"),
            ],
            rejected: Vec::new(),
        };
        let mut sel = selection("cluster-1", vec![scored("f1", "https://example.com/1", 2, 0)]);
        reconcile_selection(&mut sel, &facts);
        assert_eq!(sel.picked.len(), 1);
        assert_eq!(sel.dropped.len(), 1);
        assert_eq!(sel.dropped[0].fact_id, "f2");
        assert_eq!(sel.dropped[0].reason, "not addressed by scorer");
    }

    #[test]
    fn picked_entries_not_matching_facts_are_dropped() {
        let facts = ClusterFacts {
            cluster_id: "cluster-1".to_owned(),
            facts: vec![fact("f1", "https://example.com/1")],
            rejected: Vec::new(),
        };
        let mut sel = selection(
            "cluster-1",
            vec![
                scored("f1", "https://example.com/1", 2, 0),
                scored("ghost", "https://example.com/ghost", 2, 0),
            ],
        );
        reconcile_selection(&mut sel, &facts);
        assert_eq!(sel.picked.len(), 1);
        assert!(sel.dropped.iter().any(|d| d.fact_id == "ghost"));
    }

    #[test]
    fn assembly_orders_by_max_score_descending() {
        let mut state = PipelineState::default();
        state.drafts.push(draft("cluster-a", "Low", "https://example.com/a", false));
        state.drafts.push(draft("cluster-b", "High", "https://example.com/b", false));
        state
            .selections
            .push(selection("cluster-a", vec![scored("f1", "https://example.com/a", 0, 0)]));
        state
            .selections
            .push(selection("cluster-b", vec![scored("f1", "https://example.com/b", 3, 0)]));

        let briefing = assemble_briefing(&ctx(false), &state);
        assert_eq!(briefing.topics[0].headline, "High");
        assert_eq!(briefing.topics[1].headline, "Low");
    }

    #[test]
    fn score_ties_break_by_cluster_id() {
        let mut state = PipelineState::default();
        state.drafts.push(draft("cluster-b", "B", "https://example.com/b", false));
        state.drafts.push(draft("cluster-a", "A", "https://example.com/a", false));
        state
            .selections
            .push(selection("cluster-b", vec![scored("f1", "https://example.com/b", 2, 0)]));
        state
            .selections
            .push(selection("cluster-a", vec![scored("f1", "https://example.com/a", 2, 0)]));

        let briefing = assemble_briefing(&ctx(false), &state);
        assert_eq!(briefing.topics[0].topic_id, "cluster-a");
        assert_eq!(briefing.topics[1].topic_id, "cluster-b");
    }

    #[test]
    fn agentic_drafts_promote_into_leading_focus_topic() {
        let mut state = PipelineState::default();
        state.drafts.push(draft("cluster-hn", "Acme CLI", "https://example.com/acme", false));
        state.drafts.push(draft("cluster-tw", "Cursor", "https://example.com/cursor", true));
        state
            .selections
            .push(selection("cluster-hn", vec![scored("f1", "https://example.com/acme", 2, 0)]));
        state
            .selections
            .push(selection("cluster-tw", vec![scored("f1", "https://example.com/cursor", 3, 1)]));

        let briefing = assemble_briefing(&ctx(true), &state);
        assert_eq!(briefing.topics.len(), 2);
        assert_eq!(briefing.topics[0].headline, "Agentic Focus");
        assert_eq!(briefing.topics[0].bullets.len(), 1);
        assert_eq!(briefing.topics[1].headline, "Acme CLI");
    }

    #[test]
    fn agentic_promotion_disabled_keeps_sorted_drafts() {
        let mut state = PipelineState::default();
        state.drafts.push(draft("cluster-tw", "Cursor", "https://example.com/cursor", true));
        state
            .selections
            .push(selection("cluster-tw", vec![scored("f1", "https://example.com/cursor", 3, 1)]));

        let briefing = assemble_briefing(&ctx(false), &state);
        assert_eq!(briefing.topics.len(), 1);
        assert_eq!(briefing.topics[0].headline, "Cursor");
    }

    #[test]
    fn focus_bullets_deduplicate_urls_and_cap_at_four() {
        let mut state = PipelineState::default();
        for i in 0..6 {
            let id = format!("cluster-{i}");
            // Two drafts share one URL, the rest are distinct
            let url_str = if i == 1 {
                "https://example.com/0".to_owned()
            } else {
                format!("https://example.com/{i}")
            };
            state.drafts.push(draft(&id, "Topic", &url_str, true));
            state
                .selections
                .push(selection(&id, vec![scored("f1", &url_str, 2, 1)]));
        }
        let briefing = assemble_briefing(&ctx(true), &state);
        assert_eq!(briefing.topics.len(), 1);
        assert_eq!(briefing.topics[0].bullets.len(), 4);
        assert!(briefing.validate().is_ok());
    }

    #[test]
    fn bullet_less_drafts_are_dropped() {
        let mut state = PipelineState::default();
        let mut empty = draft("cluster-a", "Empty", "https://example.com/a", false);
        empty.bullets.clear();
        state.drafts.push(empty);

        let briefing = assemble_briefing(&ctx(false), &state);
        assert!(briefing.topics.is_empty());
    }
}
