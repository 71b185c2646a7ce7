//! Run metrics persisted next to the briefing artifact.

use common_lib::briefing::{Briefing, PipelineState};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub clusters_total: usize,
    pub clusters_succeeded: usize,
    pub clusters_failed: usize,
    pub facts_extracted: usize,
    pub facts_picked: usize,
    pub avg_actionability: f64,
    pub topics_emitted: usize,
}

pub fn compute_metrics(state: &PipelineState, briefing: &Briefing) -> Metrics {
    let facts_extracted = state.facts.iter().map(|facts| facts.facts.len()).sum();
    let picked: Vec<_> = state
        .selections
        .iter()
        .flat_map(|selection| &selection.picked)
        .collect();
    let avg_actionability = if picked.is_empty() {
        0.0
    } else {
        picked
            .iter()
            .map(|fact| f64::from(fact.scores.actionability))
            .sum::<f64>()
            / picked.len() as f64
    };

    Metrics {
        clusters_total: state.drafts.len() + state.failures.len(),
        clusters_succeeded: state.drafts.len(),
        clusters_failed: state.failures.len(),
        facts_extracted,
        facts_picked: picked.len(),
        avg_actionability,
        topics_emitted: briefing.topics.len(),
    }
}
