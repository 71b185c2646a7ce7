//! Prompt rendering for the summarization stages. Each prompt carries the
//! briefing title, the task instructions and the serialized payload the
//! stage works from.

use common_lib::briefing::{ClusterBundle, ClusterFacts, ClusterSelection};
use tracing_unwrap::ResultExt;

fn to_pretty_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_log()
}

pub fn stage1_prompt(briefing_title: &str, bundle: &ClusterBundle) -> String {
    format!(
        "You are preparing the briefing \"{briefing_title}\".\n\
         Extract the distinct, atomic facts from the cluster of items below.\n\
         Rules:\n\
         - Each fact states one verifiable claim in one sentence.\n\
         - Each fact carries the URL of the item it was taken from; never\n\
           invent or rewrite URLs.\n\
         - Assign fact ids fact-0, fact-1, ... in order of importance.\n\
         - Put duplicates and unverifiable claims into `rejected` with a reason.\n\
         - Set cluster_id to \"{cluster_id}\".\n\n\
         Cluster items:\n{payload}\n",
        briefing_title = briefing_title,
        cluster_id = bundle.cluster_id,
        payload = to_pretty_json(bundle),
    )
}

pub fn stage2_prompt(briefing_title: &str, bundle: &ClusterBundle, facts: &ClusterFacts) -> String {
    format!(
        "You are selecting facts for the briefing \"{briefing_title}\".\n\
         Score every fact below and decide whether to keep it.\n\
         Score dimensions and ranges:\n\
         - actionability 0-3: can a reader act on this today?\n\
         - novelty 0-2: is this genuinely new?\n\
         - impact 0-2: how many people does it affect?\n\
         - reusability 0-2: does it transfer beyond its origin?\n\
         - reliability 0-1: is the source trustworthy?\n\
         - agentic_bonus 0-1: is it relevant to autonomous-agent workflows?\n\
         Rules:\n\
         - Keep fact ids, texts and URLs exactly as given.\n\
         - Every fact must appear in `picked` or in `dropped` with a reason.\n\
         - Set strategic_flag for facts with long-term strategic weight.\n\
         - Set cluster_id to \"{cluster_id}\".\n\n\
         Facts:\n{facts}\n\n\
         Cluster items for context:\n{payload}\n",
        briefing_title = briefing_title,
        cluster_id = bundle.cluster_id,
        facts = to_pretty_json(facts),
        payload = to_pretty_json(bundle),
    )
}

pub fn stage3_prompt(
    briefing_title: &str,
    bundle: &ClusterBundle,
    selection: &ClusterSelection,
) -> String {
    format!(
        "You are drafting one topic for the briefing \"{briefing_title}\".\n\
         Write a concise headline and 1-4 bullets from the picked facts below.\n\
         Rules:\n\
         - Each bullet cites exactly one URL taken from the picked facts,\n\
           and no URL repeats within the topic.\n\
         - Each bullet lists the fact_ids it is based on.\n\
         - Write in the briefing's language; keep bullets to one sentence\n\
           of the form: what happened, why it matters, what the catch is.\n\
         - Set annotations.agentic if the topic is about autonomous-agent\n\
           workflows, annotations.strategic for long-term strategic shifts.\n\
         - Set topic_id to \"{cluster_id}\".\n\n\
         Picked facts:\n{selection}\n",
        briefing_title = briefing_title,
        cluster_id = bundle.cluster_id,
        selection = to_pretty_json(selection),
    )
}
