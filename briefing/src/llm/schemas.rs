//! JSON schemas enforced on each summarization stage.

use serde_json::{json, Value};

/// Name used for the provider-side schema registration
pub fn schema_title(schema: &Value) -> &str {
    schema
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Response")
}

/// Stage 1: facts extracted from one cluster
pub fn cluster_facts_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "ClusterFacts",
        "type": "object",
        "properties": {
            "cluster_id": { "type": "string" },
            "facts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "fact_id": { "type": "string", "minLength": 1 },
                        "text": { "type": "string", "minLength": 1 },
                        "url": { "type": "string", "format": "uri" }
                    },
                    "required": ["fact_id", "text", "url"],
                    "additionalProperties": false
                }
            },
            "rejected": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "fact_id": { "type": "string" },
                        "item_id": { "type": "string" },
                        "reason": { "type": "string" }
                    },
                    "required": ["reason"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["cluster_id", "facts", "rejected"],
        "additionalProperties": false
    })
}

/// Stage 2: scored fact selection
pub fn cluster_selection_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "ClusterSelection",
        "type": "object",
        "properties": {
            "cluster_id": { "type": "string" },
            "picked": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "fact_id": { "type": "string" },
                        "text": { "type": "string" },
                        "url": { "type": "string", "format": "uri" },
                        "scores": {
                            "type": "object",
                            "properties": {
                                "actionability": { "type": "integer", "minimum": 0, "maximum": 3 },
                                "novelty": { "type": "integer", "minimum": 0, "maximum": 2 },
                                "impact": { "type": "integer", "minimum": 0, "maximum": 2 },
                                "reusability": { "type": "integer", "minimum": 0, "maximum": 2 },
                                "reliability": { "type": "integer", "minimum": 0, "maximum": 1 },
                                "agentic_bonus": { "type": "integer", "minimum": 0, "maximum": 1 }
                            },
                            "required": [
                                "actionability",
                                "novelty",
                                "impact",
                                "reusability",
                                "reliability",
                                "agentic_bonus"
                            ],
                            "additionalProperties": false
                        },
                        "strategic_flag": { "type": "boolean" },
                        "rationale": { "type": "string" }
                    },
                    "required": ["fact_id", "text", "url", "scores", "strategic_flag", "rationale"],
                    "additionalProperties": false
                }
            },
            "dropped": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "fact_id": { "type": "string" },
                        "reason": { "type": "string" }
                    },
                    "required": ["fact_id", "reason"],
                    "additionalProperties": false
                }
            },
            "notes": { "type": "string" }
        },
        "required": ["cluster_id", "picked", "dropped"],
        "additionalProperties": false
    })
}

/// Stage 3: drafted topic with 1-4 bullets
pub fn topic_draft_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "TopicDraft",
        "type": "object",
        "properties": {
            "topic_id": { "type": "string" },
            "headline": { "type": "string", "minLength": 1 },
            "bullets": {
                "type": "array",
                "minItems": 1,
                "maxItems": 4,
                "items": {
                    "type": "object",
                    "properties": {
                        "text": { "type": "string", "minLength": 1 },
                        "url": { "type": "string", "format": "uri" },
                        "fact_ids": {
                            "type": "array",
                            "items": { "type": "string" }
                        }
                    },
                    "required": ["text", "url", "fact_ids"],
                    "additionalProperties": false
                }
            },
            "annotations": {
                "type": "object",
                "properties": {
                    "agentic": { "type": "boolean" },
                    "strategic": { "type": "boolean" }
                },
                "additionalProperties": false
            },
            "notes": { "type": "string" }
        },
        "required": ["topic_id", "headline", "bullets", "annotations"],
        "additionalProperties": false
    })
}
