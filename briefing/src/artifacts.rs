//! Per-stage JSON artifacts for audit and replay.
//!
//! Files are written into `{output.dir}/{briefing_id}/`, one subdirectory
//! per cluster. Writes go through a temp file and rename, so a crashed run
//! never leaves a partial artifact; reruns overwrite in place.

use std::path::{Path, PathBuf};

use common_lib::briefing::{Briefing, ClusterFacts, ClusterSelection, TopicDraft};
use serde::Serialize;

use crate::metrics::Metrics;

pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub async fn create(output_dir: &Path, briefing_id: &str) -> anyhow::Result<Self> {
        let root = output_dir.join(briefing_id);
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn write_json<T: Serialize>(&self, relative: &str, value: &T) -> anyhow::Result<()> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub async fn write_stage1(&self, facts: &ClusterFacts) -> anyhow::Result<()> {
        let id = &facts.cluster_id;
        self.write_json(&format!("{id}/{id}_stage1.json"), facts).await
    }

    pub async fn write_stage2(&self, selection: &ClusterSelection) -> anyhow::Result<()> {
        let id = &selection.cluster_id;
        self.write_json(&format!("{id}/{id}_stage2.json"), selection).await
    }

    pub async fn write_stage3(&self, draft: &TopicDraft) -> anyhow::Result<()> {
        let id = &draft.topic_id;
        self.write_json(&format!("{id}/{id}_stage3.json"), draft).await
    }

    pub async fn write_briefing(&self, briefing: &Briefing) -> anyhow::Result<()> {
        self.write_json("stage4_briefing.json", briefing).await
    }

    pub async fn write_metrics(&self, metrics: &Metrics) -> anyhow::Result<()> {
        self.write_json("metrics.json", metrics).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> ClusterFacts {
        ClusterFacts {
            cluster_id: "cluster-1".to_owned(),
            facts: Vec::new(),
            rejected: Vec::new(),
        }
    }

    #[tokio::test]
    async fn stage_files_land_in_cluster_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::create(dir.path(), "test-brief").await.unwrap();
        writer.write_stage1(&facts()).await.unwrap();

        let path = dir
            .path()
            .join("test-brief")
            .join("cluster-1")
            .join("cluster-1_stage1.json");
        assert!(path.exists());

        let parsed: ClusterFacts =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.cluster_id, "cluster-1");
    }

    #[tokio::test]
    async fn rewrites_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::create(dir.path(), "test-brief").await.unwrap();
        writer.write_stage1(&facts()).await.unwrap();
        let path = dir
            .path()
            .join("test-brief")
            .join("cluster-1")
            .join("cluster-1_stage1.json");
        let first = std::fs::read(&path).unwrap();

        writer.write_stage1(&facts()).await.unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::create(dir.path(), "test-brief").await.unwrap();
        writer.write_stage1(&facts()).await.unwrap();

        let cluster_dir = dir.path().join("test-brief").join("cluster-1");
        let names: Vec<String> = std::fs::read_dir(&cluster_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["cluster-1_stage1.json"]);
    }
}
