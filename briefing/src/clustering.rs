//! Density clustering of the deduplicated embedding space.
//! Noise points keep label -1 but still form one group, so low-density
//! singletons are not lost before fact extraction.

use std::collections::BTreeMap;

use hdbscan::{Hdbscan, HdbscanHyperParams};

/// Groups items by HDBSCAN label. Returns `(label, member_indices)` pairs
/// with members in input order; the noise group (label -1) is present iff
/// noise points exist
pub fn cluster_items(embeddings: &[Vec<f32>], min_cluster_size: usize) -> Vec<(i32, Vec<usize>)> {
    let labels = if embeddings.len() < min_cluster_size {
        vec![-1; embeddings.len()]
    } else {
        let data = embeddings.to_vec();
        let hyper_params = HdbscanHyperParams::builder()
            .min_cluster_size(min_cluster_size)
            .build();
        match Hdbscan::new(&data, hyper_params).cluster() {
            Ok(labels) => labels,
            Err(e) => {
                tracing::warn!("clustering failed, treating all items as noise: {:?}", e);
                vec![-1; embeddings.len()]
            }
        }
    };

    let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (index, &label) in labels.iter().enumerate() {
        let label = if label < 0 { -1 } else { label };
        groups.entry(label).or_default().push(index);
    }

    let n_noise = groups.get(&-1).map(Vec::len).unwrap_or(0);
    tracing::info!(
        "clustering complete: {} clusters, {} noise points (min_size={})",
        groups.len() - usize::from(n_noise > 0),
        n_noise,
        min_cluster_size
    );
    groups.into_iter().collect()
}
