//! Cosine-similarity helpers for dedup and per-cluster candidate selection.
//! Inputs are bounded to a few thousand items, so the full pairwise matrix
//! is computed directly.

/// Cosine similarity of two vectors; zero vectors compare as 0
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn cosine_matrix(embeddings: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let n = embeddings.len();
    let mut sims = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        sims[i][i] = 1.0;
        for j in (i + 1)..n {
            let sim = cosine(&embeddings[i], &embeddings[j]);
            sims[i][j] = sim;
            sims[j][i] = sim;
        }
    }
    sims
}

/// Marks near-duplicate items for removal. Scans in input order: the first
/// item of each similarity class is kept, later items at or above the
/// threshold are dropped
pub fn near_duplicate_mask(embeddings: &[Vec<f32>], threshold: f32) -> Vec<bool> {
    let n = embeddings.len();
    let mut keep = vec![true; n];
    let sims = cosine_matrix(embeddings);
    let mut duplicates = 0usize;
    for i in 0..n {
        if !keep[i] {
            continue;
        }
        for j in (i + 1)..n {
            if keep[j] && sims[i][j] >= threshold {
                keep[j] = false;
                duplicates += 1;
                tracing::debug!(
                    "duplicate detected: item {} similar to {} (similarity={:.3})",
                    j,
                    i,
                    sims[i][j]
                );
            }
        }
    }
    tracing::info!(
        "near-duplicate detection: {} duplicates out of {} items (threshold={:.2})",
        duplicates,
        n,
        threshold
    );
    keep
}

/// Mean of the member embeddings
pub fn centroid(embeddings: &[Vec<f32>], member_indices: &[usize]) -> Vec<f32> {
    let dim = embeddings.first().map(|e| e.len()).unwrap_or(0);
    let mut center = vec![0.0f32; dim];
    for &index in member_indices {
        for (d, value) in embeddings[index].iter().enumerate() {
            center[d] += value;
        }
    }
    if !member_indices.is_empty() {
        let count = member_indices.len() as f32;
        for value in &mut center {
            *value /= count;
        }
    }
    center
}

/// Top `k` members by cosine similarity to the cluster centroid,
/// most similar first; ties keep member order
pub fn top_k_by_centroid(
    embeddings: &[Vec<f32>],
    member_indices: &[usize],
    k: usize,
) -> Vec<usize> {
    let center = centroid(embeddings, member_indices);
    let mut scored: Vec<(usize, f32)> = member_indices
        .iter()
        .map(|&index| (index, cosine(&embeddings[index], &center)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(k.min(member_indices.len()))
        .map(|(index, _)| index)
        .collect()
}

/// Member with the highest mean pairwise similarity to the rest of the
/// cluster; the first such member wins ties
pub fn most_central(embeddings: &[Vec<f32>], member_indices: &[usize]) -> usize {
    let mut best_index = member_indices[0];
    let mut best_score = f32::MIN;
    for &i in member_indices {
        let mut total = 0.0f32;
        for &j in member_indices {
            total += if i == j { 1.0 } else { cosine(&embeddings[i], &embeddings[j]) };
        }
        let score = total / member_indices.len() as f32;
        if score > best_score {
            best_score = score;
            best_index = i;
        }
    }
    best_index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_duplicates_removed() {
        let embeddings = vec![
            vec![1.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
        ];
        assert_eq!(near_duplicate_mask(&embeddings, 0.9), vec![true, false, true]);
    }

    #[test]
    fn near_duplicates_removed() {
        let embeddings = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.99, 0.01, 0.0],
            vec![0.0, 1.0, 0.0],
        ];
        assert_eq!(near_duplicate_mask(&embeddings, 0.95), vec![true, false, true]);
    }

    #[test]
    fn different_items_kept() {
        let embeddings = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        assert_eq!(near_duplicate_mask(&embeddings, 0.9), vec![true, true, true]);
    }

    #[test]
    fn earlier_item_wins_within_class() {
        // All three are near-identical; only the first survives
        let embeddings = vec![
            vec![1.0, 0.0],
            vec![0.999, 0.001],
            vec![0.998, 0.002],
        ];
        assert_eq!(near_duplicate_mask(&embeddings, 0.95), vec![true, false, false]);
    }

    #[test]
    fn centroid_is_member_mean() {
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert_eq!(centroid(&embeddings, &[0, 1]), vec![0.5, 0.5]);
    }

    #[test]
    fn top_k_orders_by_centroid_similarity() {
        let embeddings = vec![
            vec![1.0, 0.0],
            vec![0.9, 0.1],
            vec![0.0, 1.0],
        ];
        let picked = top_k_by_centroid(&embeddings, &[0, 1, 2], 2);
        assert_eq!(picked.len(), 2);
        // Item 1 is closest to the mean of the three
        assert_eq!(picked[0], 1);
    }

    #[test]
    fn most_central_prefers_first_on_ties() {
        let embeddings = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]];
        assert_eq!(most_central(&embeddings, &[0, 1, 2]), 0);
    }

    #[test]
    fn zero_vectors_do_not_panic() {
        let embeddings = vec![vec![0.0, 0.0], vec![1.0, 0.0]];
        assert_eq!(cosine(&embeddings[0], &embeddings[1]), 0.0);
        assert_eq!(near_duplicate_mask(&embeddings, 0.9), vec![true, true]);
    }
}
