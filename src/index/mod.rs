//! In-memory similarity index over chunk embeddings.
//!
//! A flat index using Euclidean (L2) distance, rebuilt per query from a
//! session's chunk vectors. Lower distance means more similar.

use crate::error::{HarkError, Result};

/// A flat L2 nearest-neighbor index.
#[derive(Debug)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

/// Outcome of a search: threshold-filtered matches plus the best distance
/// observed among all retrieved candidates.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// `(distance, original_index)` pairs with distance within the threshold,
    /// ordered by ascending distance.
    pub matches: Vec<(f32, usize)>,
    /// Smallest distance among the unfiltered top-k candidates, or
    /// `f32::INFINITY` when nothing was retrieved. Reported even when it
    /// exceeds the threshold.
    pub top_distance: f32,
}

impl FlatIndex {
    /// Build an index over embedding vectors.
    ///
    /// Every vector must have exactly `dimension` components; a mismatch is a
    /// configuration fault and aborts immediately.
    pub fn build(dimension: usize, vectors: Vec<Vec<f32>>) -> Result<Self> {
        for (i, v) in vectors.iter().enumerate() {
            if v.len() != dimension {
                return Err(HarkError::Embedding(format!(
                    "Embedding dimension {} at position {} mismatches expected {}",
                    v.len(),
                    i,
                    dimension
                )));
            }
        }

        Ok(Self { dimension, vectors })
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Index dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Retrieve up to `top_k` nearest neighbors of `query` by L2 distance and
    /// keep those within `threshold`.
    pub fn search(&self, query: &[f32], top_k: usize, threshold: f32) -> Result<SearchOutcome> {
        if query.len() != self.dimension {
            return Err(HarkError::InvalidInput(format!(
                "Dimensional mismatch: index has {}, query has {}",
                self.dimension,
                query.len()
            )));
        }

        let mut ranked: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (l2_distance(query, v), i))
            .collect();

        ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);

        let top_distance = ranked.first().map(|(d, _)| *d).unwrap_or(f32::INFINITY);

        let matches: Vec<(f32, usize)> = ranked
            .into_iter()
            .filter(|(dist, _)| *dist <= threshold)
            .collect();

        Ok(SearchOutcome {
            matches,
            top_distance,
        })
    }
}

/// Compute the Euclidean (L2) distance between two vectors.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_distance() {
        assert_eq!(l2_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(l2_distance(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_build_rejects_dimension_mismatch() {
        let result = FlatIndex::build(3, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0]]);
        assert!(result.is_err());
    }

    #[test]
    fn test_search_rejects_query_dimension_mismatch() {
        let index = FlatIndex::build(3, vec![vec![1.0, 0.0, 0.0]]).unwrap();
        let result = index.search(&[1.0, 0.0], 5, 1.5);
        assert!(result.is_err());
    }

    #[test]
    fn test_search_orders_and_filters() {
        let index = FlatIndex::build(
            2,
            vec![
                vec![10.0, 0.0], // far
                vec![0.1, 0.0],  // near
                vec![1.0, 0.0],  // middling
            ],
        )
        .unwrap();

        let outcome = index.search(&[0.0, 0.0], 3, 1.5).unwrap();

        // The far vector exceeds the threshold
        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.matches[0].1, 1);
        assert_eq!(outcome.matches[1].1, 2);
        for (dist, _) in &outcome.matches {
            assert!(*dist <= 1.5);
        }
        assert!((outcome.top_distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_top_distance_reported_above_threshold() {
        let index = FlatIndex::build(2, vec![vec![10.0, 0.0]]).unwrap();
        let outcome = index.search(&[0.0, 0.0], 5, 1.5).unwrap();
        assert!(outcome.matches.is_empty());
        assert!((outcome.top_distance - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_index_infinite_top_distance() {
        let index = FlatIndex::build(2, vec![]).unwrap();
        let outcome = index.search(&[0.0, 0.0], 5, 1.5).unwrap();
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.top_distance, f32::INFINITY);
    }

    #[test]
    fn test_top_k_truncation() {
        let vectors: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32, 0.0]).collect();
        let index = FlatIndex::build(2, vectors).unwrap();
        let outcome = index.search(&[0.0, 0.0], 3, 100.0).unwrap();
        assert_eq!(outcome.matches.len(), 3);
        assert_eq!(outcome.matches[0].1, 0);
        assert_eq!(outcome.matches[2].1, 2);
    }
}
