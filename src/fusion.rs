//! Weighted fusion of vector and keyword rankings.
//!
//! Each signal is squashed into `(0, weight]` before summing: distances via
//! `1 / (distance + 1)`, keyword counts via `score / (score + 1)`. A document
//! found by only one search gets only that term.

use std::collections::BTreeMap;

use crate::{keyword::KeywordCandidate, vector::VectorCandidate};

pub const VECTOR_WEIGHT: f32 = 0.7;
pub const KEYWORD_WEIGHT: f32 = 0.3;

/// A candidate ranked by its fused score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedCandidate {
    pub index: usize,
    pub combined_score: f32,
    /// Present when vector search returned this document.
    pub distance: Option<f32>,
    /// Present when keyword search returned this document.
    pub keyword_score: Option<u32>,
}

impl FusedCandidate {
    fn empty(index: usize) -> Self {
        Self {
            index,
            combined_score: 0.0,
            distance: None,
            keyword_score: None,
        }
    }
}

pub fn vector_contribution(distance: f32) -> f32 {
    VECTOR_WEIGHT * (1.0 / (distance + 1.0))
}

pub fn keyword_contribution(keyword_score: u32) -> f32 {
    let score = keyword_score as f32;
    KEYWORD_WEIGHT * (score / (score + 1.0))
}

/// Merge both rankings by document index and keep the best `width`.
///
/// Output is sorted by `combined_score` descending, ties by ascending index.
pub fn fuse(
    vector: &[VectorCandidate],
    keyword: &[KeywordCandidate],
    width: usize,
) -> Vec<FusedCandidate> {
    let mut merged: BTreeMap<usize, FusedCandidate> = BTreeMap::new();

    for c in vector {
        let fused = merged
            .entry(c.index)
            .or_insert_with(|| FusedCandidate::empty(c.index));
        fused.distance = Some(c.distance);
        fused.combined_score += vector_contribution(c.distance);
    }

    for c in keyword {
        let fused = merged
            .entry(c.index)
            .or_insert_with(|| FusedCandidate::empty(c.index));
        fused.keyword_score = Some(c.keyword_score);
        fused.combined_score += keyword_contribution(c.keyword_score);
    }

    let mut ranked: Vec<FusedCandidate> = merged.into_values().collect();
    ranked.sort_by(|a, b| {
        b.combined_score
            .total_cmp(&a.combined_score)
            .then(a.index.cmp(&b.index))
    });
    ranked.truncate(width);
    ranked
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn v(index: usize, distance: f32) -> VectorCandidate {
        VectorCandidate { index, distance }
    }

    fn kw(index: usize, keyword_score: u32) -> KeywordCandidate {
        KeywordCandidate {
            index,
            keyword_score,
        }
    }

    #[test]
    fn contributions_match_weights() {
        assert!((vector_contribution(0.0) - 0.7).abs() < 1e-6);
        assert!((vector_contribution(1.0) - 0.35).abs() < 1e-6);
        assert!((keyword_contribution(1) - 0.15).abs() < 1e-6);
        assert!((keyword_contribution(3) - 0.225).abs() < 1e-6);
    }

    #[test]
    fn documents_in_both_lists_sum_their_terms() {
        let fused = fuse(&[v(0, 1.0), v(1, 0.0)], &[kw(0, 1)], 10);

        let doc0 = fused.iter().find(|c| c.index == 0).unwrap();
        assert!((doc0.combined_score - 0.5).abs() < 1e-6);
        assert_eq!(doc0.distance, Some(1.0));
        assert_eq!(doc0.keyword_score, Some(1));

        let doc1 = fused.iter().find(|c| c.index == 1).unwrap();
        assert!((doc1.combined_score - 0.7).abs() < 1e-6);
        assert_eq!(doc1.keyword_score, None);
    }

    #[test]
    fn keyword_only_documents_are_kept() {
        let fused = fuse(&[v(0, 3.0)], &[kw(5, 2)], 10);

        // 0.3 * 2/3 = 0.2 outranks 0.7 * 1/4 = 0.175.
        let order: Vec<usize> = fused.iter().map(|c| c.index).collect();
        assert_eq!(order, vec![5, 0]);
        assert_eq!(fused[0].distance, None);
        assert!((fused[0].combined_score - 0.2).abs() < 1e-6);
    }

    #[test]
    fn ties_break_by_index_and_width_truncates() {
        let fused = fuse(&[v(4, 1.0), v(2, 1.0), v(9, 1.0)], &[], 2);

        let order: Vec<usize> = fused.iter().map(|c| c.index).collect();
        assert_eq!(order, vec![2, 4]);
    }

    #[test]
    fn empty_inputs_fuse_to_nothing() {
        assert!(fuse(&[], &[], 5).is_empty());
    }

    proptest! {
        #[test]
        fn both_signals_never_score_below_either_alone(
            distance in 0.0f32..1000.0,
            keyword_score in 1u32..20,
        ) {
            let both = fuse(&[v(0, distance)], &[kw(0, keyword_score)], 1)[0];
            let vector_only = fuse(&[v(0, distance)], &[], 1)[0];
            let keyword_only = fuse(&[], &[kw(0, keyword_score)], 1)[0];

            prop_assert!(both.combined_score >= vector_only.combined_score);
            prop_assert!(both.combined_score >= keyword_only.combined_score);
            prop_assert!(both.combined_score <= VECTOR_WEIGHT + KEYWORD_WEIGHT);
        }
    }
}
