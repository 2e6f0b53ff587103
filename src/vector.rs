use rayon::prelude::*;

use crate::{
    embedding_store::EmbeddingMatrix,
    error::{Error, Result},
};

/// A document matched by embedding similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorCandidate {
    pub index: usize,
    /// Squared Euclidean distance to the query. Lower is closer; 0 means
    /// identical.
    pub distance: f32,
}

/// Exact nearest-neighbour search over every row of `embeddings`.
///
/// Returns at most `k` candidates sorted by distance ascending, ties broken
/// by ascending index. An empty matrix yields no candidates regardless of
/// the query's length.
pub fn search(
    embeddings: &EmbeddingMatrix,
    query: &[f32],
    k: usize,
) -> Result<Vec<VectorCandidate>> {
    if embeddings.is_empty() || k == 0 {
        return Ok(Vec::new());
    }
    if query.len() != embeddings.dimension {
        return Err(Error::DimensionMismatch {
            expected: embeddings.dimension,
            actual: query.len(),
        });
    }

    let mut ranked: Vec<VectorCandidate> = (0..embeddings.len())
        .into_par_iter()
        .map(|index| VectorCandidate {
            index,
            distance: squared_l2(query, embeddings.row(index)),
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.index.cmp(&b.index))
    });
    ranked.truncate(k);

    Ok(ranked)
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn matrix(rows: &[&[f32]]) -> EmbeddingMatrix {
        EmbeddingMatrix::from_rows(rows.iter().map(|r| r.to_vec()).collect())
            .unwrap()
    }

    #[test]
    fn nearest_first() {
        let m = matrix(&[&[0.0, 0.0], &[5.0, 5.0], &[1.0, 0.0]]);

        let hits = search(&m, &[0.9, 0.1], 3).unwrap();
        let order: Vec<usize> = hits.iter().map(|c| c.index).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn identical_vector_has_zero_distance() {
        let m = matrix(&[&[1.0, 2.0, 3.0]]);
        let hits = search(&m, &[1.0, 2.0, 3.0], 1).unwrap();
        assert_eq!(hits[0].distance, 0.0);
    }

    #[test]
    fn ties_break_by_index() {
        let m = matrix(&[&[1.0, 0.0], &[-1.0, 0.0], &[0.0, 1.0]]);

        let hits = search(&m, &[0.0, 0.0], 3).unwrap();
        let order: Vec<usize> = hits.iter().map(|c| c.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn k_larger_than_corpus_returns_everything() {
        let m = matrix(&[&[0.0], &[1.0]]);
        assert_eq!(search(&m, &[0.0], 10).unwrap().len(), 2);
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let m = matrix(&[&[0.0, 1.0]]);
        let err = search(&m, &[0.0, 1.0, 2.0], 1).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn empty_matrix_returns_nothing() {
        let m = EmbeddingMatrix::default();
        assert!(search(&m, &[1.0, 2.0], 5).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn distances_never_decrease_by_rank(
            rows in prop::collection::vec(
                prop::collection::vec(-100.0f32..100.0, 4),
                1..40,
            ),
            query in prop::collection::vec(-100.0f32..100.0, 4),
            k in 1usize..50,
        ) {
            let m = EmbeddingMatrix::from_rows(rows.clone()).unwrap();
            let hits = search(&m, &query, k).unwrap();

            prop_assert_eq!(hits.len(), k.min(rows.len()));
            for pair in hits.windows(2) {
                prop_assert!(pair[0].distance <= pair[1].distance);
            }
            for hit in &hits {
                prop_assert!(hit.index < rows.len());
                prop_assert!(hit.distance >= 0.0);
            }
        }
    }
}
