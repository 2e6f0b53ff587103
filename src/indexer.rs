use kdam::{BarExt, tqdm};
use tracing::info;

use crate::{
    corpus::Document,
    embedder::QueryEmbedder,
    embedding_store::EmbeddingStore,
    error::{Error, Result},
};

pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Summary of one `build-index` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub embedded: usize,
    pub dimension: usize,
    /// Entries left over from a previous, larger corpus.
    pub removed: usize,
}

/// Embed every document and write the vectors into `store`.
///
/// Each batch is one embedding request and one write transaction. All
/// vectors must share the dimension of the first one returned. Entries at or
/// beyond `documents.len()` are removed once every document is stored.
pub async fn build_index<E: QueryEmbedder>(
    documents: &[Document],
    embedder: &E,
    store: &EmbeddingStore,
    batch_size: usize,
    show_progress: bool,
) -> Result<BuildReport> {
    if batch_size == 0 {
        return Err(Error::InvalidArgument(
            "batch size must be at least 1".to_string(),
        ));
    }

    let mut pb = show_progress.then(|| {
        tqdm!(total = documents.len(), desc = "Embedding", unit = " songs")
    });

    let mut dimension = None;
    let mut embedded = 0;

    for batch in documents.chunks(batch_size) {
        let texts: Vec<String> = batch
            .iter()
            .map(|doc| doc.searchable_text().to_string())
            .collect();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(Error::Format(format!(
                "embedder returned {} vectors for {} documents",
                vectors.len(),
                batch.len()
            )));
        }

        let mut entries = Vec::with_capacity(batch.len());
        for (doc, vector) in batch.iter().zip(vectors) {
            let expected = *dimension.get_or_insert(vector.len());
            if vector.is_empty() || vector.len() != expected {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            entries.push((doc.index as u64, vector));
        }

        store.batch_store(&entries)?;
        embedded += entries.len();

        if let Some(pb) = pb.as_mut() {
            pb.update(entries.len())?;
        }
    }

    if pb.is_some() {
        eprintln!();
    }

    let removed = store.truncate(documents.len() as u64)?;
    let dimension = dimension.unwrap_or(0);
    info!(embedded, dimension, removed, "embedding index built");

    Ok(BuildReport {
        embedded,
        dimension,
        removed,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::corpus::CorpusStore;

    /// Embeds text as `[chars, batch call number]`.
    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl QueryEmbedder for CountingEmbedder {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.chars().count() as f32, 0.0])
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as f32;
            Ok(texts
                .iter()
                .map(|t| vec![t.chars().count() as f32, call])
                .collect())
        }
    }

    struct RaggedEmbedder;

    impl QueryEmbedder for RaggedEmbedder {
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0])
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .enumerate()
                .map(|(i, _)| vec![0.0; i + 1])
                .collect())
        }
    }

    fn songs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document::new(i, format!("song {i}"), "la la", ""))
            .collect()
    }

    #[tokio::test]
    async fn embeds_in_batches_and_aligns_with_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            EmbeddingStore::open(&tmp.path().join("embeddings.redb")).unwrap();
        let embedder = CountingEmbedder::default();
        let docs = songs(5);

        let report = build_index(&docs, &embedder, &store, 2, false)
            .await
            .unwrap();

        assert_eq!(
            report,
            BuildReport {
                embedded: 5,
                dimension: 2,
                removed: 0
            }
        );
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.load(4).unwrap().unwrap()[1], 2.0);

        let corpus =
            CorpusStore::from_parts(docs, store.load_matrix().unwrap())
                .unwrap();
        assert_eq!(corpus.len(), 5);
    }

    #[tokio::test]
    async fn rebuild_removes_stale_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            EmbeddingStore::open(&tmp.path().join("embeddings.redb")).unwrap();
        let embedder = CountingEmbedder::default();

        build_index(&songs(4), &embedder, &store, 64, false)
            .await
            .unwrap();
        let report = build_index(&songs(2), &embedder, &store, 64, false)
            .await
            .unwrap();

        assert_eq!(report.removed, 2);
        assert_eq!(store.list_ids().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn mixed_dimensions_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            EmbeddingStore::open(&tmp.path().join("embeddings.redb")).unwrap();

        let err = build_index(&songs(2), &RaggedEmbedder, &store, 8, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 1,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn zero_batch_size_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            EmbeddingStore::open(&tmp.path().join("embeddings.redb")).unwrap();

        let err = build_index(
            &songs(1),
            &CountingEmbedder::default(),
            &store,
            0,
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
