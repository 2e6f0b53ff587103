use std::path::Path;

use crate::{
    corpus::CorpusStore,
    error::Result,
    keyword::{KeywordCandidate, KeywordIndex},
    vector::{self, VectorCandidate},
};

/// The corpus and every structure derived from it, built once at startup.
///
/// Nothing here is mutated after construction, so one value can be shared
/// (e.g. behind an `Arc`) by any number of concurrent retrievals.
#[derive(Debug, Clone)]
pub struct CorpusIndex {
    store: CorpusStore,
    keywords: KeywordIndex,
}

impl CorpusIndex {
    pub fn open(metadata_path: &Path, index_path: &Path) -> Result<Self> {
        Ok(Self::new(CorpusStore::load(metadata_path, index_path)?))
    }

    pub fn new(store: CorpusStore) -> Self {
        let keywords = KeywordIndex::build(&store);
        Self { store, keywords }
    }

    pub fn store(&self) -> &CorpusStore {
        &self.store
    }

    pub fn keyword_index(&self) -> &KeywordIndex {
        &self.keywords
    }

    pub fn vector_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<VectorCandidate>> {
        vector::search(self.store.embeddings(), query, k)
    }

    pub fn keyword_search(
        &self,
        keywords: &[String],
        k: usize,
    ) -> Vec<KeywordCandidate> {
        self.keywords.search(keywords, k)
    }
}
