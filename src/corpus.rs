//! The in-memory song corpus and the metadata snapshot it is loaded from.
//!
//! A snapshot comes in one of two JSON shapes:
//!
//! * an array of records, each carrying `title`, `lyrics` and
//!   `feature_summary` (or their Korean keys `제목`, `가사` and
//!   `가사 특징 요약`);
//! * an object of parallel columns `titles`, `lyrics`, `feature_summaries`.
//!
//! Both are normalised into [`Document`] at load time, so nothing past this
//! module ever sees the raw shape.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::{
    embedding_store::{EmbeddingMatrix, EmbeddingStore},
    error::{Error, Result},
};

/// One reference song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub index: usize,
    pub title: String,
    pub lyrics: String,
    pub feature_summary: String,
    searchable: String,
}

impl Document {
    pub fn new(
        index: usize,
        title: impl Into<String>,
        lyrics: impl Into<String>,
        feature_summary: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let lyrics = lyrics.into();
        let feature_summary = feature_summary.into();
        let searchable =
            format!("{title} {feature_summary} {lyrics}").to_lowercase();
        Self {
            index,
            title,
            lyrics,
            feature_summary,
            searchable,
        }
    }

    /// Title, feature summary and lyrics joined and lower-cased. Both the
    /// keyword index and the category filter match against this text.
    pub fn searchable_text(&self) -> &str {
        &self.searchable
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetadataSnapshot {
    Records(Vec<SongRecord>),
    Columns(SongColumns),
}

#[derive(Debug, Deserialize)]
struct SongRecord {
    #[serde(default, alias = "제목")]
    title: Option<String>,
    #[serde(default, alias = "가사")]
    lyrics: Option<String>,
    #[serde(default, alias = "가사 특징 요약", alias = "특징")]
    feature_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SongColumns {
    #[serde(default)]
    titles: Vec<Option<String>>,
    #[serde(default)]
    lyrics: Vec<Option<String>>,
    #[serde(default, alias = "feature_summary")]
    feature_summaries: Vec<Option<String>>,
}

impl MetadataSnapshot {
    fn into_documents(self) -> Vec<Document> {
        match self {
            Self::Records(records) => records
                .into_iter()
                .enumerate()
                .map(|(index, r)| {
                    Document::new(
                        index,
                        r.title.unwrap_or_default(),
                        r.lyrics.unwrap_or_default(),
                        r.feature_summary.unwrap_or_default(),
                    )
                })
                .collect(),
            Self::Columns(columns) => {
                let len = columns
                    .titles
                    .len()
                    .max(columns.lyrics.len())
                    .max(columns.feature_summaries.len());
                let cell = |column: &[Option<String>], index: usize| {
                    column.get(index).cloned().flatten().unwrap_or_default()
                };
                (0..len)
                    .map(|index| {
                        Document::new(
                            index,
                            cell(&columns.titles, index),
                            cell(&columns.lyrics, index),
                            cell(&columns.feature_summaries, index),
                        )
                    })
                    .collect()
            }
        }
    }
}

/// Parse a metadata snapshot from JSON text into documents.
pub fn parse_metadata(json: &str) -> Result<Vec<Document>> {
    let snapshot: MetadataSnapshot =
        serde_json::from_str(json).map_err(|e| {
            Error::Format(format!(
                "metadata is neither a record array nor a column table: {e}"
            ))
        })?;
    Ok(snapshot.into_documents())
}

/// Read and parse a metadata snapshot file.
pub fn read_metadata(path: &Path) -> Result<Vec<Document>> {
    if !path.is_file() {
        return Err(Error::NotFound {
            kind: "corpus metadata",
            name: path.display().to_string(),
        });
    }
    let json = std::fs::read_to_string(path)?;
    parse_metadata(&json)
}

/// Immutable documents plus their embedding vectors, aligned by index.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    documents: Vec<Document>,
    embeddings: EmbeddingMatrix,
}

impl CorpusStore {
    /// Load the metadata snapshot and the embedding index from disk.
    pub fn load(metadata_path: &Path, index_path: &Path) -> Result<Self> {
        let documents = read_metadata(metadata_path)?;
        let store = EmbeddingStore::open_existing(index_path)?;
        let embeddings = store.load_matrix()?;

        let corpus = Self::from_parts(documents, embeddings)?;
        info!(
            documents = corpus.len(),
            dimension = corpus.dimension(),
            "loaded corpus"
        );
        Ok(corpus)
    }

    /// Assemble a store from already loaded parts.
    pub fn from_parts(
        documents: Vec<Document>,
        embeddings: EmbeddingMatrix,
    ) -> Result<Self> {
        if documents.len() != embeddings.len() {
            return Err(Error::Format(format!(
                "metadata has {} documents but the embedding index has {}",
                documents.len(),
                embeddings.len()
            )));
        }
        if !documents.is_empty() && embeddings.dimension == 0 {
            return Err(Error::Format(
                "embedding index has zero-dimension vectors".to_string(),
            ));
        }
        if let Some(doc) =
            documents.iter().enumerate().find(|(i, d)| d.index != *i)
        {
            return Err(Error::Format(format!(
                "document at position {} carries index {}",
                doc.0, doc.1.index
            )));
        }
        Ok(Self {
            documents,
            embeddings,
        })
    }

    pub fn get(&self, index: usize) -> Result<&Document> {
        self.documents.get(index).ok_or(Error::OutOfRange {
            index,
            len: self.documents.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Embedding dimension, or 0 for an empty corpus.
    pub fn dimension(&self) -> usize {
        self.embeddings.dimension
    }

    pub fn embeddings(&self) -> &EmbeddingMatrix {
        &self.embeddings
    }

    pub fn embedding(&self, index: usize) -> Result<&[f32]> {
        self.get(index)?;
        Ok(self.embeddings.row(index))
    }
}
