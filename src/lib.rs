//! dongyo - hybrid retrieval over a corpus of reference children's songs.
//!
//! A query is embedded through an OpenAI-compatible embedding service and
//! matched against precomputed song embeddings by exact nearest-neighbour
//! search. Keyword matches over title, feature summary and lyrics are fused
//! into that ranking, and optional category values narrow the final list.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dongyo::retrieval::RetrievalParams;
//! use dongyo::{
//!     CorpusIndex, DataDir, EmbeddingConfig, RemoteEmbedder, Retriever,
//! };
//!
//! # async fn run() -> dongyo::Result<()> {
//! let data_dir = DataDir::resolve(None)?;
//! let index = CorpusIndex::open(
//!     &data_dir.corpus_metadata(),
//!     &data_dir.embeddings_db(),
//! )?;
//!
//! let config = EmbeddingConfig::default();
//! let timeout = config.timeout;
//! let retriever =
//!     Retriever::new(Arc::new(index), RemoteEmbedder::new(config)?, timeout);
//!
//! let outcome = retriever.retrieve(&RetrievalParams::new("겨울 눈", 5)).await?;
//! for song in &outcome.results {
//!     println!("{} {} ({:.3})", song.rank, song.title, song.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod config_db;
pub mod corpus;
pub mod data_dir;
pub mod embedder;
pub mod embedding_store;
pub mod error;
pub mod filter;
pub mod fusion;
pub mod index;
pub mod indexer;
pub mod keyword;
pub mod mcp;
pub mod retrieval;
pub mod vector;

pub use config::EmbeddingConfig;
pub use config_db::ConfigDb;
pub use corpus::{CorpusStore, Document};
pub use data_dir::DataDir;
pub use embedder::{QueryEmbedder, RemoteEmbedder};
pub use embedding_store::EmbeddingStore;
pub use error::{Error, Result};
pub use index::CorpusIndex;
pub use retrieval::Retriever;
