use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    embedder::QueryEmbedder,
    error::{Error, Result},
    filter::{self, Categories, FilterOutcome},
    fusion::{self, FusedCandidate},
    index::CorpusIndex,
    keyword::{self, KeywordCandidate},
    vector::VectorCandidate,
};

/// One retrieval request.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    pub query: String,
    /// Number of songs wanted; must be at least 1.
    pub top_k: usize,
    pub categories: Option<Categories>,
    /// Fuse keyword search into the vector ranking.
    pub use_hybrid: bool,
    /// When hybrid, rank by keywords alone if the embedding call fails.
    pub allow_keyword_fallback: bool,
}

impl RetrievalParams {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            categories: None,
            use_hybrid: true,
            allow_keyword_fallback: false,
        }
    }
}

/// Which number `RetrievedSong::score` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScoreKind {
    /// Fused score, higher is better.
    Combined,
    /// Vector distance, lower is better.
    Distance,
}

/// A final retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedSong {
    pub rank: usize,
    pub document_index: usize,
    pub title: String,
    pub feature_summary: String,
    pub lyrics: String,
    pub score: f32,
    pub score_kind: ScoreKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<u32>,
}

/// Results plus how they were produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalOutcome {
    pub results: Vec<RetrievedSong>,
    /// Keywords extracted from the query (empty when not hybrid).
    pub keywords: Vec<String>,
    /// True when the embedding call failed and keywords alone ranked the
    /// results.
    pub semantic_degraded: bool,
    pub filter: FilterOutcome,
}

impl RetrievalOutcome {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            keywords: Vec::new(),
            semantic_degraded: false,
            filter: FilterOutcome::Skipped,
        }
    }
}

/// Serializable envelope used by the JSON output and the MCP tool.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResponse<'a> {
    pub query: &'a str,
    pub result_count: usize,
    #[serde(flatten)]
    pub outcome: &'a RetrievalOutcome,
}

impl<'a> RetrievalResponse<'a> {
    pub fn new(query: &'a str, outcome: &'a RetrievalOutcome) -> Self {
        Self {
            query,
            result_count: outcome.results.len(),
            outcome,
        }
    }
}

enum Ranking {
    Fused(Vec<FusedCandidate>),
    Vector(Vec<VectorCandidate>),
}

struct Scored {
    index: usize,
    score: f32,
    kind: ScoreKind,
    distance: Option<f32>,
    keyword_score: Option<u32>,
}

impl From<FusedCandidate> for Scored {
    fn from(c: FusedCandidate) -> Self {
        Self {
            index: c.index,
            score: c.combined_score,
            kind: ScoreKind::Combined,
            distance: c.distance,
            keyword_score: c.keyword_score,
        }
    }
}

impl From<VectorCandidate> for Scored {
    fn from(c: VectorCandidate) -> Self {
        Self {
            index: c.index,
            score: c.distance,
            kind: ScoreKind::Distance,
            distance: Some(c.distance),
            keyword_score: None,
        }
    }
}

/// Runs retrievals against one shared [`CorpusIndex`].
pub struct Retriever<E> {
    index: Arc<CorpusIndex>,
    embedder: E,
    embed_timeout: Duration,
}

impl<E: QueryEmbedder> Retriever<E> {
    pub fn new(
        index: Arc<CorpusIndex>,
        embedder: E,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            index,
            embedder,
            embed_timeout,
        }
    }

    pub fn index(&self) -> &CorpusIndex {
        &self.index
    }

    /// Execute the full retrieval pipeline.
    ///
    /// 1. Embed the query (bounded by the embedding timeout)
    /// 2. Vector search, 3×k wide when hybrid
    /// 3. Keyword search, 2×k wide (hybrid only)
    /// 4. Fuse both rankings, 2×k wide
    /// 5. Filter by categories, falling back to the unfiltered list
    /// 6. Sort and cut to k
    ///
    /// Dropping the returned future cancels the in-flight embedding call.
    pub async fn retrieve(
        &self,
        params: &RetrievalParams,
    ) -> Result<RetrievalOutcome> {
        let k = params.top_k;
        if k == 0 {
            return Err(Error::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }

        let store = self.index.store();
        if store.is_empty() {
            return Ok(RetrievalOutcome::empty());
        }

        let vector_width = if params.use_hybrid {
            k.saturating_mul(3)
        } else {
            k
        };
        let fusion_width = k.saturating_mul(2);

        // Stage 1-2: embedding and vector search
        let mut semantic_degraded = false;
        let vector_hits = match self.embed(&params.query).await {
            Ok(embedding) => {
                Some(self.index.vector_search(&embedding, vector_width)?)
            }
            Err(Error::EmbeddingUnavailable(reason))
                if params.use_hybrid && params.allow_keyword_fallback =>
            {
                warn!(
                    %reason,
                    "embedding unavailable, ranking by keywords only"
                );
                semantic_degraded = true;
                None
            }
            Err(e) => return Err(e),
        };

        // Stage 3-4: keyword search and fusion
        let keywords = if params.use_hybrid {
            keyword::extract_keywords(&params.query)
        } else {
            Vec::new()
        };
        let keyword_hits: Vec<KeywordCandidate> = if keywords.is_empty() {
            Vec::new()
        } else {
            self.index.keyword_search(&keywords, fusion_width)
        };
        debug!(
            vector = vector_hits.as_ref().map_or(0, Vec::len),
            keyword = keyword_hits.len(),
            ?keywords,
            "first-stage candidates"
        );

        // Any extracted keyword fuses, even one that matched nothing.
        let ranking = match vector_hits {
            Some(hits) if keywords.is_empty() => Ranking::Vector(hits),
            hits => Ranking::Fused(fusion::fuse(
                &hits.unwrap_or_default(),
                &keyword_hits,
                fusion_width,
            )),
        };

        // Stage 5: category filter
        let (ranking, filter) = match params.categories.as_ref() {
            None => (ranking, FilterOutcome::Skipped),
            Some(categories) => match ranking {
                Ranking::Fused(list) => {
                    let (list, outcome) =
                        filter::filter_by_categories(list, categories, store);
                    (Ranking::Fused(list), outcome)
                }
                Ranking::Vector(list) => {
                    let (list, outcome) =
                        filter::filter_by_categories(list, categories, store);
                    (Ranking::Vector(list), outcome)
                }
            },
        };

        // Stage 6: final ordering and limit
        let scored: Vec<Scored> = match ranking {
            Ranking::Fused(mut list) => {
                list.sort_by(|a, b| {
                    b.combined_score
                        .total_cmp(&a.combined_score)
                        .then(a.index.cmp(&b.index))
                });
                list.into_iter().take(k).map(Scored::from).collect()
            }
            Ranking::Vector(mut list) => {
                list.sort_by(|a, b| {
                    a.distance
                        .total_cmp(&b.distance)
                        .then(a.index.cmp(&b.index))
                });
                list.into_iter().take(k).map(Scored::from).collect()
            }
        };

        let results = scored
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                let doc = store.get(s.index)?;
                Ok(RetrievedSong {
                    rank: i + 1,
                    document_index: s.index,
                    title: doc.title.clone(),
                    feature_summary: doc.feature_summary.clone(),
                    lyrics: doc.lyrics.clone(),
                    score: s.score,
                    score_kind: s.kind,
                    distance: s.distance,
                    keyword_score: s.keyword_score,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RetrievalOutcome {
            results,
            keywords,
            semantic_degraded,
            filter,
        })
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>> {
        let call = self.embedder.embed_query(query);
        tokio::time::timeout(self.embed_timeout, call)
            .await
            .map_err(|_| {
                Error::EmbeddingUnavailable(format!(
                    "embedding timed out after {:?}",
                    self.embed_timeout
                ))
            })?
    }
}

/// Format results for human-readable terminal output.
pub fn format_human(outcome: &RetrievalOutcome) {
    if outcome.semantic_degraded {
        println!("(embedding unavailable, ranked by keywords only)");
    }
    if outcome.filter == FilterOutcome::FellBack {
        println!("(no song matched the categories, showing all results)");
    }
    if outcome.results.is_empty() {
        println!("No results found.");
        return;
    }

    for r in &outcome.results {
        let kind = match r.score_kind {
            ScoreKind::Combined => "score",
            ScoreKind::Distance => "dist",
        };
        println!(
            "{:>3}. [{kind} {:.3}] #{} {}",
            r.rank, r.score, r.document_index, r.title
        );
        if !r.feature_summary.is_empty() {
            println!("     {}", r.feature_summary);
        }
    }
    println!("\n{} result(s)", outcome.results.len());
}

/// Format results as JSON output.
pub fn format_json(outcome: &RetrievalOutcome, query: &str) -> Result<()> {
    let json = serde_json::to_string(&RetrievalResponse::new(query, outcome))
        .map_err(|e| {
            Error::Config(format!("failed to serialize results: {e}"))
        })?;
    println!("{json}");
    Ok(())
}
