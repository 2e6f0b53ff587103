//! Post-filtering of ranked candidates by category values.
//!
//! Matching is a case-insensitive substring test against each document's
//! searchable text, OR-ed across categories. A filter that would remove every
//! candidate is dropped and the input returned as-is, so a request with any
//! candidates always gets at least one back.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::{
    corpus::CorpusStore,
    fusion::FusedCandidate,
    keyword::KeywordCandidate,
    vector::VectorCandidate,
};

/// Category name to value, e.g. `{"계절": "겨울", "동물": ""}`.
pub type Categories = BTreeMap<String, String>;

/// Anything that points at a corpus document.
pub trait DocumentRef {
    fn document_index(&self) -> usize;
}

impl DocumentRef for VectorCandidate {
    fn document_index(&self) -> usize {
        self.index
    }
}

impl DocumentRef for KeywordCandidate {
    fn document_index(&self) -> usize {
        self.index
    }
}

impl DocumentRef for FusedCandidate {
    fn document_index(&self) -> usize {
        self.index
    }
}

/// What the filter did to its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum FilterOutcome {
    /// No category values were given.
    Skipped,
    /// Some candidates matched; the rest were dropped.
    Applied { kept: usize, dropped: usize },
    /// Nothing matched, so the unfiltered input was returned.
    FellBack,
}

/// Lower-cased, non-blank category values.
///
/// Surrounding whitespace is kept and takes part in the match.
pub fn category_patterns(categories: &Categories) -> Vec<String> {
    categories
        .values()
        .filter(|value| !value.trim().is_empty())
        .map(|value| value.to_lowercase())
        .collect()
}

/// Keep the candidates whose document mentions any category value.
///
/// Candidates pointing outside the corpus never match.
pub fn filter_by_categories<T: DocumentRef>(
    candidates: Vec<T>,
    categories: &Categories,
    corpus: &CorpusStore,
) -> (Vec<T>, FilterOutcome) {
    let patterns = category_patterns(categories);
    if patterns.is_empty() {
        return (candidates, FilterOutcome::Skipped);
    }

    let matches = |candidate: &T| {
        corpus
            .get(candidate.document_index())
            .is_ok_and(|doc| {
                let text = doc.searchable_text();
                patterns.iter().any(|p| text.contains(p.as_str()))
            })
    };

    if !candidates.iter().any(|c| matches(c)) {
        debug!(
            ?patterns,
            candidates = candidates.len(),
            "category filter matched nothing, returning unfiltered candidates"
        );
        return (candidates, FilterOutcome::FellBack);
    }

    let total = candidates.len();
    let kept: Vec<T> = candidates.into_iter().filter(|c| matches(c)).collect();
    let outcome = FilterOutcome::Applied {
        kept: kept.len(),
        dropped: total - kept.len(),
    };
    (kept, outcome)
}
