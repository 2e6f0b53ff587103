use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::corpus::CorpusStore;

/// Tokens shorter than this many characters are neither indexed nor
/// extracted from queries.
pub const MIN_TOKEN_CHARS: usize = 2;

/// Upper bound on keywords taken from one query.
pub const MAX_QUERY_KEYWORDS: usize = 10;

/// Common English and Korean function words dropped from queries.
pub const STOP_WORDS: &[&str] = &[
    "the", "is", "are", "was", "were", "a", "an", "and", "or", "but", "in",
    "on", "at", "to", "for", "of", "with", "by", "이", "가", "을", "를", "에",
    "의", "와", "과", "도", "로", "으로",
];

/// A document matched by keyword search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordCandidate {
    pub index: usize,
    /// Number of distinct query keywords found in the document.
    pub keyword_score: u32,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split lower-cased text into maximal runs of word characters, keeping
/// only tokens of at least [`MIN_TOKEN_CHARS`] characters.
pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !is_word_char(c))
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
}

/// Extract up to [`MAX_QUERY_KEYWORDS`] distinct keywords from a query, in
/// first-occurrence order, with stop words removed.
pub fn extract_keywords(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let mut seen = HashSet::new();
    tokenize(&lowered)
        .filter(|token| !STOP_WORDS.contains(token))
        .filter(|token| seen.insert(*token))
        .take(MAX_QUERY_KEYWORDS)
        .map(str::to_string)
        .collect()
}

/// Inverted index from token to the documents containing it.
#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    postings: HashMap<String, Vec<usize>>,
}

impl KeywordIndex {
    pub fn build(corpus: &CorpusStore) -> Self {
        let mut postings: HashMap<String, Vec<usize>> = HashMap::new();

        // Documents are visited in index order, so each posting list stays
        // sorted and only its last entry needs checking for duplicates.
        for doc in corpus.documents() {
            for token in tokenize(doc.searchable_text()) {
                let list = postings.entry(token.to_string()).or_default();
                if list.last() != Some(&doc.index) {
                    list.push(doc.index);
                }
            }
        }

        info!(tokens = postings.len(), "built keyword index");
        Self { postings }
    }

    /// Documents containing `token`, ascending. Unknown tokens yield an
    /// empty slice.
    pub fn lookup(&self, token: &str) -> &[usize] {
        self.postings.get(token).map_or(&[], Vec::as_slice)
    }

    /// Number of distinct tokens in the index.
    pub fn token_count(&self) -> usize {
        self.postings.len()
    }

    /// Rank documents by how many of `keywords` they contain.
    ///
    /// Results are sorted by score descending, then index ascending, and
    /// truncated to `k`.
    pub fn search(
        &self,
        keywords: &[String],
        k: usize,
    ) -> Vec<KeywordCandidate> {
        let distinct: HashSet<&str> =
            keywords.iter().map(|kw| kw.as_str()).collect();

        let mut scores: HashMap<usize, u32> = HashMap::new();
        for keyword in distinct {
            for &index in self.lookup(&keyword.to_lowercase()) {
                *scores.entry(index).or_default() += 1;
            }
        }

        let mut ranked: Vec<KeywordCandidate> = scores
            .into_iter()
            .map(|(index, keyword_score)| KeywordCandidate {
                index,
                keyword_score,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.keyword_score
                .cmp(&a.keyword_score)
                .then(a.index.cmp(&b.index))
        });
        ranked.truncate(k);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{corpus::Document, embedding_store::EmbeddingMatrix};

    fn corpus(texts: &[(&str, &str, &str)]) -> CorpusStore {
        let docs = texts
            .iter()
            .enumerate()
            .map(|(i, (title, lyrics, feature))| {
                Document::new(i, *title, *lyrics, *feature)
            })
            .collect();
        let rows = texts.iter().map(|_| vec![0.0]).collect();
        CorpusStore::from_parts(docs, EmbeddingMatrix::from_rows(rows).unwrap())
            .unwrap()
    }

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn tokenize_keeps_word_runs_of_two_or_more() {
        let tokens: Vec<&str> =
            tokenize("달 노래, 달빛_아래! a bc 12 x").collect();
        assert_eq!(tokens, vec!["노래", "달빛_아래", "bc", "12"]);
    }

    #[test]
    fn extract_keywords_drops_stop_words_and_duplicates() {
        let kws = extract_keywords("The Moon and the moon with 으로 달빛 달빛");
        assert_eq!(kws, vec!["moon", "달빛"]);
    }

    #[test]
    fn extract_keywords_caps_at_ten() {
        let query = (0..15)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let kws = extract_keywords(&query);
        assert_eq!(kws.len(), MAX_QUERY_KEYWORDS);
        assert_eq!(kws[0], "word0");
        assert_eq!(kws[9], "word9");
    }

    #[test]
    fn extract_keywords_from_stop_words_only_is_empty() {
        assert!(extract_keywords("the and of 으로 a").is_empty());
    }

    #[test]
    fn build_indexes_title_feature_and_lyrics() {
        let store = corpus(&[
            ("달 노래", "달빛 아래", "밤, 고요함"),
            ("별 노래", "별이 빛나", ""),
        ]);
        let index = KeywordIndex::build(&store);

        assert_eq!(index.lookup("노래"), &[0, 1]);
        assert_eq!(index.lookup("달빛"), &[0]);
        assert_eq!(index.lookup("고요함"), &[0]);
        assert!(index.lookup("달").is_empty());
        assert!(index.lookup("missing").is_empty());
    }

    #[test]
    fn repeated_tokens_are_posted_once() {
        let store = corpus(&[("rain rain", "rain", "rain")]);
        let index = KeywordIndex::build(&store);
        assert_eq!(index.lookup("rain"), &[0]);
    }

    #[test]
    fn search_counts_distinct_matches_and_breaks_ties_by_index() {
        let store = corpus(&[
            ("spring song", "", ""),
            ("winter song", "snow", ""),
            ("winter snow", "", ""),
            ("autumn", "", ""),
        ]);
        let index = KeywordIndex::build(&store);

        let hits = index.search(&keywords(&["winter", "snow", "song"]), 10);
        let ranked: Vec<(usize, u32)> =
            hits.iter().map(|c| (c.index, c.keyword_score)).collect();
        assert_eq!(ranked, vec![(1, 3), (2, 2), (0, 1)]);
    }

    #[test]
    fn search_truncates_to_k() {
        let store = corpus(&[("song", "", ""), ("song", "", ""), ("song", "", "")]);
        let index = KeywordIndex::build(&store);

        let hits = index.search(&keywords(&["song"]), 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].index, 0);
        assert_eq!(hits[1].index, 1);
    }

    #[test]
    fn search_with_no_keywords_is_empty() {
        let store = corpus(&[("song", "", "")]);
        let index = KeywordIndex::build(&store);
        assert!(index.search(&[], 5).is_empty());
    }
}
