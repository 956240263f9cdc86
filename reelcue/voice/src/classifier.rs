use serde::{Deserialize, Serialize};

/// How a search phrase should be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchClassification {
    /// Exact, title-style lookup.
    Direct,
    /// Criteria- or description-based lookup.
    Semantic,
}

impl SearchClassification {
    /// Stable label used in logs and events.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Semantic => "semantic",
        }
    }
}

/// Phrases that mark a query as descriptive (comparison, audience, mood, superlative).
pub const SEMANTIC_INDICATORS: &[&str] = &[
    "movies like",
    "films like",
    "shows like",
    "something like",
    "similar to",
    "for kids",
    "for the family",
    "family friendly",
    "date night",
    "funny movies",
    "scary movies",
    "sad movies",
    "feel good",
    "feel-good",
    "best movies",
    "best films",
    "top rated",
    "highest rated",
    "movies about",
    "films about",
];

/// Phrases that mark a query as an explicit title.
pub const DIRECT_INDICATORS: &[&str] = &["the movie", "the film", "called"];

/// Word count at or below which an unmarked query is treated as a title.
pub const DEFAULT_DIRECT_WORD_LIMIT: usize = 4;

/// Decides between direct and semantic search for a query.
///
/// Total over every input: there is no "unclassifiable" result.
#[derive(Debug, Clone, Copy)]
pub struct SearchIntentClassifier {
    direct_word_limit: usize,
}

impl SearchIntentClassifier {
    /// Classifier using the default word limit.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_word_limit(DEFAULT_DIRECT_WORD_LIMIT)
    }

    /// Classifier with a custom word limit.
    #[must_use]
    pub const fn with_word_limit(direct_word_limit: usize) -> Self {
        Self { direct_word_limit }
    }

    /// Classifies `query`. Indicator lists are checked before word count.
    #[must_use]
    pub fn classify(&self, query: &str) -> SearchClassification {
        let lowered = query.to_lowercase();
        if contains_any(&lowered, SEMANTIC_INDICATORS) {
            return SearchClassification::Semantic;
        }
        if contains_any(&lowered, DIRECT_INDICATORS) {
            return SearchClassification::Direct;
        }
        if word_count(query) <= self.direct_word_limit {
            SearchClassification::Direct
        } else {
            SearchClassification::Semantic
        }
    }
}

impl Default for SearchIntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Splits on single spaces and drops the empty pieces, so "one  two   three"
/// counts 3: a doubled space from transcription must not push a short title
/// past the direct word limit.
fn word_count(query: &str) -> usize {
    query.split(' ').filter(|word| !word.is_empty()).count()
}
