//! Build and query settings for the vector space.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default bound on the vocabulary (vector space dimension).
pub const DEFAULT_VOCABULARY_SIZE: usize = 5000;

/// Default number of neighbours returned when a caller does not ask for
/// a specific count.
pub const DEFAULT_K: usize = 5;

/// Default size of the query worker pool.
pub const DEFAULT_WORKERS: usize = 4;

/// How pairwise similarity is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStrategy {
    /// Score every candidate against the reference vector at query time.
    #[default]
    OnDemand,
    /// Compute the full symmetric score matrix once at build time.
    Precomputed,
}

impl IndexStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnDemand => "on_demand",
            Self::Precomputed => "precomputed",
        }
    }

    /// Parse the persisted strategy name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "on_demand" => Some(Self::OnDemand),
            "precomputed" => Some(Self::Precomputed),
            _ => None,
        }
    }
}

impl fmt::Display for IndexStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for building and querying the vector space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of vocabulary terms kept, by corpus frequency.
    pub vocabulary_size: usize,

    pub index_strategy: IndexStrategy,

    /// Neighbour count used by callers that do not specify one.
    pub default_k: usize,

    /// Reduce tokens to a root form before vectorizing.
    pub stemming: bool,

    /// Stop words removed in addition to the built-in English list.
    pub extra_stop_words: Vec<String>,

    /// Maximum number of similarity computations running at once.
    pub workers: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            vocabulary_size: DEFAULT_VOCABULARY_SIZE,
            index_strategy: IndexStrategy::default(),
            default_k: DEFAULT_K,
            stemming: true,
            extra_stop_words: Vec::new(),
            workers: DEFAULT_WORKERS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_search_config() {
        let config = SearchConfig::default();
        assert_eq!(config.vocabulary_size, 5000);
        assert_eq!(config.index_strategy, IndexStrategy::OnDemand);
        assert!(config.stemming);
    }

    #[test]
    fn test_strategy_names_round_trip() {
        for strategy in [IndexStrategy::OnDemand, IndexStrategy::Precomputed] {
            assert_eq!(IndexStrategy::parse(strategy.as_str()), Some(strategy));
        }
        assert_eq!(IndexStrategy::parse("hnsw"), None);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"index_strategy": "precomputed"}"#).unwrap();
        assert_eq!(config.index_strategy, IndexStrategy::Precomputed);
        assert_eq!(config.default_k, DEFAULT_K);
    }
}
