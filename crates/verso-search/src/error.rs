//! Error types for the search engine.

use thiserror::Error;

/// Errors raised while building or querying the similarity engine.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Input text or corpus content is unusable (e.g. no tokens survive
    /// cleaning).
    #[error("data error: {0}")]
    Data(String),

    /// The vector space or similarity index could not be built.
    #[error("build error: {0}")]
    Build(String),

    /// The request is malformed (text/doc_id exclusivity, bad k, unknown
    /// document).
    #[error("query error: {0}")]
    Query(String),

    /// No successfully built snapshot is installed.
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The corpus file could not be read or parsed.
    #[error("corpus error in {path}: {message}")]
    Corpus { path: String, message: String },

    /// A snapshot was offered that is not newer than the installed one.
    #[error("generation {generation} is not newer than installed generation {current}")]
    StaleGeneration { generation: u64, current: u64 },

    /// A query job could not be run on the worker pool.
    #[error("worker error: {0}")]
    Worker(String),

    /// An error propagated from the artifact store.
    #[error("artifact error: {0}")]
    Artifact(#[from] verso_core::Error),
}

impl SearchError {
    /// Returns `true` when the request itself was at fault and retrying
    /// it unchanged cannot succeed.
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query(_))
    }

    /// Returns `true` when the engine had no usable snapshot.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::EngineUnavailable(_))
    }

    /// Returns `true` for failures of the offline build phase, which must
    /// keep the engine offline.
    pub fn is_build_failure(&self) -> bool {
        matches!(self, Self::Data(_) | Self::Build(_) | Self::Corpus { .. })
    }
}

/// Convenience alias for search results.
pub type SearchResult<T> = std::result::Result<T, SearchError>;
