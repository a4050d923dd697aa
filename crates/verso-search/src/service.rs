//! The recommendation query surface.
//!
//! [`QueryService`] is the one entry point for similarity queries. The
//! CLI calls it directly and the conversational controller calls it as a
//! tool, so validation and ranking are identical on both paths.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use verso_core::model::DocId;

use crate::config::{IndexStrategy, SearchConfig};
use crate::engine::Engine;
use crate::error::{SearchError, SearchResult};
use crate::pool::WorkerPool;
use crate::snapshot::ScoredDocument;

/// A neighbour query. Exactly one of `text` and `doc_id` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: Option<String>,
    pub doc_id: Option<DocId>,

    /// Requested neighbour count. Signed so that a non-positive value
    /// from a caller is rejected rather than wrapped.
    pub k: i64,
}

impl QueryRequest {
    #[must_use]
    pub fn by_text(text: impl Into<String>, k: i64) -> Self {
        Self {
            text: Some(text.into()),
            doc_id: None,
            k,
        }
    }

    #[must_use]
    pub fn by_id(doc_id: DocId, k: i64) -> Self {
        Self {
            text: None,
            doc_id: Some(doc_id),
            k,
        }
    }

    /// Check the request shape without touching the engine.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Query`] when both or neither of `text` and
    /// `doc_id` are set, the text is blank, or `k` is not positive.
    pub fn validate(&self) -> SearchResult<usize> {
        match (&self.text, &self.doc_id) {
            (Some(_), Some(_)) => {
                return Err(SearchError::Query(
                    "set either text or doc_id, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(SearchError::Query(
                    "one of text or doc_id is required".to_string(),
                ))
            }
            (Some(text), None) if text.trim().is_empty() => {
                return Err(SearchError::Query("query text is empty".to_string()))
            }
            _ => {}
        }
        if self.k <= 0 {
            return Err(SearchError::Query(format!(
                "k must be greater than zero, got {}",
                self.k
            )));
        }
        usize::try_from(self.k).map_err(|_| SearchError::Query(format!("k {} is too large", self.k)))
    }
}

/// Why a result was returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rationale {
    /// Vocabulary terms shared with the query, largest contribution first.
    pub shared_terms: Vec<String>,
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub doc_id: DocId,
    pub title: String,
    pub artist: String,

    /// Cosine similarity in `[0, 1]`.
    pub score: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<Rationale>,
}

impl From<ScoredDocument<'_>> for Recommendation {
    fn from(scored: ScoredDocument<'_>) -> Self {
        let rationale = (!scored.shared_terms.is_empty()).then(|| Rationale {
            shared_terms: scored.shared_terms,
        });
        Self {
            doc_id: scored.document.id().clone(),
            title: scored.document.title().to_string(),
            artist: scored.document.artist().to_string(),
            score: scored.score,
            rationale,
        }
    }
}

/// Ranked results: score descending, document id ascending on ties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub results: Vec<Recommendation>,
}

impl RecommendationResult {
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// A catalogue entry without a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongSummary {
    pub doc_id: DocId,
    pub title: String,
    pub artist: String,
}

/// Health of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub available: bool,
    pub generation: Option<u64>,
    pub documents: usize,
    pub vocabulary_size: usize,
    pub strategy: Option<IndexStrategy>,
}

/// Validated, read-only access to the current engine generation.
#[derive(Debug, Clone)]
pub struct QueryService {
    engine: Arc<Engine>,
    pool: WorkerPool,
    default_k: usize,
}

impl QueryService {
    /// Creates a service whose pool and default `k` come from `config`.
    #[must_use]
    pub fn new(engine: Arc<Engine>, config: &SearchConfig) -> Self {
        Self {
            engine,
            pool: WorkerPool::new(config.workers),
            default_k: config.default_k.max(1),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    #[must_use]
    pub const fn default_k(&self) -> usize {
        self.default_k
    }

    /// Answer `request` on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Query`] for a malformed request or unknown
    /// document, and [`SearchError::EngineUnavailable`] when no generation
    /// is installed.
    pub fn query(&self, request: &QueryRequest) -> SearchResult<RecommendationResult> {
        let k = request.validate()?;
        let snapshot = self.engine.snapshot()?;

        let scored = match (&request.text, &request.doc_id) {
            (Some(text), None) => snapshot.neighbors_of_text(text, k)?,
            (None, Some(id)) => snapshot.neighbors_of(id, k)?,
            _ => {
                return Err(SearchError::Query(
                    "one of text or doc_id is required".to_string(),
                ))
            }
        };

        let result = RecommendationResult {
            results: scored.into_iter().map(Recommendation::from).collect(),
        };
        log::debug!(
            "Query on generation {} returned {} results",
            snapshot.generation(),
            result.len()
        );
        Ok(result)
    }

    /// Answer `request` on the bounded worker pool.
    ///
    /// # Errors
    ///
    /// As [`query`](Self::query), plus [`SearchError::Worker`] if the job
    /// could not run.
    pub async fn query_async(&self, request: QueryRequest) -> SearchResult<RecommendationResult> {
        // Reject malformed requests before queueing for a worker.
        request.validate()?;
        let service = self.clone();
        self.pool.run(move || service.query(&request)).await
    }

    /// Tool entry point for the conversational controller: free-text
    /// descriptors with an explicit neighbour count.
    ///
    /// # Errors
    ///
    /// As [`query_async`](Self::query_async).
    pub async fn recommend(&self, descriptors: &str, k: i64) -> SearchResult<RecommendationResult> {
        self.query_async(QueryRequest::by_text(descriptors, k)).await
    }

    /// Tool entry point for "songs like this one".
    ///
    /// # Errors
    ///
    /// As [`query_async`](Self::query_async).
    pub async fn similar_to(&self, doc_id: DocId, k: i64) -> SearchResult<RecommendationResult> {
        self.query_async(QueryRequest::by_id(doc_id, k)).await
    }

    /// Case-insensitive exact title match; the lowest document id wins
    /// when titles repeat.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::EngineUnavailable`] when no generation is
    /// installed.
    pub fn resolve_title(&self, title: &str) -> SearchResult<Option<SongSummary>> {
        let snapshot = self.engine.snapshot()?;
        Ok(snapshot.find_by_title(title).map(|doc| SongSummary {
            doc_id: doc.id().clone(),
            title: doc.title().to_string(),
            artist: doc.artist().to_string(),
        }))
    }

    /// Run one word through the current generation's preprocessing, as it
    /// would appear in a [`Rationale`]. `None` when the word is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::EngineUnavailable`] when no generation is
    /// installed.
    pub fn normalize_word(&self, word: &str) -> SearchResult<Option<String>> {
        Ok(self.engine.snapshot()?.preprocessor().normalize_word(word))
    }

    /// Sorted, de-duplicated titles of every indexed song.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::EngineUnavailable`] when no generation is
    /// installed.
    pub fn titles(&self) -> SearchResult<Vec<String>> {
        let snapshot = self.engine.snapshot()?;
        let titles: BTreeSet<&str> = snapshot.documents().iter().map(|d| d.title()).collect();
        Ok(titles.into_iter().map(str::to_string).collect())
    }

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        match self.engine.snapshot() {
            Ok(snapshot) => EngineStatus {
                available: true,
                generation: Some(snapshot.generation()),
                documents: snapshot.documents().len(),
                vocabulary_size: snapshot.space().len(),
                strategy: Some(snapshot.index().strategy()),
            },
            Err(_) => EngineStatus {
                available: false,
                generation: None,
                documents: 0,
                vocabulary_size: 0,
                strategy: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verso_core::model::Document;

    fn service() -> QueryService {
        let config = SearchConfig::default();
        let engine = Arc::new(Engine::new(config.clone()));
        let docs = [
            ("0000001", "Morning", "love sunshine dance"),
            ("0000002", "Evening", "love rain tears"),
            ("0000003", "morning", "sunshine dance joy"),
        ]
        .iter()
        .map(|(id, title, text)| {
            Document::new(
                DocId::new(*id),
                *title,
                "artist",
                *text,
                text.split(' ').map(str::to_string).collect(),
            )
        })
        .collect();
        engine.rebuild(docs).unwrap();
        QueryService::new(engine, &config)
    }

    #[test]
    fn test_validate_requires_exactly_one_reference() {
        let both = QueryRequest {
            text: Some("love".to_string()),
            doc_id: Some(DocId::new("x")),
            k: 3,
        };
        assert!(both.validate().unwrap_err().is_query());

        let neither = QueryRequest {
            text: None,
            doc_id: None,
            k: 3,
        };
        assert!(neither.validate().unwrap_err().is_query());
    }

    #[test]
    fn test_validate_rejects_non_positive_k_and_blank_text() {
        assert!(QueryRequest::by_text("love", 0).validate().is_err());
        assert!(QueryRequest::by_text("love", -2).validate().is_err());
        assert!(QueryRequest::by_text("   ", 3).validate().is_err());
        assert_eq!(QueryRequest::by_text("love", 3).validate().unwrap(), 3);
    }

    #[test]
    fn test_query_by_text_carries_rationale() {
        let result = service()
            .query(&QueryRequest::by_text("sunshine", 5))
            .unwrap();
        assert_eq!(result.len(), 2);
        let rationale = result.results[0].rationale.as_ref().unwrap();
        assert_eq!(rationale.shared_terms, vec!["sunshine".to_string()]);
    }

    #[test]
    fn test_query_unknown_document_is_query_error() {
        let err = service()
            .query(&QueryRequest::by_id(DocId::new("9999999"), 3))
            .unwrap_err();
        assert!(err.is_query());
    }

    #[test]
    fn test_resolve_title_prefers_lowest_id() {
        let found = service().resolve_title("MORNING").unwrap().unwrap();
        assert_eq!(found.doc_id, DocId::new("0000001"));
    }

    #[test]
    fn test_titles_sorted_and_unique() {
        let titles = service().titles().unwrap();
        assert_eq!(titles, vec!["Evening", "Morning", "morning"]);
    }

    #[test]
    fn test_status_reports_unavailable() {
        let config = SearchConfig::default();
        let service = QueryService::new(Arc::new(Engine::new(config.clone())), &config);
        let status = service.status();
        assert!(!status.available);
        assert_eq!(status.generation, None);
        assert!(service.titles().unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn test_recommend_runs_on_pool() {
        let result = service().recommend("rain tears", 2).await.unwrap();
        assert_eq!(result.results[0].doc_id, DocId::new("0000002"));
    }

    #[tokio::test]
    async fn test_recommend_rejects_bad_k_before_queueing() {
        let err = service().recommend("rain", 0).await.unwrap_err();
        assert!(err.is_query());
    }
}
