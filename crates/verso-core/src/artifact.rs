//! Persisted engine artifacts.
//!
//! A built vector space is stored as one [`ArtifactSet`]: the document
//! metadata, the frozen vocabulary with its idf weights, and one sparse
//! vector per indexed document. Every set carries an [`ArtifactHeader`]
//! whose `artifact_version` must equal [`ARTIFACT_VERSION`] for the set
//! to be loaded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{DocId, Document};

/// Layout version of the persisted artifacts. Bump whenever the
/// vectorization or storage format changes incompatibly.
pub const ARTIFACT_VERSION: u32 = 1;

/// Metadata describing one persisted generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub artifact_version: u32,

    /// Generation counter of the snapshot that produced these artifacts.
    pub generation: u64,

    pub built_at: DateTime<Utc>,
    pub vocabulary_size: usize,
    pub document_count: usize,

    /// Name of the similarity index strategy ("on_demand", "precomputed").
    pub index_strategy: String,

    /// Serialized preprocessing settings the vocabulary was built with.
    /// Opaque to this crate; the search engine owns its format.
    pub preprocessor: String,
}

impl ArtifactHeader {
    #[must_use]
    pub fn new(generation: u64, index_strategy: impl Into<String>) -> Self {
        Self {
            artifact_version: ARTIFACT_VERSION,
            generation,
            built_at: Utc::now(),
            vocabulary_size: 0,
            document_count: 0,
            index_strategy: index_strategy.into(),
            preprocessor: String::new(),
        }
    }

    #[must_use]
    pub fn with_preprocessor(mut self, preprocessor: impl Into<String>) -> Self {
        self.preprocessor = preprocessor.into();
        self
    }
}

/// One vocabulary term with its dimension index and idf weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabEntry {
    pub term: String,
    pub dim: u32,
    pub idf: f32,
}

/// A document vector as (dimension, weight) pairs sorted by dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVector {
    pub doc_id: DocId,
    pub entries: Vec<(u32, f32)>,
}

/// Everything needed to restore a built engine without re-vectorizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub header: ArtifactHeader,
    pub documents: Vec<Document>,
    pub vocabulary: Vec<VocabEntry>,
    pub vectors: Vec<StoredVector>,
}

impl ArtifactSet {
    /// Create a set, filling the header counts from the payload.
    #[must_use]
    pub fn new(
        mut header: ArtifactHeader,
        documents: Vec<Document>,
        vocabulary: Vec<VocabEntry>,
        vectors: Vec<StoredVector>,
    ) -> Self {
        header.vocabulary_size = vocabulary.len();
        header.document_count = documents.len();
        Self {
            header,
            documents,
            vocabulary,
            vectors,
        }
    }
}
