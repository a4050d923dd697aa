//! Vector search for verso.
//!
//! Turns song lyrics into a frozen TF-IDF vector space and answers
//! nearest-neighbour queries over it, either for a song already in the
//! corpus or for free text run through the same preprocessing pipeline.
//!
//! The pieces, leaf first:
//!
//! - [`preprocess`]: lyric text to cleaned tokens
//! - [`space`]: vocabulary selection, idf weights, document vectors
//! - [`index`]: cosine similarity over unit vectors, precomputed or lazy
//! - [`engine`]: immutable snapshots swapped atomically on rebuild
//! - [`service`]: the validated query surface shared by every caller

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod index;
pub mod pool;
pub mod preprocess;
pub mod service;
pub mod snapshot;
pub mod space;
pub mod vector;

pub use config::{IndexStrategy, SearchConfig};
pub use engine::Engine;
pub use error::{SearchError, SearchResult};
pub use preprocess::Preprocessor;
pub use service::{
    EngineStatus, QueryRequest, QueryService, Rationale, Recommendation, RecommendationResult,
};
pub use snapshot::EngineSnapshot;
pub use space::{VectorSpace, VectorSpaceBuilder};
pub use vector::SparseVector;
