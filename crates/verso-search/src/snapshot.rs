//! One immutable generation of the engine.

use std::collections::HashMap;

use verso_core::artifact::{ArtifactHeader, ArtifactSet, StoredVector};
use verso_core::model::{DocId, Document};

use crate::config::{IndexStrategy, SearchConfig};
use crate::error::{SearchError, SearchResult};
use crate::index::{Reference, SimilarityIndex};
use crate::preprocess::{Preprocessor, PreprocessorSettings};
use crate::space::{VectorSpace, VectorSpaceBuilder};
use crate::vector::SparseVector;

/// Maximum number of shared terms reported per recommendation.
const MAX_SHARED_TERMS: usize = 5;

/// A scored neighbour resolved to its document.
#[derive(Debug, Clone)]
pub struct ScoredDocument<'a> {
    pub document: &'a Document,
    pub score: f32,

    /// Vocabulary terms shared with the reference, largest contribution
    /// first.
    pub shared_terms: Vec<String>,
}

/// Vector space, documents, and similarity index built together.
///
/// A snapshot is never mutated. Rebuilding produces a new snapshot with
/// a higher generation number.
#[derive(Debug)]
pub struct EngineSnapshot {
    generation: u64,
    preprocessor: Preprocessor,
    space: VectorSpace,
    documents: Vec<Document>,
    index: SimilarityIndex,
    titles: HashMap<String, usize>,
}

impl EngineSnapshot {
    /// Build a snapshot from cleaned documents.
    ///
    /// Documents whose tokens all fall outside the bounded vocabulary have
    /// no direction in the space; they are skipped (and logged) so every
    /// indexed document has self-similarity 1.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Build`] when the corpus is empty, yields no
    /// vocabulary, or no document survives vectorization.
    pub fn build(
        documents: Vec<Document>,
        config: &SearchConfig,
        generation: u64,
    ) -> SearchResult<Self> {
        let preprocessor = Preprocessor::from_config(config);
        let (space, vectors) = VectorSpaceBuilder::new(config.vocabulary_size).build(&documents)?;

        let mut kept_docs = Vec::with_capacity(documents.len());
        let mut kept_vectors = Vec::with_capacity(documents.len());
        let mut skipped = 0usize;
        for (doc, vector) in documents.into_iter().zip(vectors) {
            if vector.is_zero() {
                log::warn!(
                    "Skipping document {} ('{}'): no in-vocabulary terms",
                    doc.id(),
                    doc.title()
                );
                skipped += 1;
            } else {
                kept_docs.push(doc);
                kept_vectors.push(vector);
            }
        }

        if kept_docs.is_empty() {
            return Err(SearchError::Build(
                "no document has any in-vocabulary term".to_string(),
            ));
        }

        let snapshot = Self::assemble(
            generation,
            preprocessor,
            space,
            kept_docs,
            kept_vectors,
            config.index_strategy,
        )?;

        log::info!(
            "Built generation {}: {} documents indexed, {} skipped, {} terms, {} index",
            generation,
            snapshot.documents.len(),
            skipped,
            snapshot.space.len(),
            snapshot.index.strategy()
        );
        Ok(snapshot)
    }

    /// Restore a snapshot from persisted artifacts.
    ///
    /// Every stored vector is re-validated against the stored vocabulary,
    /// so a corrupt or mismatched artifact fails here instead of serving
    /// wrong scores.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Build`] for inconsistent artifacts.
    pub fn from_artifacts(set: ArtifactSet) -> SearchResult<Self> {
        let ArtifactSet {
            header,
            documents,
            vocabulary,
            vectors,
        } = set;

        let strategy = IndexStrategy::parse(&header.index_strategy).ok_or_else(|| {
            SearchError::Build(format!(
                "unknown index strategy '{}' in artifacts",
                header.index_strategy
            ))
        })?;
        let settings: PreprocessorSettings =
            serde_json::from_str(&header.preprocessor).map_err(|e| {
                SearchError::Build(format!("unreadable preprocessor settings: {e}"))
            })?;

        let space = VectorSpace::from_entries(vocabulary)?;

        let mut by_id: HashMap<DocId, Vec<(u32, f32)>> = vectors
            .into_iter()
            .map(|stored| (stored.doc_id, stored.entries))
            .collect();

        let mut doc_vectors = Vec::with_capacity(documents.len());
        for doc in &documents {
            let entries = by_id.remove(doc.id()).ok_or_else(|| {
                SearchError::Build(format!("no stored vector for document {}", doc.id()))
            })?;
            doc_vectors.push(SparseVector::from_entries(entries, space.len())?);
        }
        if !by_id.is_empty() {
            return Err(SearchError::Build(format!(
                "{} stored vectors have no matching document",
                by_id.len()
            )));
        }

        Self::assemble(
            header.generation,
            Preprocessor::new(settings),
            space,
            documents,
            doc_vectors,
            strategy,
        )
    }

    /// Export this snapshot for the artifact store.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Build`] if the preprocessor settings cannot
    /// be serialized.
    pub fn to_artifacts(&self) -> SearchResult<ArtifactSet> {
        let preprocessor = serde_json::to_string(self.preprocessor.settings())
            .map_err(|e| SearchError::Build(format!("cannot serialize settings: {e}")))?;
        let header = ArtifactHeader::new(self.generation, self.index.strategy().as_str())
            .with_preprocessor(preprocessor);

        let vectors = self
            .documents
            .iter()
            .zip(self.index.vectors())
            .map(|(doc, vector)| StoredVector {
                doc_id: doc.id().clone(),
                entries: vector.entries().to_vec(),
            })
            .collect();

        Ok(ArtifactSet::new(
            header,
            self.documents.clone(),
            self.space.to_entries(),
            vectors,
        ))
    }

    fn assemble(
        generation: u64,
        preprocessor: Preprocessor,
        space: VectorSpace,
        documents: Vec<Document>,
        vectors: Vec<SparseVector>,
        strategy: IndexStrategy,
    ) -> SearchResult<Self> {
        let ids = documents.iter().map(|d| d.id().clone()).collect();
        let index = SimilarityIndex::build(ids, vectors, strategy)?;

        // First title by ascending id wins.
        let mut order: Vec<usize> = (0..documents.len()).collect();
        order.sort_by(|&a, &b| documents[a].id().cmp(documents[b].id()));
        let mut titles = HashMap::new();
        for pos in order {
            titles
                .entry(documents[pos].title().to_lowercase())
                .or_insert(pos);
        }

        Ok(Self {
            generation,
            preprocessor,
            space,
            documents,
            index,
            titles,
        })
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn space(&self) -> &VectorSpace {
        &self.space
    }

    #[must_use]
    pub const fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    #[must_use]
    pub const fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    #[must_use]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    #[must_use]
    pub fn document(&self, id: &DocId) -> Option<&Document> {
        self.index.position(id).map(|pos| &self.documents[pos])
    }

    /// Case-insensitive exact title lookup.
    #[must_use]
    pub fn find_by_title(&self, title: &str) -> Option<&Document> {
        self.titles
            .get(&title.trim().to_lowercase())
            .map(|&pos| &self.documents[pos])
    }

    /// Vectorize free text through this generation's pipeline.
    #[must_use]
    pub fn vectorize_text(&self, text: &str) -> SparseVector {
        self.space.vectorize(&self.preprocessor.tokenize(text))
    }

    /// Neighbours of an indexed document, excluding the document itself.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Query`] for an unknown id or zero `k`.
    pub fn neighbors_of(&self, id: &DocId, k: usize) -> SearchResult<Vec<ScoredDocument<'_>>> {
        let pos = self
            .index
            .position(id)
            .ok_or_else(|| SearchError::Query(format!("unknown document id '{id}'")))?;
        let reference = &self.index.vectors()[pos];
        self.resolve(reference, self.index.neighbors(Reference::Document(id), k)?)
    }

    /// Neighbours of free text. Text without in-vocabulary terms yields an
    /// empty list.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Query`] for zero `k`.
    pub fn neighbors_of_text(&self, text: &str, k: usize) -> SearchResult<Vec<ScoredDocument<'_>>> {
        let query = self.vectorize_text(text);
        let neighbors = self.index.neighbors(Reference::Vector(&query), k)?;
        self.resolve(&query, neighbors)
    }

    fn resolve(
        &self,
        reference: &SparseVector,
        neighbors: Vec<crate::index::Neighbor>,
    ) -> SearchResult<Vec<ScoredDocument<'_>>> {
        Ok(neighbors
            .into_iter()
            .map(|n| {
                let shared_terms = reference
                    .shared(&self.index.vectors()[n.position])
                    .into_iter()
                    .take(MAX_SHARED_TERMS)
                    .filter_map(|(dim, _)| self.space.term(dim).map(str::to_string))
                    .collect();
                ScoredDocument {
                    document: &self.documents[n.position],
                    score: n.score,
                    shared_terms,
                }
            })
            .collect())
    }
}
