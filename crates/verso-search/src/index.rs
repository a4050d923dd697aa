//! Cosine similarity over unit-length document vectors.
//!
//! Two strategies share one query path. [`IndexStrategy::Precomputed`]
//! fills the full symmetric score matrix at build time (O(N²·D) once,
//! O(N) per document query); [`IndexStrategy::OnDemand`] keeps only the
//! vectors and scores each query against every candidate (O(N·D)). Free
//! text is always scored on demand since its vector is transient.

use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;

use verso_core::model::DocId;

use crate::config::IndexStrategy;
use crate::error::{SearchError, SearchResult};
use crate::vector::SparseVector;

/// What a neighbour query is anchored on.
#[derive(Debug, Clone, Copy)]
pub enum Reference<'a> {
    /// A document in the index; it is excluded from its own neighbours.
    Document(&'a DocId),
    /// A transient query vector built through the same pipeline.
    Vector(&'a SparseVector),
}

/// One scored candidate, identified by its position in the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub score: f32,
}

/// Row-major N×N score matrix.
struct PairwiseMatrix {
    n: usize,
    scores: Vec<f32>,
}

impl fmt::Debug for PairwiseMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairwiseMatrix")
            .field("n", &self.n)
            .finish_non_exhaustive()
    }
}

impl PairwiseMatrix {
    /// Score every pair once (upper triangle, in parallel) and mirror it,
    /// so the matrix is exactly symmetric.
    fn compute(vectors: &[SparseVector]) -> Self {
        let n = vectors.len();
        let upper: Vec<Vec<f32>> = (0..n)
            .into_par_iter()
            .map(|i| {
                (i..n)
                    .map(|j| clamp_score(vectors[i].dot(&vectors[j])))
                    .collect()
            })
            .collect();

        let mut scores = vec![0.0; n * n];
        for (i, row) in upper.into_iter().enumerate() {
            for (offset, score) in row.into_iter().enumerate() {
                let j = i + offset;
                scores[i * n + j] = score;
                scores[j * n + i] = score;
            }
        }
        Self { n, scores }
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.scores[i * self.n..(i + 1) * self.n]
    }
}

/// Similarity index over the document vectors of one snapshot.
#[derive(Debug)]
pub struct SimilarityIndex {
    ids: Vec<DocId>,
    positions: HashMap<DocId, usize>,
    vectors: Vec<SparseVector>,
    matrix: Option<PairwiseMatrix>,
    strategy: IndexStrategy,
}

impl SimilarityIndex {
    /// Build the index. `ids` and `vectors` are aligned by position.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Build`] when the inputs are empty or
    /// misaligned, an id repeats, or a vector is not unit length.
    pub fn build(
        ids: Vec<DocId>,
        vectors: Vec<SparseVector>,
        strategy: IndexStrategy,
    ) -> SearchResult<Self> {
        if ids.is_empty() {
            return Err(SearchError::Build(
                "no documents to index".to_string(),
            ));
        }
        if ids.len() != vectors.len() {
            return Err(SearchError::Build(format!(
                "{} document ids but {} vectors",
                ids.len(),
                vectors.len()
            )));
        }
        if let Some(pos) = vectors.iter().position(|v| (v.norm() - 1.0).abs() > 1e-3) {
            return Err(SearchError::Build(format!(
                "vector for document {} is not unit length",
                ids[pos]
            )));
        }

        let positions: HashMap<DocId, usize> = ids
            .iter()
            .enumerate()
            .map(|(pos, id)| (id.clone(), pos))
            .collect();
        if positions.len() != ids.len() {
            return Err(SearchError::Build(
                "duplicate document id in index".to_string(),
            ));
        }

        let matrix = match strategy {
            IndexStrategy::Precomputed => {
                log::info!("Precomputing {}x{} similarity matrix", ids.len(), ids.len());
                Some(PairwiseMatrix::compute(&vectors))
            }
            IndexStrategy::OnDemand => None,
        };

        Ok(Self {
            ids,
            positions,
            vectors,
            matrix,
            strategy,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub const fn strategy(&self) -> IndexStrategy {
        self.strategy
    }

    #[must_use]
    pub fn position(&self, id: &DocId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    #[must_use]
    pub fn id(&self, position: usize) -> Option<&DocId> {
        self.ids.get(position)
    }

    #[must_use]
    pub fn vector(&self, position: usize) -> Option<&SparseVector> {
        self.vectors.get(position)
    }

    #[must_use]
    pub fn vectors(&self) -> &[SparseVector] {
        &self.vectors
    }

    /// Similarity of two indexed documents, in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Query`] if either id is not indexed.
    pub fn score(&self, a: &DocId, b: &DocId) -> SearchResult<f32> {
        let i = self.require(a)?;
        let j = self.require(b)?;
        Ok(match &self.matrix {
            Some(matrix) => matrix.row(i)[j],
            None => clamp_score(self.vectors[i].dot(&self.vectors[j])),
        })
    }

    /// The `k` best-scoring neighbours of `reference`, best first.
    ///
    /// Candidates with a zero score (no shared term) are never returned,
    /// and `k` larger than the candidate count is capped. Ties are broken
    /// by ascending document id so the order is total.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Query`] if `k` is zero or a referenced
    /// document is not indexed.
    pub fn neighbors(&self, reference: Reference<'_>, k: usize) -> SearchResult<Vec<Neighbor>> {
        if k == 0 {
            return Err(SearchError::Query(
                "k must be greater than zero".to_string(),
            ));
        }

        let (scores, exclude): (Vec<f32>, Option<usize>) = match reference {
            Reference::Document(id) => {
                let pos = self.require(id)?;
                let scores = match &self.matrix {
                    Some(matrix) => matrix.row(pos).to_vec(),
                    None => self.score_all(&self.vectors[pos]),
                };
                (scores, Some(pos))
            }
            Reference::Vector(vector) => {
                if vector.is_zero() {
                    return Ok(Vec::new());
                }
                (self.score_all(vector), None)
            }
        };

        let mut candidates: Vec<Neighbor> = scores
            .into_iter()
            .enumerate()
            .filter(|&(pos, score)| Some(pos) != exclude && score > 0.0)
            .map(|(position, score)| Neighbor { position, score })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| self.ids[a.position].cmp(&self.ids[b.position]))
        });
        candidates.truncate(k);
        Ok(candidates)
    }

    fn score_all(&self, query: &SparseVector) -> Vec<f32> {
        self.vectors
            .iter()
            .map(|v| clamp_score(query.dot(v)))
            .collect()
    }

    fn require(&self, id: &DocId) -> SearchResult<usize> {
        self.position(id)
            .ok_or_else(|| SearchError::Query(format!("unknown document id '{id}'")))
    }
}

/// Keep floating error from pushing a cosine outside `[0, 1]`.
fn clamp_score(score: f32) -> f32 {
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<DocId> {
        names.iter().map(|n| DocId::new(*n)).collect()
    }

    fn sample(strategy: IndexStrategy) -> SimilarityIndex {
        let vectors = vec![
            SparseVector::normalized(vec![(0, 2.0), (1, 1.0)]),
            SparseVector::normalized(vec![(0, 1.0), (2, 1.0)]),
            SparseVector::normalized(vec![(3, 1.0)]),
            SparseVector::normalized(vec![(0, 2.0), (1, 1.0)]),
        ];
        SimilarityIndex::build(ids(&["a", "b", "c", "d"]), vectors, strategy).unwrap()
    }

    #[test]
    fn test_build_rejects_empty() {
        let err = SimilarityIndex::build(Vec::new(), Vec::new(), IndexStrategy::OnDemand);
        assert!(matches!(err, Err(SearchError::Build(_))));
    }

    #[test]
    fn test_build_rejects_zero_vector() {
        let err = SimilarityIndex::build(
            ids(&["a"]),
            vec![SparseVector::default()],
            IndexStrategy::OnDemand,
        );
        assert!(matches!(err, Err(SearchError::Build(_))));
    }

    #[test]
    fn test_self_similarity_and_symmetry_both_strategies() {
        for strategy in [IndexStrategy::OnDemand, IndexStrategy::Precomputed] {
            let index = sample(strategy);
            let all = ids(&["a", "b", "c", "d"]);
            for a in &all {
                assert!((index.score(a, a).unwrap() - 1.0).abs() < 1e-5);
                for b in &all {
                    assert_eq!(index.score(a, b).unwrap(), index.score(b, a).unwrap());
                }
            }
        }
    }

    #[test]
    fn test_neighbors_excludes_self_and_zero_scores() {
        let index = sample(IndexStrategy::OnDemand);
        let a = DocId::new("a");
        let result = index.neighbors(Reference::Document(&a), 10).unwrap();
        let positions: Vec<usize> = result.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![3, 1]);
    }

    #[test]
    fn test_neighbors_tie_breaks_by_id() {
        let index = sample(IndexStrategy::Precomputed);
        let query = SparseVector::normalized(vec![(0, 2.0), (1, 1.0)]);
        let result = index.neighbors(Reference::Vector(&query), 2).unwrap();
        assert_eq!(result[0].score, result[1].score);
        assert_eq!(index.id(result[0].position), Some(&DocId::new("a")));
        assert_eq!(index.id(result[1].position), Some(&DocId::new("d")));
    }

    #[test]
    fn test_neighbors_caps_k() {
        let index = sample(IndexStrategy::OnDemand);
        let query = SparseVector::normalized(vec![(0, 1.0)]);
        let result = index.neighbors(Reference::Vector(&query), 100).unwrap();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_neighbors_rejects_zero_k() {
        let index = sample(IndexStrategy::OnDemand);
        let query = SparseVector::normalized(vec![(0, 1.0)]);
        assert!(matches!(
            index.neighbors(Reference::Vector(&query), 0),
            Err(SearchError::Query(_))
        ));
    }

    #[test]
    fn test_neighbors_zero_vector_is_empty() {
        let index = sample(IndexStrategy::OnDemand);
        let result = index
            .neighbors(Reference::Vector(&SparseVector::default()), 3)
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_neighbors_unknown_document() {
        let index = sample(IndexStrategy::OnDemand);
        let missing = DocId::new("zz");
        assert!(matches!(
            index.neighbors(Reference::Document(&missing), 3),
            Err(SearchError::Query(_))
        ));
    }
}
