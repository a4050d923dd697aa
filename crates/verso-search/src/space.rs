//! Vocabulary selection and TF-IDF weighting.

use std::collections::{HashMap, HashSet};

use verso_core::artifact::VocabEntry;
use verso_core::model::Document;

use crate::config::DEFAULT_VOCABULARY_SIZE;
use crate::error::{SearchError, SearchResult};
use crate::vector::SparseVector;

/// A frozen vocabulary with per-term idf weights.
///
/// Dimensions are assigned in alphabetical term order. The space never
/// changes after it is built; a different corpus needs a new space.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSpace {
    terms: Vec<String>,
    idf: Vec<f32>,
    lookup: HashMap<String, u32>,
}

impl VectorSpace {
    fn from_parts(terms: Vec<String>, idf: Vec<f32>) -> Self {
        let lookup = terms
            .iter()
            .enumerate()
            .map(|(dim, term)| (term.clone(), dim as u32))
            .collect();
        Self { terms, idf, lookup }
    }

    /// Restore a space from persisted vocabulary entries.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Build`] when the entries are empty, their
    /// dimensions are not exactly `0..n`, a term repeats, or a weight is
    /// not positive.
    pub fn from_entries(mut entries: Vec<VocabEntry>) -> SearchResult<Self> {
        if entries.is_empty() {
            return Err(SearchError::Build("stored vocabulary is empty".to_string()));
        }
        entries.sort_by_key(|e| e.dim);

        let mut terms = Vec::with_capacity(entries.len());
        let mut idf = Vec::with_capacity(entries.len());
        for (expected, entry) in entries.into_iter().enumerate() {
            if entry.dim as usize != expected {
                return Err(SearchError::Build(format!(
                    "stored vocabulary has a gap or duplicate at dimension {}",
                    entry.dim
                )));
            }
            if !(entry.idf > 0.0 && entry.idf.is_finite()) {
                return Err(SearchError::Build(format!(
                    "stored idf for '{}' is not positive",
                    entry.term
                )));
            }
            terms.push(entry.term);
            idf.push(entry.idf);
        }

        let space = Self::from_parts(terms, idf);
        if space.lookup.len() != space.terms.len() {
            return Err(SearchError::Build(
                "stored vocabulary contains duplicate terms".to_string(),
            ));
        }
        Ok(space)
    }

    /// Vocabulary entries for persistence.
    #[must_use]
    pub fn to_entries(&self) -> Vec<VocabEntry> {
        self.terms
            .iter()
            .zip(&self.idf)
            .enumerate()
            .map(|(dim, (term, &idf))| VocabEntry {
                term: term.clone(),
                dim: dim as u32,
                idf,
            })
            .collect()
    }

    /// Number of dimensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    #[must_use]
    pub fn dim_of(&self, term: &str) -> Option<u32> {
        self.lookup.get(term).copied()
    }

    #[must_use]
    pub fn term(&self, dim: u32) -> Option<&str> {
        self.terms.get(dim as usize).map(String::as_str)
    }

    #[must_use]
    pub fn idf(&self, dim: u32) -> Option<f32> {
        self.idf.get(dim as usize).copied()
    }

    /// Vectorize a cleaned token sequence: term frequency times idf,
    /// L2-normalized. Out-of-vocabulary tokens contribute nothing, so a
    /// sequence with no known term yields the zero vector.
    #[must_use]
    pub fn vectorize(&self, tokens: &[String]) -> SparseVector {
        let mut counts: HashMap<u32, u32> = HashMap::new();
        for token in tokens {
            if let Some(dim) = self.dim_of(token) {
                *counts.entry(dim).or_insert(0) += 1;
            }
        }
        let weights = counts
            .into_iter()
            .map(|(dim, tf)| (dim, tf as f32 * self.idf[dim as usize]))
            .collect();
        SparseVector::normalized(weights)
    }
}

/// Smoothed inverse document frequency.
///
/// `ln((1 + n) / (1 + df)) + 1` stays finite for every `df` and clamps
/// terms found in every document to weight 1 instead of 0.
#[must_use]
pub fn smoothed_idf(document_count: usize, document_frequency: usize) -> f32 {
    let n = document_count as f64;
    let df = document_frequency as f64;
    (((1.0 + n) / (1.0 + df)).ln() + 1.0) as f32
}

/// Builds a [`VectorSpace`] and the document vectors for a corpus.
#[derive(Debug, Clone)]
pub struct VectorSpaceBuilder {
    vocabulary_size: usize,
}

impl Default for VectorSpaceBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_VOCABULARY_SIZE)
    }
}

impl VectorSpaceBuilder {
    #[must_use]
    pub const fn new(vocabulary_size: usize) -> Self {
        Self { vocabulary_size }
    }

    /// Build the space from cleaned documents.
    ///
    /// The vocabulary is the `vocabulary_size` most frequent terms across
    /// the corpus (ties broken alphabetically). The returned vectors are
    /// aligned with `documents`; a document whose tokens all fall outside
    /// the vocabulary gets the zero vector.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Build`] when the corpus is empty, the
    /// configured vocabulary size is zero, or no term survives.
    pub fn build(&self, documents: &[Document]) -> SearchResult<(VectorSpace, Vec<SparseVector>)> {
        if documents.is_empty() {
            return Err(SearchError::Build("corpus is empty".to_string()));
        }
        if self.vocabulary_size == 0 {
            return Err(SearchError::Build(
                "vocabulary size must be greater than zero".to_string(),
            ));
        }

        // term -> (corpus frequency, document frequency)
        let mut stats: HashMap<&str, (u64, usize)> = HashMap::new();
        for doc in documents {
            let mut seen: HashSet<&str> = HashSet::new();
            for token in doc.tokens() {
                let entry = stats.entry(token.as_str()).or_insert((0, 0));
                entry.0 += 1;
                if seen.insert(token.as_str()) {
                    entry.1 += 1;
                }
            }
        }

        if stats.is_empty() {
            return Err(SearchError::Build(
                "corpus yields an empty vocabulary".to_string(),
            ));
        }

        let mut ranked: Vec<(&str, u64, usize)> = stats
            .into_iter()
            .map(|(term, (freq, df))| (term, freq, df))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.vocabulary_size);
        ranked.sort_by(|a, b| a.0.cmp(b.0));

        let n = documents.len();
        let terms = ranked.iter().map(|(term, _, _)| (*term).to_string()).collect();
        let idf = ranked
            .iter()
            .map(|&(_, _, df)| smoothed_idf(n, df))
            .collect();
        let space = VectorSpace::from_parts(terms, idf);

        let vectors = documents
            .iter()
            .map(|doc| space.vectorize(doc.tokens()))
            .collect();

        log::info!(
            "Built vector space: {} terms from {} documents",
            space.len(),
            n
        );

        Ok((space, vectors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verso_core::model::DocId;

    fn doc(id: &str, tokens: &[&str]) -> Document {
        Document::new(
            DocId::new(id),
            id,
            "artist",
            tokens.join(" "),
            tokens.iter().map(|t| (*t).to_string()).collect(),
        )
    }

    #[test]
    fn test_build_empty_corpus_fails() {
        let err = VectorSpaceBuilder::default().build(&[]).unwrap_err();
        assert!(matches!(err, SearchError::Build(_)));
    }

    #[test]
    fn test_build_without_tokens_fails() {
        let err = VectorSpaceBuilder::default()
            .build(&[doc("a", &[])])
            .unwrap_err();
        assert!(matches!(err, SearchError::Build(_)));
    }

    #[test]
    fn test_vocabulary_is_bounded_by_frequency() {
        let docs = vec![
            doc("a", &["love", "love", "love", "heart"]),
            doc("b", &["love", "rain", "heart"]),
        ];
        let (space, vectors) = VectorSpaceBuilder::new(2).build(&docs).unwrap();
        assert_eq!(space.len(), 2);
        assert!(space.dim_of("love").is_some());
        assert!(space.dim_of("heart").is_some());
        assert!(space.dim_of("rain").is_none());
        assert_eq!(vectors.len(), 2);
    }

    #[test]
    fn test_vocabulary_ties_break_alphabetically() {
        let docs = vec![doc("a", &["zebra", "apple", "mango"])];
        let (space, _) = VectorSpaceBuilder::new(2).build(&docs).unwrap();
        assert_eq!(space.term(0), Some("apple"));
        assert_eq!(space.term(1), Some("mango"));
    }

    #[test]
    fn test_rarer_terms_weigh_more() {
        let docs = vec![
            doc("a", &["love", "rain"]),
            doc("b", &["love", "sun"]),
            doc("c", &["love", "snow"]),
        ];
        let (space, _) = VectorSpaceBuilder::default().build(&docs).unwrap();
        let common = space.idf(space.dim_of("love").unwrap()).unwrap();
        let rare = space.idf(space.dim_of("rain").unwrap()).unwrap();
        assert!(rare > common);
        assert!((common - 1.0).abs() < 1e-6, "term in every document clamps to 1");
    }

    #[test]
    fn test_document_vectors_are_unit_length() {
        let docs = vec![doc("a", &["love", "love", "heart"]), doc("b", &["pain"])];
        let (_, vectors) = VectorSpaceBuilder::default().build(&docs).unwrap();
        for v in &vectors {
            assert!((v.norm() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_out_of_vocabulary_tokens_vanish() {
        let docs = vec![doc("a", &["love", "heart"])];
        let (space, _) = VectorSpaceBuilder::default().build(&docs).unwrap();
        let v = space.vectorize(&["unknown".to_string(), "words".to_string()]);
        assert!(v.is_zero());
        let v = space.vectorize(&["love".to_string(), "unknown".to_string()]);
        assert_eq!(v.nnz(), 1);
    }

    #[test]
    fn test_entries_restore_same_space() {
        let docs = vec![doc("a", &["love", "heart"]), doc("b", &["heart", "pain"])];
        let (space, _) = VectorSpaceBuilder::default().build(&docs).unwrap();
        let restored = VectorSpace::from_entries(space.to_entries()).unwrap();
        assert_eq!(restored, space);
    }

    #[test]
    fn test_entries_with_gap_are_rejected() {
        let entries = vec![
            VocabEntry {
                term: "a".to_string(),
                dim: 0,
                idf: 1.0,
            },
            VocabEntry {
                term: "b".to_string(),
                dim: 2,
                idf: 1.0,
            },
        ];
        assert!(matches!(
            VectorSpace::from_entries(entries),
            Err(SearchError::Build(_))
        ));
    }
}
