//! Sparse unit-length term-weight vectors and their dot products.

use crate::error::{SearchError, SearchResult};

/// A sparse, non-negative term-weight vector.
///
/// Entries are `(dimension, weight)` pairs kept sorted by dimension with
/// strictly positive weights, so two vectors can be compared with a
/// single merge pass. Document and query vectors are unit length; the
/// zero vector (no entries) represents text with no in-vocabulary terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(u32, f32)>,
}

impl SparseVector {
    /// Build an L2-normalized vector from raw weights.
    ///
    /// Weights may arrive in any order; zero and negative weights are
    /// dropped. Returns the zero vector when nothing remains.
    #[must_use]
    pub fn normalized(mut weights: Vec<(u32, f32)>) -> Self {
        weights.retain(|&(_, w)| w > 0.0 && w.is_finite());
        weights.sort_unstable_by_key(|&(dim, _)| dim);
        weights.dedup_by(|next, kept| {
            if next.0 == kept.0 {
                kept.1 += next.1;
                true
            } else {
                false
            }
        });

        let norm = weights.iter().map(|&(_, w)| w * w).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Self::default();
        }
        for entry in &mut weights {
            entry.1 /= norm;
        }
        Self { entries: weights }
    }

    /// Restore a persisted vector, checking every invariant instead of
    /// trusting the stored data.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Build`] if a dimension is out of range,
    /// dimensions are unsorted or repeated, a weight is not positive, or
    /// the vector is not unit length.
    pub fn from_entries(entries: Vec<(u32, f32)>, dimension: usize) -> SearchResult<Self> {
        let mut previous: Option<u32> = None;
        for &(dim, weight) in &entries {
            if dim as usize >= dimension {
                return Err(SearchError::Build(format!(
                    "vector dimension {dim} outside vocabulary of size {dimension}"
                )));
            }
            if previous.is_some_and(|p| p >= dim) {
                return Err(SearchError::Build(
                    "vector entries are not strictly sorted by dimension".to_string(),
                ));
            }
            if !(weight > 0.0 && weight.is_finite()) {
                return Err(SearchError::Build(format!(
                    "vector weight {weight} at dimension {dim} is not positive"
                )));
            }
            previous = Some(dim);
        }

        let vector = Self { entries };
        if !vector.is_zero() && (vector.norm() - 1.0).abs() > 1e-3 {
            return Err(SearchError::Build(format!(
                "stored vector has norm {} instead of 1",
                vector.norm()
            )));
        }
        Ok(vector)
    }

    #[must_use]
    pub fn entries(&self) -> &[(u32, f32)] {
        &self.entries
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<(u32, f32)> {
        self.entries
    }

    /// Number of non-zero dimensions.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn norm(&self) -> f32 {
        self.entries.iter().map(|&(_, w)| w * w).sum::<f32>().sqrt()
    }

    /// Dot product; for unit vectors this is the cosine similarity.
    ///
    /// Products are summed in ascending dimension order for both operands,
    /// so `a.dot(&b)` and `b.dot(&a)` are bit-identical.
    #[must_use]
    pub fn dot(&self, other: &Self) -> f32 {
        let mut sum = 0.0;
        self.for_each_shared(other, |_, a, b| sum += a * b);
        sum
    }

    /// Dimensions present in both vectors with the product of their
    /// weights, largest contribution first.
    #[must_use]
    pub fn shared(&self, other: &Self) -> Vec<(u32, f32)> {
        let mut shared = Vec::new();
        self.for_each_shared(other, |dim, a, b| shared.push((dim, a * b)));
        shared.sort_by(|x, y| y.1.total_cmp(&x.1).then(x.0.cmp(&y.0)));
        shared
    }

    fn for_each_shared(&self, other: &Self, mut f: impl FnMut(u32, f32, f32)) {
        let (mut i, mut j) = (0, 0);
        while i < self.entries.len() && j < other.entries.len() {
            let (da, wa) = self.entries[i];
            let (db, wb) = other.entries[j];
            match da.cmp(&db) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    f(da, wa, wb);
                    i += 1;
                    j += 1;
                }
            }
        }
    }
}
