//! Vector index backends
//!
//! An index stores the embeddings of one session in insertion order and
//! answers k-nearest-neighbor queries by inner product. Positions returned by
//! a search are insertion positions, which the session layer maps back to
//! document records.
//!
//! # Usage
//!
//! ```ignore
//! use ragchat_lib::index::{FlatIndex, VectorIndex};
//!
//! let mut index = FlatIndex::new(384)?;
//! index.add(&embeddings)?;
//!
//! let hits = index.search(&query_embedding, 4)?;
//! index.save(&path)?;
//! ```

use std::cmp::Ordering;

use crate::embed::Embedding;
use crate::Result;

/// A search hit with similarity score
#[derive(Debug, Clone, Copy)]
pub struct SearchHit {
    /// Insertion position of the matched vector
    pub position: usize,
    /// Similarity score (higher is more similar)
    /// For normalized vectors: -1.0 to 1.0
    pub score: f32,
}

/// Hits order by score, then by *lower* position, so the greatest hit is the
/// best match and earlier insertions win ties.
impl Ord for SearchHit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.position.cmp(&self.position))
    }
}

impl PartialOrd for SearchHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SearchHit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchHit {}

/// Trait for vector index backends
///
/// Nothing here assumes exhaustive search, so a partitioned or approximate
/// structure can implement it as well.
pub trait VectorIndex: Send + Sync {
    /// Vector length accepted by this index
    fn dimension(&self) -> usize;

    /// Append embeddings in input order
    ///
    /// Fails without modifying the index if any embedding has the wrong
    /// dimension.
    fn add(&mut self, embeddings: &[Embedding]) -> Result<()>;

    /// Search for the vectors most similar to `query`
    ///
    /// # Returns
    /// Up to `k` hits sorted by similarity (highest first), ties broken by
    /// insertion position. An empty index yields no hits.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Get total number of stored vectors
    fn len(&self) -> usize;

    /// Check if index is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

mod flat;

pub use flat::*;
