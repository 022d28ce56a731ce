use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::Write;
use std::path::Path;

use crate::embed::Embedding;
use crate::index::{SearchHit, VectorIndex};
use crate::persist::StagedWrite;
use crate::{Error, Result};

const MAGIC: &[u8; 8] = b"RAGFLAT1";
const HEADER_LEN: usize = MAGIC.len() + 4 + 8;

/// Flat (brute-force) inner-product index.
///
/// Vectors live in one contiguous buffer. Insertion is amortized O(d) per
/// vector and a query scores every vector, O(n·d + n·log k). That is fine for
/// session-sized corpora of up to a few thousand documents.
///
/// # File format
///
/// `RAGFLAT1`, dimension as `u32` LE, count as `u64` LE, then
/// `count * dimension` `f32` LE values in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create a new empty index for `dimension`-length vectors.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 || u32::try_from(dimension).is_err() {
            return Err(Error::InvalidInput(format!(
                "unsupported index dimension {dimension}"
            )));
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    #[cfg(test)]
    fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start.checked_add(self.dimension)?)
    }

    /// Drop every vector from `len` onwards.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.data.truncate(len.saturating_mul(self.dimension));
    }

    /// Serialize the index to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.stage(path)?.commit()
    }

    /// Serialize the index to a temp file beside `path` without replacing it.
    pub fn stage(&self, path: &Path) -> Result<StagedWrite> {
        StagedWrite::new(path, |w| self.write_to(w))
    }

    /// Read an index written by [`save`](Self::save).
    ///
    /// A missing file is [`Error::IndexNotFound`]; a malformed one is
    /// [`Error::Persistence`].
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::IndexNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(Error::persistence(path, e)),
        };
        Self::decode(&bytes).map_err(|reason| Error::persistence(path, reason))
    }

    fn write_to(&self, w: &mut dyn Write) -> std::io::Result<()> {
        w.write_all(MAGIC)?;
        w.write_all(&(self.dimension as u32).to_le_bytes())?;
        w.write_all(&(self.len() as u64).to_le_bytes())?;
        for value in &self.data {
            w.write_all(&value.to_le_bytes())?;
        }
        Ok(())
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err("not a flat index file".to_string());
        }
        let mut dim = [0u8; 4];
        dim.copy_from_slice(&bytes[8..12]);
        let mut count = [0u8; 8];
        count.copy_from_slice(&bytes[12..20]);

        let dimension = u32::from_le_bytes(dim) as usize;
        let count = u64::from_le_bytes(count);
        if dimension == 0 {
            return Err("index dimension is zero".to_string());
        }

        let body = &bytes[HEADER_LEN..];
        let expected = usize::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(dimension))
            .and_then(|n| n.checked_mul(4));
        if expected != Some(body.len()) {
            return Err(format!(
                "expected {count} vectors of dimension {dimension}, found {} data bytes",
                body.len()
            ));
        }

        let data = body
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { dimension, data })
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn add(&mut self, embeddings: &[Embedding]) -> Result<()> {
        for embedding in embeddings {
            self.check_dimension(embedding.len())?;
        }
        self.data.reserve(embeddings.len() * self.dimension);
        for embedding in embeddings {
            self.data.extend_from_slice(embedding);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.check_dimension(query.len())?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        // min-heap of the best k seen so far
        let mut best = BinaryHeap::with_capacity(k.min(self.len()) + 1);
        for (position, vector) in self.data.chunks_exact(self.dimension).enumerate() {
            best.push(Reverse(SearchHit {
                position,
                score: inner_product(query, vector),
            }));
            if best.len() > k {
                best.pop();
            }
        }

        Ok(best.into_sorted_vec().into_iter().map(|Reverse(hit)| hit).collect())
    }

    fn len(&self) -> usize {
        self.data.len() / self.dimension
    }
}

/// Inner product of two vectors; equals cosine similarity when both are
/// unit-normalized.
fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");

    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
