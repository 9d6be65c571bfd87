//! Exact nearest-neighbour vector index.
//!
//! [`FlatL2Index`] stores fixed-width `f32` vectors contiguously and answers
//! top-k queries by brute-force squared-L2 distance. Positions in the index
//! are positions in the chunk store the vectors were built from.
//!
//! # File format
//!
//! ```text
//! magic       8 bytes   "CQAIDX01"
//! dims        u32 LE
//! count       u64 LE
//! built_at    i64 LE    unix seconds, 0 if unknown
//! fingerprint 64 bytes  hex SHA-256 of the chunk texts, zero-filled if unset
//! vectors     count × dims × f32 LE
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::models::ChunkRecord;

const MAGIC: &[u8; 8] = b"CQAIDX01";
const FINGERPRINT_LEN: usize = 64;
const HEADER_LEN: usize = 8 + 4 + 8 + 8 + FINGERPRINT_LEN;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a vector index file (bad magic)")]
    BadMagic,
    #[error("index file truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("corrupt index header: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dims: usize,
    data: Vec<f32>,
    fingerprint: Option<String>,
    built_at: Option<DateTime<Utc>>,
}

/// One search hit: chunk-store position and squared L2 distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

impl FlatL2Index {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            data: Vec::new(),
            fingerprint: None,
            built_at: None,
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    /// Append vectors; all must have the index's dimension.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                actual: bad.len(),
            });
        }
        self.data.reserve(vectors.len() * self.dims);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    /// Record which chunk store the index was built from and when.
    pub fn seal(&mut self, fingerprint: String) {
        self.fingerprint = Some(fingerprint);
        self.built_at = Some(Utc::now());
    }

    /// Up to `k` nearest vectors, nearest first; equal distances keep position order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(position, v)| Neighbor {
                position,
                distance: squared_l2(query, v),
            })
            .collect();

        let order = |a: &Neighbor, b: &Neighbor| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        };
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, order);
            scored.truncate(k);
        }
        scored.sort_by(order);
        Ok(scored)
    }

    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&(self.dims as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        let built_at = self.built_at.map(|t| t.timestamp()).unwrap_or(0);
        bytes.extend_from_slice(&built_at.to_le_bytes());
        let mut fp = [0u8; FINGERPRINT_LEN];
        if let Some(f) = &self.fingerprint {
            let src = f.as_bytes();
            let n = src.len().min(FINGERPRINT_LEN);
            fp[..n].copy_from_slice(&src[..n]);
        }
        bytes.extend_from_slice(&fp);
        bytes.extend_from_slice(&vec_to_blob(&self.data));

        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
            return Err(IndexError::BadMagic);
        }
        if bytes.len() < HEADER_LEN {
            return Err(IndexError::Truncated {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let dims = u32::from_le_bytes(slice_array(&bytes[8..12])) as usize;
        let count = u64::from_le_bytes(slice_array(&bytes[12..20])) as usize;
        let built_at = i64::from_le_bytes(slice_array(&bytes[20..28]));
        let fp_raw = &bytes[28..HEADER_LEN];

        if dims == 0 && count > 0 {
            return Err(IndexError::Corrupt("zero dimensions with stored vectors".into()));
        }
        let expected = count
            .checked_mul(dims)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(HEADER_LEN))
            .ok_or_else(|| IndexError::Corrupt("vector count overflows".into()))?;
        if bytes.len() != expected {
            return Err(IndexError::Truncated {
                expected,
                actual: bytes.len(),
            });
        }

        let fp_len = fp_raw.iter().position(|b| *b == 0).unwrap_or(FINGERPRINT_LEN);
        let fingerprint = std::str::from_utf8(&fp_raw[..fp_len])
            .map_err(|_| IndexError::Corrupt("fingerprint is not UTF-8".into()))?;

        Ok(Self {
            dims,
            data: blob_to_vec(&bytes[HEADER_LEN..]),
            fingerprint: (!fingerprint.is_empty()).then(|| fingerprint.to_string()),
            built_at: (built_at != 0)
                .then(|| DateTime::from_timestamp(built_at, 0))
                .flatten(),
        })
    }
}

fn slice_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// Squared Euclidean distance; callers guarantee equal lengths.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Map a squared-L2 distance into `(0, 1]`: 0 → 1.0, larger → closer to 0.
pub fn distance_to_relevance(distance: f32) -> f64 {
    let d = if distance.is_nan() { f64::INFINITY } else { distance.max(0.0) as f64 };
    1.0 / (1.0 + d)
}

/// SHA-256 over the chunk texts, in store order.
pub fn fingerprint(records: &[ChunkRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.text.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Encode floats as little-endian bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian bytes back into floats.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
