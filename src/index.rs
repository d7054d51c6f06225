//! Persisted exact nearest-neighbour index.
//!
//! An index directory holds three files:
//!
//! | File | Contents |
//! |------|----------|
//! | `vectors.bin` | `count × dims` little-endian `f32` |
//! | `docstore.json` | the chunks, in vector order |
//! | `manifest.json` | [`Manifest`]: version, model, shape, SHA-256 digests |
//!
//! [`VectorIndex::load`] verifies the manifest against both data files
//! before returning anything, and only ever parses JSON and raw floats.
//! [`VectorIndex::save`] writes a sibling temp directory and renames it
//! into place, so the previous index is replaced as a whole.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, SearchHit};

pub const FORMAT_VERSION: u32 = 1;

const VECTORS_FILE: &str = "vectors.bin";
const DOCSTORE_FILE: &str = "docstore.json";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("no index found at {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to access index at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("index at {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("index at {} failed its integrity check: {file} does not match the manifest digest", path.display())]
    Integrity { path: PathBuf, file: &'static str },
    #[error("index at {} has format version {found}, expected {expected}", path.display())]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    #[error("embedding dimension mismatch: index has {index} dimensions, query embedding has {query}")]
    DimensionMismatch { index: usize, query: usize },
    #[error("embedding model mismatch: index was built with {index:?}, query embedder is {query:?}")]
    ModelMismatch { index: String, query: String },
    #[error("cannot build index: {0}")]
    InvalidBuild(String),
}

impl IndexError {
    /// True for errors meaning "there is no usable index here", as opposed
    /// to an index that exists but cannot serve this query.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            IndexError::NotFound(_)
                | IndexError::Io { .. }
                | IndexError::Corrupt { .. }
                | IndexError::Integrity { .. }
                | IndexError::UnsupportedVersion { .. }
        )
    }
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub embedding_model: String,
    pub dims: usize,
    pub count: usize,
    pub created_at: DateTime<Utc>,
    pub vectors_sha256: String,
    pub docstore_sha256: String,
}

/// In-memory index: chunks plus one row-major vector per chunk.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    embedding_model: String,
    dims: usize,
    chunks: Vec<Chunk>,
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// Pair each chunk with its embedding. All vectors must share one
    /// non-zero length.
    pub fn build(
        embedding_model: &str,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::InvalidBuild("no chunks to index".to_string()));
        }
        if chunks.len() != vectors.len() {
            return Err(IndexError::InvalidBuild(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let dims = vectors[0].len();
        if dims == 0 {
            return Err(IndexError::InvalidBuild("embeddings are empty".to_string()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(IndexError::InvalidBuild(format!(
                "inconsistent embedding dimensions: {} and {}",
                dims,
                bad.len()
            )));
        }

        Ok(Self {
            embedding_model: embedding_model.to_string(),
            dims,
            chunks,
            vectors: vectors.into_iter().flatten().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// The model that produced the stored vectors.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    fn vector(&self, i: usize) -> &[f32] {
        &self.vectors[i * self.dims..(i + 1) * self.dims]
    }

    /// The `k` chunks most similar to `query` by cosine similarity, best
    /// first. Ties keep insertion order. A non-finite score (from a NaN or
    /// infinite component) ranks last as `f32::NEG_INFINITY`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                index: self.dims,
                query: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|i| {
                let score = cosine_similarity(query, self.vector(i));
                (i, if score.is_finite() { score } else { f32::NEG_INFINITY })
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| SearchHit {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect())
    }

    /// Write the index to `dir`, replacing whatever was there.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        let io = |source| IndexError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let parent = match dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        std::fs::create_dir_all(&parent).map_err(io)?;

        let tmp = parent.join(format!(".{}.tmp-{}", name, uuid::Uuid::new_v4()));
        if let Err(e) = self.write_files(&tmp) {
            let _ = std::fs::remove_dir_all(&tmp);
            return Err(e);
        }

        let replace = || -> std::io::Result<()> {
            if dir.is_dir() {
                std::fs::remove_dir_all(dir)?;
            } else if dir.exists() {
                std::fs::remove_file(dir)?;
            }
            std::fs::rename(&tmp, dir)
        };
        if let Err(e) = replace() {
            let _ = std::fs::remove_dir_all(&tmp);
            return Err(io(e));
        }

        tracing::debug!(dir = %dir.display(), count = self.len(), dims = self.dims, "saved index");
        Ok(())
    }

    fn write_files(&self, dir: &Path) -> Result<(), IndexError> {
        let io = |source| IndexError::Io {
            path: dir.to_path_buf(),
            source,
        };
        std::fs::create_dir(dir).map_err(io)?;

        let vectors = vec_to_blob(&self.vectors);
        let docstore = serde_json::to_vec_pretty(&self.chunks).map_err(|e| IndexError::Corrupt {
            path: dir.to_path_buf(),
            reason: format!("cannot serialize docstore: {}", e),
        })?;
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            embedding_model: self.embedding_model.clone(),
            dims: self.dims,
            count: self.len(),
            created_at: Utc::now(),
            vectors_sha256: sha256_hex(&vectors),
            docstore_sha256: sha256_hex(&docstore),
        };
        let manifest = serde_json::to_vec_pretty(&manifest).map_err(|e| IndexError::Corrupt {
            path: dir.to_path_buf(),
            reason: format!("cannot serialize manifest: {}", e),
        })?;

        std::fs::write(dir.join(VECTORS_FILE), vectors).map_err(io)?;
        std::fs::write(dir.join(DOCSTORE_FILE), docstore).map_err(io)?;
        // Manifest last: a directory without one is never mistaken for an index.
        std::fs::write(dir.join(MANIFEST_FILE), manifest).map_err(io)?;
        Ok(())
    }

    /// Read the manifest without loading vectors or chunks.
    pub fn read_manifest(dir: &Path) -> Result<Manifest, IndexError> {
        if !dir.is_dir() {
            return Err(IndexError::NotFound(dir.to_path_buf()));
        }
        let bytes = read_part(dir, MANIFEST_FILE)?;
        let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|e| IndexError::Corrupt {
            path: dir.to_path_buf(),
            reason: format!("invalid manifest: {}", e),
        })?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion {
                path: dir.to_path_buf(),
                found: manifest.format_version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(manifest)
    }

    /// Load and verify an index written by [`save`](Self::save).
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let manifest = Self::read_manifest(dir)?;
        let corrupt = |reason: String| IndexError::Corrupt {
            path: dir.to_path_buf(),
            reason,
        };

        let vectors = read_part(dir, VECTORS_FILE)?;
        if sha256_hex(&vectors) != manifest.vectors_sha256 {
            return Err(IndexError::Integrity {
                path: dir.to_path_buf(),
                file: VECTORS_FILE,
            });
        }
        let docstore = read_part(dir, DOCSTORE_FILE)?;
        if sha256_hex(&docstore) != manifest.docstore_sha256 {
            return Err(IndexError::Integrity {
                path: dir.to_path_buf(),
                file: DOCSTORE_FILE,
            });
        }

        if manifest.dims == 0 || manifest.count == 0 {
            return Err(corrupt(format!(
                "manifest declares an empty index ({} × {})",
                manifest.count, manifest.dims
            )));
        }
        let expected_bytes = manifest
            .count
            .checked_mul(manifest.dims)
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
            .ok_or_else(|| {
                corrupt(format!(
                    "manifest shape {} × {} overflows",
                    manifest.count, manifest.dims
                ))
            })?;
        if vectors.len() != expected_bytes {
            return Err(corrupt(format!(
                "{} is {} bytes, expected {}",
                VECTORS_FILE,
                vectors.len(),
                expected_bytes
            )));
        }
        let chunks: Vec<Chunk> = serde_json::from_slice(&docstore)
            .map_err(|e| corrupt(format!("invalid {}: {}", DOCSTORE_FILE, e)))?;
        if chunks.len() != manifest.count {
            return Err(corrupt(format!(
                "{} holds {} chunks, manifest says {}",
                DOCSTORE_FILE,
                chunks.len(),
                manifest.count
            )));
        }

        tracing::debug!(dir = %dir.display(), count = manifest.count, dims = manifest.dims, "loaded index");
        Ok(Self {
            embedding_model: manifest.embedding_model,
            dims: manifest.dims,
            chunks,
            vectors: blob_to_vec(&vectors),
        })
    }
}

fn read_part(dir: &Path, file: &str) -> Result<Vec<u8>, IndexError> {
    std::fs::read(dir.join(file)).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => IndexError::Corrupt {
            path: dir.to_path_buf(),
            reason: format!("missing {}", file),
        },
        _ => IndexError::Io {
            path: dir.to_path_buf(),
            source: e,
        },
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
