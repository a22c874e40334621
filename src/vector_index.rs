//! Flat on-disk vector index for one domain.
//!
//! An index directory holds two artifacts, both required:
//!
//! | File | Content |
//! |------|---------|
//! | `index.vec` | header (`ISXV`, version, dims, count) followed by unit-length `f32` LE vectors |
//! | `index.json` | model name, dims, build time, and the chunk texts with their source paths |
//!
//! Search is an exact brute-force cosine scan.
//!
//! Writes never expose a half-written index: both files go to a sibling
//! temporary directory that replaces the target only once complete. The
//! replacement is two renames (old index aside, new one in), so a reader
//! racing a rebuild of an existing domain may briefly find no index at
//! all. The registry reports that as not found and does not cache it, so
//! the next request loads the new index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::embedding::{blob_to_vec, normalize, vec_to_blob};
use crate::error::IndexError;
use crate::models::DocumentChunk;

pub const VECTORS_FILE: &str = "index.vec";
pub const META_FILE: &str = "index.json";

const MAGIC: &[u8; 4] = b"ISXV";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub format_version: u32,
    pub model: String,
    pub dims: usize,
    pub built_at: DateTime<Utc>,
    pub chunks: Vec<DocumentChunk>,
}

/// A retrieved chunk and its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    meta: IndexMeta,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Pair chunks with their vectors. Vectors are normalized on the way in.
    pub fn new(
        model: &str,
        dims: usize,
        chunks: Vec<DocumentChunk>,
        mut vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::VectorCountMismatch {
                expected: chunks.len(),
                actual: vectors.len(),
            });
        }
        for v in vectors.iter_mut() {
            if v.len() != dims {
                return Err(IndexError::DimensionMismatch {
                    expected: dims,
                    actual: v.len(),
                });
            }
            normalize(v);
        }

        Ok(Self {
            meta: IndexMeta {
                format_version: FORMAT_VERSION,
                model: model.to_string(),
                dims,
                built_at: Utc::now(),
                chunks,
            },
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.meta.dims
    }

    pub fn model(&self) -> &str {
        &self.meta.model
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.meta.chunks
    }

    /// The `k` chunks most similar to `query`, best first.
    ///
    /// Equal scores keep corpus order. Returns fewer than `k` results when
    /// the index is smaller than `k`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if query.len() != self.meta.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.meta.dims,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, dot(&query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.meta.chunks[i].clone(),
                score,
            })
            .collect())
    }

    /// True when both artifacts exist under `dir`.
    pub fn exists(dir: &Path) -> bool {
        dir.join(VECTORS_FILE).is_file() && dir.join(META_FILE).is_file()
    }

    /// Replace whatever index lives at `dir` with this one.
    ///
    /// `dir` is absent between the two renames. If the second rename fails
    /// the previous index is moved back.
    pub fn save_atomic(&self, dir: &Path) -> Result<(), IndexError> {
        let parent = dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent).map_err(|e| IndexError::io(&parent, e))?;

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "index".to_string());
        let tmp = parent.join(format!(".{}.tmp-{}", name, uuid::Uuid::new_v4()));

        if let Err(e) = self.write_files(&tmp) {
            let _ = std::fs::remove_dir_all(&tmp);
            return Err(e);
        }

        if dir.exists() {
            let old = parent.join(format!(".{}.old-{}", name, uuid::Uuid::new_v4()));
            std::fs::rename(dir, &old).map_err(|e| {
                let _ = std::fs::remove_dir_all(&tmp);
                IndexError::io(dir, e)
            })?;
            if let Err(e) = std::fs::rename(&tmp, dir) {
                // Put the previous index back before reporting.
                let _ = std::fs::rename(&old, dir);
                let _ = std::fs::remove_dir_all(&tmp);
                return Err(IndexError::io(dir, e));
            }
            if let Err(e) = std::fs::remove_dir_all(&old) {
                tracing::warn!(path = %old.display(), error = %e, "failed to remove previous index");
            }
        } else {
            std::fs::rename(&tmp, dir).map_err(|e| {
                let _ = std::fs::remove_dir_all(&tmp);
                IndexError::io(dir, e)
            })?;
        }

        Ok(())
    }

    fn write_files(&self, dir: &Path) -> Result<(), IndexError> {
        std::fs::create_dir_all(dir).map_err(|e| IndexError::io(dir, e))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + self.len() * self.dims() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dims() as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for v in &self.vectors {
            bytes.extend_from_slice(&vec_to_blob(v));
        }
        let vec_path = dir.join(VECTORS_FILE);
        std::fs::write(&vec_path, bytes).map_err(|e| IndexError::io(&vec_path, e))?;

        let meta_path = dir.join(META_FILE);
        let json = serde_json::to_vec(&self.meta)?;
        std::fs::write(&meta_path, json).map_err(|e| IndexError::io(&meta_path, e))?;
        Ok(())
    }

    /// Read an index written by [`save_atomic`](Self::save_atomic).
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let meta_path = dir.join(META_FILE);
        let meta_bytes = std::fs::read(&meta_path).map_err(|e| IndexError::io(&meta_path, e))?;
        let meta: IndexMeta = serde_json::from_slice(&meta_bytes).map_err(|e| {
            IndexError::InvalidArtifact {
                path: meta_path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let vec_path = dir.join(VECTORS_FILE);
        let bytes = std::fs::read(&vec_path).map_err(|e| IndexError::io(&vec_path, e))?;
        let invalid = |reason: String| IndexError::InvalidArtifact {
            path: vec_path.display().to_string(),
            reason,
        };

        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(invalid("missing header".to_string()));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(invalid(format!("unsupported format version {}", version)));
        }
        let dims = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[12..20]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        if dims != meta.dims {
            return Err(invalid(format!(
                "dimension {} disagrees with {} ({})",
                dims, META_FILE, meta.dims
            )));
        }
        if count != meta.chunks.len() {
            return Err(invalid(format!(
                "{} vectors for {} chunks",
                count,
                meta.chunks.len()
            )));
        }
        let body = &bytes[HEADER_LEN..];
        if dims == 0 || body.len() != count * dims * 4 {
            return Err(invalid(format!(
                "expected {} bytes of vector data, found {}",
                count * dims * 4,
                body.len()
            )));
        }

        let vectors = body.chunks_exact(dims * 4).map(blob_to_vec).collect();
        Ok(Self { meta, vectors })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(text: &str) -> DocumentChunk {
        DocumentChunk {
            text: text.to_string(),
            source_path: "src.txt".to_string(),
        }
    }

    fn sample() -> VectorIndex {
        VectorIndex::new(
            "test-model",
            2,
            vec![chunk("east"), chunk("north"), chunk("north-east")],
            vec![vec![1.0, 0.0], vec![0.0, 2.0], vec![1.0, 1.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = sample();
        let hits = index.search(&[0.0, 1.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "north");
        assert_eq!(hits[1].chunk.text, "north-east");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let hits = sample().search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_search_rejects_wrong_dimension() {
        assert!(sample().search(&[1.0, 0.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_new_rejects_count_and_dim_mismatch() {
        let err = VectorIndex::new("m", 2, vec![chunk("a")], vec![]).unwrap_err();
        assert!(matches!(err, IndexError::VectorCountMismatch { .. }));
        let err = VectorIndex::new("m", 2, vec![chunk("a")], vec![vec![1.0]]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_save_load_preserves_search() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("law");
        let index = sample();
        index.save_atomic(&dir).unwrap();
        assert!(VectorIndex::exists(&dir));

        let loaded = VectorIndex::load(&dir).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.model(), "test-model");
        let a = index.search(&[0.3, 0.7], 3).unwrap();
        let b = loaded.search(&[0.3, 0.7], 3).unwrap();
        let texts = |h: &[ScoredChunk]| h.iter().map(|s| s.chunk.text.clone()).collect::<Vec<_>>();
        assert_eq!(texts(&a), texts(&b));
    }

    #[test]
    fn test_save_replaces_existing_and_leaves_no_temp_dirs() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("health");
        sample().save_atomic(&dir).unwrap();
        let smaller =
            VectorIndex::new("m2", 2, vec![chunk("only")], vec![vec![1.0, 0.0]]).unwrap();
        smaller.save_atomic(&dir).unwrap();

        let loaded = VectorIndex::load(&dir).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.model(), "m2");
        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_load_detects_truncated_vectors() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("finance");
        sample().save_atomic(&dir).unwrap();
        let path = dir.join(VECTORS_FILE);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        let err = VectorIndex::load(&dir).unwrap_err();
        assert!(matches!(err, IndexError::InvalidArtifact { .. }));
    }

    #[test]
    fn test_exists_requires_both_files() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("education");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(META_FILE), "{}").unwrap();
        assert!(!VectorIndex::exists(&dir));
    }
}
