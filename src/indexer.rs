//! Offline index build pipeline.
//!
//! load → chunk → dedup → embed → persist. Runs once per domain; the
//! result is picked up by [`IndexRegistry`](crate::registry::IndexRegistry)
//! on its next cache miss.

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::chunk::{chunk_hash, split_document};
use crate::config::Config;
use crate::domain::DomainMap;
use crate::embedding::Embedder;
use crate::error::IndexError;
use crate::loader::{discover_sources, load_document};
use crate::models::{DocumentChunk, SourceDocument};
use crate::vector_index::VectorIndex;

/// Chunking and batching parameters for one build.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub batch_size: usize,
}

impl BuildOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_chars: config.chunking.max_chars,
            overlap_chars: config.chunking.overlap_chars,
            batch_size: config.embedding.batch_size,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub location: PathBuf,
    pub documents: usize,
    pub chunks: usize,
    pub duplicate_chunks: usize,
    pub model: String,
    pub dims: usize,
}

/// Outcome of [`index_domain`]: what was read and what was written.
#[derive(Debug, Clone, Serialize)]
pub struct DomainIndexReport {
    pub domain: String,
    pub files_loaded: usize,
    pub files_failed: usize,
    pub duplicate_files: usize,
    pub index: IndexReport,
}

/// Build and persist a vector index over `documents` at `location`.
///
/// Nothing is written unless every step succeeds; a previous index at
/// `location` survives any failure untouched.
pub async fn build_index(
    documents: &[SourceDocument],
    embedder: &dyn Embedder,
    location: &Path,
    options: &BuildOptions,
) -> Result<IndexReport, IndexError> {
    let mut chunks: Vec<DocumentChunk> = Vec::new();
    let mut seen = HashSet::new();
    let mut duplicate_chunks = 0usize;

    for doc in documents {
        for chunk in split_document(doc, options.max_chars, options.overlap_chars)? {
            if seen.insert(chunk_hash(&chunk.text)) {
                chunks.push(chunk);
            } else {
                duplicate_chunks += 1;
            }
        }
    }

    if chunks.is_empty() {
        return Err(IndexError::EmptyCorpus {
            location: location.display().to_string(),
        });
    }

    tracing::info!(
        location = %location.display(),
        documents = documents.len(),
        chunks = chunks.len(),
        duplicate_chunks,
        model = embedder.model_name(),
        "embedding chunks"
    );

    let batch_size = options.batch_size.max(1);
    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder.embed(&texts).await.map_err(IndexError::Embedding)?;
        if embedded.len() != texts.len() {
            return Err(IndexError::VectorCountMismatch {
                expected: texts.len(),
                actual: embedded.len(),
            });
        }
        vectors.extend(embedded);
        tracing::debug!(done = vectors.len(), total = chunks.len(), "embedded batch");
    }

    let chunk_count = chunks.len();
    let index = VectorIndex::new(embedder.model_name(), embedder.dims(), chunks, vectors)?;
    index.save_atomic(location)?;

    Ok(IndexReport {
        location: location.to_path_buf(),
        documents: documents.len(),
        chunks: chunk_count,
        duplicate_chunks,
        model: embedder.model_name().to_string(),
        dims: embedder.dims(),
    })
}

/// Discover, load and index every source file configured for `domain`.
///
/// Unreadable files are logged and skipped. `domain` must be configured
/// by name; there is no fallback when building.
pub async fn index_domain(
    config: &Config,
    domain: &str,
    embedder: &dyn Embedder,
) -> Result<DomainIndexReport> {
    let domain_map = DomainMap::from_config(config);
    let Some(location) = domain_map.location(domain).map(Path::to_path_buf) else {
        bail!(
            "Unknown domain: '{}'. Configured: {}",
            domain,
            domain_map.names().collect::<Vec<_>>().join(", ")
        );
    };
    let domain_cfg = config
        .domains
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(domain.trim()))
        .map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow::anyhow!("Unknown domain: '{}'", domain))?;

    let discovery = discover_sources(domain_cfg)?;
    let mut documents = Vec::new();
    let mut files_loaded = 0usize;
    let mut files_failed = 0usize;

    for path in &discovery.files {
        match load_document(path) {
            Ok(docs) => {
                files_loaded += 1;
                documents.extend(docs);
            }
            Err(e) => {
                files_failed += 1;
                tracing::warn!(path = %e.path, reason = %e.reason, "skipping unreadable document");
            }
        }
    }

    tracing::info!(
        domain,
        files = discovery.files.len(),
        files_failed,
        duplicates = discovery.duplicates.len(),
        "loaded sources"
    );

    let index = build_index(
        &documents,
        embedder,
        &location,
        &BuildOptions::from_config(config),
    )
    .await?;

    Ok(DomainIndexReport {
        domain: domain.trim().to_lowercase(),
        files_loaded,
        files_failed,
        duplicate_files: discovery.duplicates.len(),
        index,
    })
}
