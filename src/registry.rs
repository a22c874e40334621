//! Index Registry: domain → loaded index, read-through cache.
//!
//! The registry is an explicit object owned by whoever serves requests
//! (the HTTP server, a CLI command, a test). Entries live for the lifetime
//! of the registry; there is no eviction. [`IndexRegistry::invalidate`]
//! drops an entry so the next [`get`](IndexRegistry::get) reloads it from
//! disk, e.g. after `isx index` rebuilt the domain.
//!
//! Concurrent first loads of the same domain may both read the artifacts;
//! the first insert wins and every caller afterwards sees that instance.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::DomainMap;
use crate::embedding::{embed_query, Embedder};
use crate::error::{IndexError, RegistryError};
use crate::vector_index::{ScoredChunk, VectorIndex};

/// A loaded domain index paired with the embedder that queries it.
pub struct DomainIndex {
    domain: String,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
}

impl DomainIndex {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn model(&self) -> &str {
        self.index.model()
    }

    /// Up to `k` chunk texts, most similar first.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .search_scored(query, k)
            .await?
            .into_iter()
            .map(|hit| hit.chunk.text)
            .collect())
    }

    /// Like [`similarity_search`](Self::similarity_search), keeping scores and source paths.
    pub async fn search_scored(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let vector = embed_query(self.embedder.as_ref(), query).await?;
        Ok(self.index.search(&vector, k)?)
    }
}

pub struct IndexRegistry {
    domains: DomainMap,
    embedder: Arc<dyn Embedder>,
    cache: RwLock<HashMap<String, Arc<DomainIndex>>>,
}

impl IndexRegistry {
    pub fn new(domains: DomainMap, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            domains,
            embedder,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn domains(&self) -> &DomainMap {
        &self.domains
    }

    /// The loaded index for `domain`, loading and caching it on first use.
    ///
    /// Unknown domains resolve to the default domain and share its entry.
    /// A missing or unreadable index is reported and never cached, so a
    /// later call retries the load.
    pub async fn get(&self, domain: &str) -> Result<Arc<DomainIndex>, RegistryError> {
        let resolved = self.domains.resolve(domain);
        if resolved.fell_back {
            tracing::debug!(requested = domain, serving = %resolved.name, "unknown domain, using default");
        }

        if let Some(hit) = self.cached(&resolved.name) {
            return Ok(hit);
        }

        let location = resolved.location.clone();
        if !VectorIndex::exists(&location) {
            tracing::warn!(domain = %resolved.name, location = %location.display(), "index not found");
            return Err(RegistryError::NotFound {
                domain: resolved.name,
                location: location.display().to_string(),
            });
        }

        let corrupt = |source: IndexError| RegistryError::Corrupt {
            domain: resolved.name.clone(),
            location: location.display().to_string(),
            source,
        };

        let load_dir = location.clone();
        let index = tokio::task::spawn_blocking(move || VectorIndex::load(&load_dir))
            .await
            .map_err(|e| corrupt(IndexError::io(&location, std::io::Error::other(e.to_string()))))?
            .map_err(&corrupt)?;

        if index.dims() != self.embedder.dims() {
            return Err(corrupt(IndexError::DimensionMismatch {
                expected: self.embedder.dims(),
                actual: index.dims(),
            }));
        }
        if index.model() != self.embedder.model_name() {
            tracing::warn!(
                domain = %resolved.name,
                index_model = index.model(),
                query_model = self.embedder.model_name(),
                "index was built with a different embedding model"
            );
        }

        tracing::info!(domain = %resolved.name, chunks = index.len(), "loaded index");

        let loaded = Arc::new(DomainIndex {
            domain: resolved.name.clone(),
            index,
            embedder: Arc::clone(&self.embedder),
        });

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        let entry = cache.entry(resolved.name).or_insert(loaded);
        Ok(Arc::clone(entry))
    }

    /// Drop the cached entry for `domain` (after fallback). Returns whether one existed.
    pub fn invalidate(&self, domain: &str) -> bool {
        let resolved = self.domains.resolve(domain);
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.remove(&resolved.name).is_some()
    }

    pub fn invalidate_all(&self) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.clear();
    }

    /// Names of the domains currently cached, sorted.
    pub fn cached_domains(&self) -> Vec<String> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = cache.keys().cloned().collect();
        names.sort();
        names
    }

    fn cached(&self, name: &str) -> Option<Arc<DomainIndex>> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.get(name).cloned()
    }
}
