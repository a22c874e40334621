//! TOML configuration parsing and validation.
//!
//! Every command loads one file (default `./config/isx.toml`). Missing
//! sections fall back to the defaults below; the `[domains]` table falls
//! back to the built-in domain layout (see [`default_domains`]).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_domains")]
    pub domains: BTreeMap<String, DomainConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding one sub-directory per domain index.
    #[serde(default = "default_index_root")]
    pub root: PathBuf,
    /// Domain used when a request names an unknown domain.
    #[serde(default = "default_domain_name")]
    pub default_domain: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: default_index_root(),
            default_domain: default_domain_name(),
        }
    }
}

fn default_index_root() -> PathBuf {
    PathBuf::from("./indexes")
}
fn default_domain_name() -> String {
    "home".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Chunks retrieved per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Prior turns rendered into the prompt.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            history_turns: default_history_turns(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_history_turns() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override for the `openai` and `ollama` providers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (Ollama, OpenAI-compatible gateways).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            temperature: None,
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

/// One knowledge domain: where its index lives and where its raw documents are.
#[derive(Debug, Deserialize, Clone)]
pub struct DomainConfig {
    /// Index directory name under `[index].root`. Defaults to the domain name.
    #[serde(default)]
    pub dir: Option<String>,
    /// Directories scanned by `isx index <domain>`.
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl DomainConfig {
    fn with_dir(dir: Option<&str>) -> Self {
        Self {
            dir: dir.map(str::to_string),
            sources: Vec::new(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.csv".to_string(),
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
    ]
}

/// The built-in domain layout. `home` is served from the `general` index.
pub fn default_domains() -> BTreeMap<String, DomainConfig> {
    let mut domains = BTreeMap::new();
    for name in [
        "health",
        "law",
        "finance",
        "technology",
        "education",
        "research",
    ] {
        domains.insert(name.to_string(), DomainConfig::with_dir(None));
    }
    domains.insert(
        "home".to_string(),
        DomainConfig::with_dir(Some("general")),
    );
    domains
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        bail!(
            "chunking.overlap_chars ({}) must be < chunking.max_chars ({})",
            config.chunking.overlap_chars,
            config.chunking.max_chars
        );
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    // Validate domains: the default must exist and every domain owns its own directory
    if !config.domains.contains_key(&config.index.default_domain) {
        bail!(
            "index.default_domain '{}' is not a configured domain",
            config.index.default_domain
        );
    }
    let mut seen_dirs = HashSet::new();
    for (name, domain) in &config.domains {
        if name.trim().is_empty() || name.contains('/') {
            bail!("invalid domain name: '{}'", name);
        }
        let dir = domain.dir.as_deref().unwrap_or(name);
        if !seen_dirs.insert(dir.to_string()) {
            bail!(
                "domain '{}' shares index directory '{}' with another domain",
                name,
                dir
            );
        }
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" | "ollama" | "gemini" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, ollama, or gemini.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Config {
        let content = format!("[db]\npath = \"/tmp/isx.sqlite\"\n{}", extra);
        toml::from_str(&content).unwrap()
    }

    #[test]
    fn test_defaults_match_original_layout() {
        let cfg = parse("");
        validate(&cfg).unwrap();
        assert_eq!(cfg.chunking.max_chars, 1000);
        assert_eq!(cfg.chunking.overlap_chars, 200);
        assert_eq!(cfg.retrieval.top_k, 3);
        assert_eq!(cfg.domains.len(), 7);
        assert_eq!(cfg.domains["home"].dir.as_deref(), Some("general"));
        assert_eq!(cfg.index.default_domain, "home");
    }

    #[test]
    fn test_overlap_must_be_below_max() {
        let cfg = parse("[chunking]\nmax_chars = 100\noverlap_chars = 100\n");
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_default_domain_must_be_configured() {
        let cfg = parse("[index]\ndefault_domain = \"nowhere\"\n");
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_shared_index_dir_rejected() {
        let cfg = parse(
            "[domains.home]\ndir = \"general\"\n[domains.law]\ndir = \"general\"\n",
        );
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_remote_embedding_requires_model_and_dims() {
        let cfg = parse("[embedding]\nprovider = \"openai\"\n");
        assert!(validate(&cfg).is_err());
        let cfg = parse(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
        );
        validate(&cfg).unwrap();
    }

    #[test]
    fn test_unknown_generation_provider_rejected() {
        let cfg = parse("[generation]\nprovider = \"telepathy\"\n");
        assert!(validate(&cfg).is_err());
    }
}
