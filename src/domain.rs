//! Static domain → index location map.
//!
//! Built once from the `[domains]` configuration table. Unknown names
//! resolve to the default domain (`home` unless configured otherwise).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

use crate::config::Config;

/// The outcome of resolving a requested domain name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDomain {
    /// Canonical name of the domain actually served.
    pub name: String,
    /// Directory holding the domain's index artifacts.
    pub location: PathBuf,
    /// True when the requested name was unknown and the default was used.
    pub fell_back: bool,
}

#[derive(Debug, Clone)]
pub struct DomainMap {
    default_domain: String,
    locations: BTreeMap<String, PathBuf>,
}

impl DomainMap {
    pub fn from_config(config: &Config) -> Self {
        let locations = config
            .domains
            .iter()
            .map(|(name, domain)| {
                let dir = domain.dir.as_deref().unwrap_or(name);
                (name.to_lowercase(), config.index.root.join(dir))
            })
            .collect();

        Self {
            default_domain: config.index.default_domain.to_lowercase(),
            locations,
        }
    }

    /// Build a map directly; `default_domain` must be one of `locations`.
    pub fn new(default_domain: &str, locations: BTreeMap<String, PathBuf>) -> Self {
        Self {
            default_domain: default_domain.to_string(),
            locations,
        }
    }

    pub fn default_domain(&self) -> &str {
        &self.default_domain
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.locations.keys().map(String::as_str)
    }

    /// Location of a configured domain, without fallback.
    pub fn location(&self, name: &str) -> Option<&Path> {
        self.locations.get(&normalize_name(name)).map(PathBuf::as_path)
    }

    /// Resolve `name`, falling back to the default domain when unknown.
    pub fn resolve(&self, name: &str) -> ResolvedDomain {
        let normalized = normalize_name(name);
        if let Some(location) = self.locations.get(&normalized) {
            return ResolvedDomain {
                name: normalized,
                location: location.clone(),
                fell_back: false,
            };
        }

        let location = self
            .locations
            .get(&self.default_domain)
            .cloned()
            .unwrap_or_default();
        ResolvedDomain {
            name: self.default_domain.clone(),
            location,
            fell_back: true,
        }
    }

    /// Pick the domain for an incoming request.
    ///
    /// A known client-supplied value wins. Otherwise the first path segment
    /// of the referrer naming a configured domain is used. Otherwise the
    /// default domain.
    pub fn resolve_request_domain(&self, client: Option<&str>, referrer: Option<&str>) -> String {
        if let Some(value) = client {
            let normalized = normalize_name(value);
            if self.locations.contains_key(&normalized) {
                return normalized;
            }
        }

        if let Some(referrer) = referrer {
            let path = referrer_path(referrer);
            for segment in path.split('/') {
                let normalized = normalize_name(segment);
                if !normalized.is_empty() && self.locations.contains_key(&normalized) {
                    return normalized;
                }
            }
        }

        self.default_domain.clone()
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// The path component of a referrer. Relative referrers are resolved
/// against a placeholder origin; unparsable ones have no path.
fn referrer_path(referrer: &str) -> String {
    let parsed = Url::parse(referrer).or_else(|_| {
        Url::parse("http://localhost/").and_then(|base| base.join(referrer))
    });
    match parsed {
        Ok(url) => url.path().to_string(),
        Err(e) => {
            tracing::debug!(referrer, error = %e, "ignoring unparsable referrer");
            String::new()
        }
    }
}
