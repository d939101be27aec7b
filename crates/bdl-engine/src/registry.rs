//! Engine registry and URL routing
//!
//! The registry is built once at startup and then only read. It owns every
//! installed engine together with its compiled site patterns.

use std::sync::Arc;

use regex::Regex;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::local::LocalEngine;

/// Outcome of routing a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub engine_id: String,
    pub site_id: String,
}

struct CompiledSite {
    name: String,
    patterns: Vec<Regex>,
}

struct Registration {
    engine: Arc<dyn Engine>,
    sites: Vec<CompiledSite>,
}

impl CompiledSite {
    /// A site serves its own host and subdomains of it. Sites named after a
    /// scheme (`file`) serve every URL of that scheme.
    fn serves(&self, scheme: &str, host: &str) -> bool {
        let name = self.name.as_str();
        name.eq_ignore_ascii_case(scheme)
            || name.eq_ignore_ascii_case(host)
            || host
                .len()
                .checked_sub(name.len() + 1)
                .and_then(|dot| host.get(dot..))
                .is_some_and(|suffix| {
                    suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(name)
                })
    }
}

impl Registration {
    /// First site of this engine serving the URL's host and matching `url`.
    fn matching_site(&self, url: &str) -> Option<&str> {
        let (scheme, host) = split_host(url)?;
        self.sites
            .iter()
            .filter(|site| site.serves(scheme, host))
            .find(|site| site.patterns.iter().any(|re| re.is_match(url)))
            .map(|site| site.name.as_str())
    }
}

/// Scheme and host of a URL, without userinfo or port.
///
/// The host is empty for URLs such as `file:///srv/photos`.
fn split_host(url: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    };
    Some((scheme, host))
}

/// Central registry of installed engines.
///
/// Engines are kept in registration order, which is also the order in which
/// their sites are tried.
#[derive(Default)]
pub struct EngineRegistry {
    engines: Vec<Registration>,
}

impl EngineRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the engines shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        // Built-in patterns are static and known to compile
        if let Err(e) = registry.register(Arc::new(LocalEngine::new())) {
            tracing::error!(error = %e, "Failed to register built-in local engine");
        }
        registry
    }

    /// Register an engine, compiling its site patterns.
    ///
    /// # Errors
    ///
    /// Fails if an engine with the same id exists or a pattern does not compile.
    pub fn register(&mut self, engine: Arc<dyn Engine>) -> Result<()> {
        let id = engine.id().to_string();
        if self.contains(&id) {
            return Err(Error::DuplicateEngine { id });
        }

        let mut sites = Vec::new();
        for site in engine.sites() {
            let mut patterns = Vec::with_capacity(site.patterns.len());
            for pattern in &site.patterns {
                let re = Regex::new(pattern).map_err(|e| Error::InvalidSitePattern {
                    engine: id.clone(),
                    site: site.name.clone(),
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
                patterns.push(re);
            }
            sites.push(CompiledSite {
                name: site.name,
                patterns,
            });
        }

        tracing::debug!(engine = %id, sites = sites.len(), "Registered engine");
        self.engines.push(Registration { engine, sites });
        Ok(())
    }

    /// Get an engine by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Engine>> {
        self.engines
            .iter()
            .find(|r| r.engine.id() == id)
            .map(|r| Arc::clone(&r.engine))
    }

    /// Get an engine by id or fail with [`Error::UnknownEngine`].
    pub fn require(&self, id: &str) -> Result<Arc<dyn Engine>> {
        self.get(id).ok_or_else(|| Error::UnknownEngine { id: id.to_string() })
    }

    /// Check if an engine is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.engines.iter().any(|r| r.engine.id() == id)
    }

    /// Number of registered engines.
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Registered engine ids, in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.engines.iter().map(|r| r.engine.id()).collect()
    }

    /// Site names published by an engine.
    pub fn sites(&self, id: &str) -> Vec<&str> {
        self.engines
            .iter()
            .filter(|r| r.engine.id() == id)
            .flat_map(|r| r.sites.iter().map(|s| s.name.as_str()))
            .collect()
    }

    /// Route a URL to the engine and site that handle it.
    ///
    /// Only sites serving the URL's host are considered, then their patterns
    /// are tried. Every engine is tried; within an engine the first matching
    /// site wins.
    ///
    /// # Errors
    ///
    /// [`Error::NoMatchingEngine`] when nothing matches,
    /// [`Error::AmbiguousEngine`] when more than one engine does.
    pub fn resolve(&self, url: &str) -> Result<Resolution> {
        let matches: Vec<(&str, &str)> = self
            .engines
            .iter()
            .filter_map(|r| r.matching_site(url).map(|site| (r.engine.id(), site)))
            .collect();

        match matches.as_slice() {
            [] => Err(Error::NoMatchingEngine {
                url: url.to_string(),
            }),
            [(engine, site)] => {
                tracing::debug!(url, engine, site, "Resolved URL");
                Ok(Resolution {
                    engine_id: (*engine).to_string(),
                    site_id: (*site).to_string(),
                })
            }
            many => Err(Error::AmbiguousEngine {
                url: url.to_string(),
                engines: many.iter().map(|(e, _)| (*e).to_string()).collect(),
            }),
        }
    }

    /// Name a repository after its URL, asking the owning engine first.
    pub fn repository_name(&self, url: &str) -> Option<String> {
        let from_engine = self
            .resolve(url)
            .ok()
            .and_then(|r| self.get(&r.engine_id))
            .and_then(|engine| engine.repository_name(url));
        from_engine
            .or_else(|| default_repository_name(url))
            .map(|name| name.replace('/', ""))
            .filter(|name| !name.is_empty())
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.list())
            .finish()
    }
}

/// Last non-empty path segment of a URL, ignoring query and fragment.
pub fn default_repository_name(url: &str) -> Option<String> {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    path.split('/')
        .rev()
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}
