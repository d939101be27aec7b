//! Site definitions published by engines

use serde::{Deserialize, Serialize};

/// One site an engine knows how to handle.
///
/// `name` identifies the network host (or scheme family); `patterns` are
/// regular expressions matched against full repository URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDefinition {
    pub name: String,
    pub patterns: Vec<String>,
}

impl SiteDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            patterns: Vec::new(),
        }
    }

    /// Add a URL pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }
}
