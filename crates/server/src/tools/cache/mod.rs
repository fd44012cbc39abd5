//! Cache administration MCP tools.
//!
//! This module provides tools for inspecting and maintaining the content cache.

pub mod get;
pub mod invalidate;
pub mod purge;
pub mod stats;

pub use get::{CacheGetParams, get_impl};
pub use invalidate::{CacheInvalidateParams, invalidate_impl};
pub use purge::{CachePurgeParams, purge_impl};
pub use stats::stats_impl;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sitecache_core::ContentKind;
use url::Url;

use crate::error::ServerError;

/// Content kinds addressable through the tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Html,
    Image,
    Metadata,
    Robots,
}

impl From<EntryKind> for ContentKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Html => ContentKind::Html,
            EntryKind::Image => ContentKind::Image,
            EntryKind::Metadata => ContentKind::Metadata,
            EntryKind::Robots => ContentKind::Robots,
        }
    }
}

/// Check that `input` is an absolute URL. The original text is returned
/// untouched since cache keys hash the exact string.
pub(crate) fn validate_url(input: &str) -> Result<String, ServerError> {
    Url::parse(input).map_err(|e| ServerError::InvalidInput(format!("Invalid URL '{input}': {e}")))?;
    Ok(input.to_string())
}

/// Resolve the domain robots.txt entries are keyed by.
///
/// Accepts a bare domain or any URL on it.
pub(crate) fn robots_domain(input: &str) -> Result<String, ServerError> {
    let input = input.trim();
    if let Ok(url) = Url::parse(input)
        && let Some(host) = url.host_str()
    {
        return Ok(host.to_string());
    }

    if input.is_empty() || input.contains('/') || input.contains(char::is_whitespace) {
        return Err(ServerError::InvalidInput(format!("Invalid domain '{input}'")));
    }
    Ok(input.to_ascii_lowercase())
}
