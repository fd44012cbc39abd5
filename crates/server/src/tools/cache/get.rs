//! cache_get tool implementation.
//!
//! Reads one cached item by content kind and URL (or domain, for robots.txt).

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sitecache_core::{CacheManager, ContentKind};

use super::{EntryKind, robots_domain, validate_url};
use crate::error::ServerError;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Which kind of content to read.
    pub kind: EntryKind,

    /// Page or image URL. For `robots`, a domain or any URL on that domain.
    pub url: String,
}

/// Cached payload returned by cache_get.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CachedContent {
    Text { text: String },
    Image { base64: String, size_bytes: usize },
    Metadata { value: serde_json::Value },
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    /// The cache key the content was found under.
    pub key: String,
    pub content: CachedContent,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(cache: &CacheManager, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let output = lookup(cache, params).await?;
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| ServerError::Serialization(format!("Failed to serialize entry: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

async fn lookup(cache: &CacheManager, params: CacheGetParams) -> Result<CacheGetOutput, ServerError> {
    let kind = ContentKind::from(params.kind);
    let target = match params.kind {
        EntryKind::Robots => robots_domain(&params.url)?,
        _ => validate_url(&params.url)?,
    };
    let key = cache.key_for(kind, &target);

    let content = match params.kind {
        EntryKind::Html => cache.get_html(&target).await?.map(|text| CachedContent::Text { text }),
        EntryKind::Robots => cache.get_robots_txt(&target).await?.map(|text| CachedContent::Text { text }),
        EntryKind::Image => cache
            .get_image(&target)
            .await?
            .map(|bytes| CachedContent::Image { size_bytes: bytes.len(), base64: BASE64.encode(bytes) }),
        EntryKind::Metadata => cache.get_metadata(&target).await?.map(|value| CachedContent::Metadata { value }),
    };

    content
        .map(|content| CacheGetOutput { key: key.clone(), content })
        .ok_or(ServerError::CacheMiss(key))
}
