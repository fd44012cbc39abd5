//! cache_invalidate tool implementation.
//!
//! Drops the cached HTML and metadata for a URL.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sitecache_core::CacheManager;

use super::validate_url;
use crate::error::ServerError;

/// Parameters for the cache_invalidate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheInvalidateParams {
    /// The page URL to invalidate.
    pub url: String,
}

/// Output from the cache_invalidate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheInvalidateOutput {
    /// True when an HTML or metadata entry was removed.
    pub invalidated: bool,
}

/// Implementation of the cache_invalidate tool.
pub async fn invalidate_impl(cache: &CacheManager, params: CacheInvalidateParams) -> Result<CallToolResult, McpError> {
    let url = validate_url(&params.url)?;
    let invalidated = cache.invalidate_url(&url).await.map_err(ServerError::from)?;

    let json = serde_json::to_string_pretty(&CacheInvalidateOutput { invalidated })
        .map_err(|e| ServerError::Serialization(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
