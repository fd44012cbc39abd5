//! cache_stats tool implementation.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use sitecache_core::CacheManager;

use crate::error::ServerError;

/// Implementation of the cache_stats tool.
pub async fn stats_impl(cache: &CacheManager) -> Result<CallToolResult, McpError> {
    let report = cache.get_cache_stats().await.map_err(ServerError::from)?;
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| ServerError::Serialization(format!("Failed to serialize stats: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
