//! cache_purge tool implementation.
//!
//! Removes expired entries, or everything when `expired_only` is false.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sitecache_core::CacheManager;

use crate::error::ServerError;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Only remove expired entries (default). Set to false to clear the whole cache.
    #[serde(default = "default_true")]
    pub expired_only: bool,
}

fn default_true() -> bool {
    true
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of expired entries removed. Absent for a full clear.
    pub deleted: Option<usize>,

    /// Whether the operation completed.
    pub success: bool,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(cache: &CacheManager, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    let output = if params.expired_only {
        let deleted = cache.cleanup_expired().await.map_err(ServerError::from)?;
        CachePurgeOutput { deleted: Some(deleted), success: true }
    } else {
        let success = cache.clear_all().await.map_err(ServerError::from)?;
        CachePurgeOutput { deleted: None, success }
    };

    tracing::info!(expired_only = params.expired_only, deleted = ?output.deleted, "cache purged");

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| ServerError::Serialization(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
