//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the cache administration tools.
use std::sync::Arc;

use crate::tools::cache::{
    CacheGetParams, CacheInvalidateParams, CachePurgeParams, get_impl, invalidate_impl, purge_impl, stats_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use sitecache_core::CacheManager;

/// The main MCP server handler for sitecache.
#[derive(Clone)]
pub struct SiteCacheServer {
    cache: Arc<CacheManager>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl SiteCacheServer {
    /// Create a new server handler around a shared cache manager.
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache, tool_router: Self::tool_router() }
    }

    #[tool(description = "Read a cached entry by kind (html, image, metadata, robots) and URL. Images are base64.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.cache, params.0).await
    }

    #[tool(description = "Report cache statistics: entry counts, size, hit rate and backend details.")]
    async fn cache_stats(&self) -> Result<CallToolResult, McpError> {
        stats_impl(&self.cache).await
    }

    /// Purge expired entries, or clear the whole cache when `expired_only` is false.
    #[tool(description = "Remove expired cache entries. Pass expired_only=false to clear everything.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.cache, params.0).await
    }

    #[tool(description = "Invalidate the cached HTML and metadata for a URL.")]
    async fn cache_invalidate(&self, params: Parameters<CacheInvalidateParams>) -> Result<CallToolResult, McpError> {
        invalidate_impl(&self.cache, params.0).await
    }
}

impl ServerHandler for SiteCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "sitecache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some("Inspect and maintain the sitecache content cache.".into()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
