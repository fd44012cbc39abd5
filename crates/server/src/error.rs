//! Structured errors for the sitecache MCP server.
//!
//! Core errors and tool-level failures are mapped to MCP error data here.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Structured errors for the sitecache MCP server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Invalid input parameters (e.g., an unparsable URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Nothing is cached under the requested key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Output could not be serialized.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),

    /// The cache core reported a fatal error.
    #[error(transparent)]
    Core(#[from] sitecache_core::Error),
}

impl From<ServerError> for McpError {
    fn from(err: ServerError) -> Self {
        let code = match &err {
            ServerError::InvalidInput(_) => -32602,
            ServerError::CacheMiss(_) => -32001,
            ServerError::Serialization(_) => -32603,
            ServerError::Core(sitecache_core::Error::Config(_)) => -32002,
            ServerError::Core(_) => -32000,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_miss_code() {
        let err: McpError = ServerError::CacheMiss("html:abc".into()).into();
        assert_eq!(err.code.0, -32001);
        assert!(err.message.contains("CACHE_MISS"));
    }

    #[test]
    fn test_core_error_passthrough() {
        let err: McpError = ServerError::from(sitecache_core::Error::UnsupportedBackend("memory".into())).into();
        assert_eq!(err.code.0, -32000);
        assert!(err.message.starts_with("UNSUPPORTED_BACKEND"));
    }
}
