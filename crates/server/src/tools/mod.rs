//! MCP tool implementations.
//!
//! This module contains all tools exposed by the sitecache server.

pub mod cache;
