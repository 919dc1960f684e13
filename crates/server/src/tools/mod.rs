//! MCP tool implementations.
//!
//! This module contains all tools exposed by the snippets server.

pub mod snippet;
