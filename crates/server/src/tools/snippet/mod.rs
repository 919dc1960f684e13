//! Snippet lifecycle tools.
//!
//! Each tool forwards to [`SnippetService`](snippets_core::SnippetService)
//! and returns its result as pretty-printed JSON text.

pub mod create;
pub mod delete;
pub mod read;
pub mod update;

pub use create::{SnippetCreateParams, create_impl};
pub use delete::{SnippetDeleteParams, delete_impl};
pub use read::{SnippetReadParams, read_impl};
pub use update::{SnippetUpdateParams, update_impl};

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| McpError::internal_error(format!("failed to serialize output: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
