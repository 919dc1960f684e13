//! snippet_read tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snippets_core::SnippetService;

use super::json_result;

/// Parameters for the snippet_read tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SnippetReadParams {
    /// Public id returned by snippet_create.
    pub id: String,

    /// Password, for protected snippets.
    #[serde(default)]
    pub password: Option<String>,
}

/// Implementation of the snippet_read tool.
pub async fn read_impl(service: &SnippetService, params: SnippetReadParams) -> Result<CallToolResult, McpError> {
    let view = service.read(&params.id, params.password.as_deref()).await?;
    json_result(&view)
}
