//! snippet_create tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snippets_core::{CreateSnippet, SnippetService};

use super::json_result;

/// Parameters for the snippet_create tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SnippetCreateParams {
    /// Snippet text. Stored encrypted.
    pub content: String,

    #[serde(default)]
    pub title: Option<String>,

    /// MIME type of the content. Defaults to "text/plain".
    #[serde(default)]
    pub content_type: Option<String>,

    /// Optional password required to read the snippet.
    #[serde(default)]
    pub password: Option<String>,

    /// Lifetime such as "2h", "30m" or "7days". Defaults to one year.
    #[serde(default)]
    pub expires_in: Option<String>,
}

/// Implementation of the snippet_create tool.
pub async fn create_impl(service: &SnippetService, params: SnippetCreateParams) -> Result<CallToolResult, McpError> {
    let created = service
        .create(CreateSnippet {
            content: params.content,
            title: params.title,
            content_type: params.content_type,
            password: params.password,
            expires_in: params.expires_in,
        })
        .await?;

    json_result(&created)
}
