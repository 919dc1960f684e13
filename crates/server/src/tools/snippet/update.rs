//! snippet_update tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snippets_core::{SnippetService, UpdateSnippet};

use super::json_result;

/// Parameters for the snippet_update tool.
///
/// Title and expiry are replaced: omitting them clears the title and resets
/// the lifetime to the default.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SnippetUpdateParams {
    /// Public id returned by snippet_create.
    pub id: String,

    /// Edit token returned by snippet_create.
    pub edit_token: String,

    /// Password, for protected snippets.
    #[serde(default)]
    pub password: Option<String>,

    /// Replacement content.
    pub content: String,

    #[serde(default)]
    pub title: Option<String>,

    /// New MIME type. Keeps the current one when omitted.
    #[serde(default)]
    pub content_type: Option<String>,

    #[serde(default)]
    pub expires_in: Option<String>,
}

/// Implementation of the snippet_update tool.
pub async fn update_impl(service: &SnippetService, params: SnippetUpdateParams) -> Result<CallToolResult, McpError> {
    let view = service
        .update(
            &params.id,
            &params.edit_token,
            params.password.as_deref(),
            UpdateSnippet {
                content: params.content,
                title: params.title,
                content_type: params.content_type,
                expires_in: params.expires_in,
            },
        )
        .await?;

    json_result(&view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::snippet::testing::{output, service};
    use snippets_core::{CreateSnippet, SnippetView};

    fn params(id: &str, token: &str, content: &str) -> SnippetUpdateParams {
        SnippetUpdateParams {
            id: id.into(),
            edit_token: token.into(),
            password: None,
            content: content.into(),
            title: None,
            content_type: None,
            expires_in: None,
        }
    }

    #[tokio::test]
    async fn test_update_returns_new_content() {
        let svc = service().await;
        let created = svc.create(CreateSnippet { content: "v1".into(), ..Default::default() }).await.unwrap();

        let result = update_impl(&svc, params(&created.public_id, &created.edit_token, "v2")).await.unwrap();
        let view: SnippetView = output(&result);
        assert_eq!(view.content, "v2");
        assert!(view.last_edited_at.is_some());
    }

    #[tokio::test]
    async fn test_wrong_token_is_unauthorized() {
        let svc = service().await;
        let created = svc.create(CreateSnippet { content: "v1".into(), ..Default::default() }).await.unwrap();

        let err = update_impl(&svc, params(&created.public_id, "bogus", "v2")).await.unwrap_err();
        assert_eq!(err.code.0, -32003);
    }
}
