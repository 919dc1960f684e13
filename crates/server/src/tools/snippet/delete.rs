//! snippet_delete tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snippets_core::SnippetService;

use super::json_result;

/// Parameters for the snippet_delete tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SnippetDeleteParams {
    /// Public id returned by snippet_create.
    pub id: String,

    /// Edit token returned by snippet_create.
    pub edit_token: String,
}

/// Output from the snippet_delete tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SnippetDeleteOutput {
    pub id: String,
    pub deleted: bool,
}

/// Implementation of the snippet_delete tool.
pub async fn delete_impl(service: &SnippetService, params: SnippetDeleteParams) -> Result<CallToolResult, McpError> {
    service.delete(&params.id, &params.edit_token).await?;
    json_result(&SnippetDeleteOutput { id: params.id, deleted: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::snippet::testing::{output, service};
    use snippets_core::CreateSnippet;

    #[tokio::test]
    async fn test_delete_then_gone() {
        let svc = service().await;
        let created = svc.create(CreateSnippet { content: "bye".into(), ..Default::default() }).await.unwrap();
        let params = SnippetDeleteParams { id: created.public_id.clone(), edit_token: created.edit_token.clone() };

        let out: SnippetDeleteOutput = output(&delete_impl(&svc, params.clone()).await.unwrap());
        assert!(out.deleted);

        let err = delete_impl(&svc, params).await.unwrap_err();
        assert_eq!(err.code.0, -32001);
    }
}
