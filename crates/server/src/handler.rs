//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the snippet lifecycle tools.
use std::sync::Arc;

use crate::tools::snippet::{
    SnippetCreateParams, SnippetDeleteParams, SnippetReadParams, SnippetUpdateParams, create_impl, delete_impl,
    read_impl, update_impl,
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
use snippets_core::SnippetService;

/// The main MCP server handler for the snippets service.
#[derive(Clone)]
pub struct SnippetServer {
    service: Arc<SnippetService>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl SnippetServer {
    pub fn new(service: Arc<SnippetService>) -> Self {
        Self { service, tool_router: Self::tool_router() }
    }

    /// Store a new snippet.
    #[tool(description = "Store a text snippet. Returns its public id, a one-time edit token, and the expiry.")]
    async fn snippet_create(&self, params: Parameters<SnippetCreateParams>) -> Result<CallToolResult, McpError> {
        create_impl(&self.service, params.0).await
    }

    /// Read a snippet by public id.
    #[tool(description = "Read a snippet by public id. Protected snippets require their password.")]
    async fn snippet_read(&self, params: Parameters<SnippetReadParams>) -> Result<CallToolResult, McpError> {
        read_impl(&self.service, params.0).await
    }

    /// Replace a snippet's content and metadata.
    #[tool(description = "Replace a snippet's content and metadata. Requires the edit token and any password.")]
    async fn snippet_update(&self, params: Parameters<SnippetUpdateParams>) -> Result<CallToolResult, McpError> {
        update_impl(&self.service, params.0).await
    }

    /// Delete a snippet.
    #[tool(description = "Delete a snippet. Requires the edit token.")]
    async fn snippet_delete(&self, params: Parameters<SnippetDeleteParams>) -> Result<CallToolResult, McpError> {
        delete_impl(&self.service, params.0).await
    }
}

impl ServerHandler for SnippetServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "snippets".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
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
