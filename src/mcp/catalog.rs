use crate::mcp::protocol::parse_list_tools;
use crate::mcp::transport::{is_method_not_found, McpTransport, TransportError};
use rust_mcp_schema::schema_utils::RequestFromClient;
use rust_mcp_schema::{PaginatedRequestParams, Tool};
use std::collections::HashMap;
use tracing::debug;

/// Upper bound on `tools/list` pages fetched for one catalog.
pub const MAX_TOOL_PAGES: usize = 256;

/// Tools discovered on one server, in first-seen order, unique by name.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    /// Adds a tool. A repeated name replaces the earlier descriptor in place.
    pub fn insert(&mut self, tool: Tool) {
        match self.index.get(&tool.name) {
            Some(&position) => self.tools[position] = tool,
            None => {
                self.index.insert(tool.name.clone(), self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&position| &self.tools[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|tool| tool.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl FromIterator<Tool> for ToolCatalog {
    fn from_iter<I: IntoIterator<Item = Tool>>(iter: I) -> Self {
        let mut catalog = ToolCatalog::default();
        for tool in iter {
            catalog.insert(tool);
        }
        catalog
    }
}

/// Pages through `tools/list` until the server stops returning a cursor.
///
/// Any page failure fails the whole load. A server that does not implement
/// `tools/list` at all yields an empty catalog.
pub async fn load_tool_catalog(
    transport: &dyn McpTransport,
) -> Result<ToolCatalog, TransportError> {
    let mut catalog = ToolCatalog::default();
    let mut cursor: Option<String> = None;

    for page in 0..MAX_TOOL_PAGES {
        let params = cursor.take().map(|cursor| PaginatedRequestParams {
            cursor: Some(cursor),
            meta: None,
        });
        let response = transport
            .send_request(RequestFromClient::ListToolsRequest(params))
            .await?;

        if page == 0 && is_method_not_found(&response) {
            debug!("MCP server does not support tools/list");
            return Ok(catalog);
        }

        let list = parse_list_tools(response)?;
        debug!(page, tools = list.tools.len(), "Fetched MCP tool page");
        for tool in list.tools {
            catalog.insert(tool);
        }

        match list.next_cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(catalog),
        }
    }

    Err(TransportError::Protocol(format!(
        "tools/list did not finish within {MAX_TOOL_PAGES} pages"
    )))
}
