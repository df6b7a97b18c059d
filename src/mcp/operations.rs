use crate::mcp::protocol::parse_response_value;
use crate::mcp::transport::{McpTransport, TransportError};
use rust_mcp_schema::schema_utils::RequestFromClient;
use rust_mcp_schema::CallToolRequestParams;
use serde_json::{Map, Value};

/// Text form of a `tools/call` result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    /// The server flagged the result with `isError`.
    pub is_error: bool,
}

pub async fn call_tool(
    transport: &dyn McpTransport,
    name: &str,
    arguments: Option<Map<String, Value>>,
) -> Result<ToolOutput, TransportError> {
    let mut params = CallToolRequestParams::new(name);
    if let Some(arguments) = arguments {
        params = params.with_arguments(arguments);
    }
    let response = transport
        .send_request(RequestFromClient::CallToolRequest(params))
        .await?;
    let value = parse_response_value(response)?;
    Ok(tool_output_from_value(&value))
}

/// Joins the text blocks of a call result. Results without text content
/// fall back to their structured content, then to the whole payload.
pub(crate) fn tool_output_from_value(value: &Value) -> ToolOutput {
    let is_error = value
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let texts: Vec<&str> = value
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let text = if !texts.is_empty() {
        texts.join("\n")
    } else if let Some(structured) = value.get("structuredContent") {
        serialize_result(structured)
    } else {
        serialize_result(value)
    };

    ToolOutput { text, is_error }
}

fn serialize_result(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "Unable to serialize MCP result.".to_string())
}
