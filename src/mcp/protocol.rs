use crate::mcp::transport::TransportError;
use rust_mcp_schema::schema_utils::ServerMessage;
use rust_mcp_schema::{
    ClientCapabilities, Implementation, InitializeRequestParams, InitializeResult,
    ListToolsResult, RpcError, LATEST_PROTOCOL_VERSION,
};
use serde_json::Value;

/// Initialize parameters for this client. No optional client capabilities
/// are advertised; server-initiated requests are declined.
pub(crate) fn client_details(protocol_version: Option<&str>) -> InitializeRequestParams {
    let protocol_version = protocol_version
        .filter(|version| !version.trim().is_empty())
        .unwrap_or(LATEST_PROTOCOL_VERSION)
        .to_string();
    InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("Repolens MCP Client".to_string()),
            description: Some("Read-only repository question answering".to_string()),
            icons: Vec::new(),
            website_url: None,
        },
        meta: None,
        protocol_version,
    }
}

pub(crate) fn parse_initialize_result(
    message: ServerMessage,
) -> Result<InitializeResult, TransportError> {
    let result: InitializeResult = parse_response(message)?;
    if result.protocol_version.trim().is_empty() {
        return Err(TransportError::Protocol(
            "Unexpected initialize response.".to_string(),
        ));
    }
    Ok(result)
}

pub(crate) fn parse_list_tools(message: ServerMessage) -> Result<ListToolsResult, TransportError> {
    parse_response(message)
}

fn parse_response<T: serde::de::DeserializeOwned>(
    message: ServerMessage,
) -> Result<T, TransportError> {
    let value = parse_response_value(message)?;
    serde_json::from_value::<T>(value).map_err(|err| TransportError::Protocol(err.to_string()))
}

/// Extracts the `result` member of a response, mapping JSON-RPC errors to
/// [`TransportError::Rpc`].
pub(crate) fn parse_response_value(message: ServerMessage) -> Result<Value, TransportError> {
    match message {
        ServerMessage::Response(response) => serde_json::to_value(&response.result)
            .map_err(|err| TransportError::Protocol(err.to_string())),
        ServerMessage::Error(error) => Err(rpc_error(&error.error)),
        ServerMessage::Request(_) | ServerMessage::Notification(_) => Err(
            TransportError::Protocol("server sent a message that is not a response".to_string()),
        ),
    }
}

fn rpc_error(error: &RpcError) -> TransportError {
    let details = error.data.as_ref().and_then(|data| {
        data.get("details")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string())
            .or_else(|| data.as_str().map(|value| value.to_string()))
            .or_else(|| serde_json::to_string_pretty(data).ok())
            .filter(|details| !details.is_empty())
    });
    TransportError::Rpc {
        code: error.code,
        message: error.message.clone(),
        details,
    }
}
