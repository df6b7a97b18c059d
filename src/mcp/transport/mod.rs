//! Transport abstractions for talking to an MCP tool server.
//!
//! Only the stdio transport ships; the [`McpTransport`] trait is the seam the
//! catalog loader, the agent and the tests program against.

use async_trait::async_trait;
use rust_mcp_schema::schema_utils::{RequestFromClient, ServerMessage};
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

pub mod stdio;

/// JSON-RPC code used by servers to indicate unsupported methods.
pub const MCP_METHOD_NOT_FOUND: i64 = -32601;

#[async_trait]
/// Request/response channel to one tool server.
///
/// Implementations correlate each request with its response. Callers never
/// overlap requests on the same connection.
pub trait McpTransport: Send + Sync {
    async fn send_request(&self, request: RequestFromClient) -> Result<ServerMessage, TransportError>;

    /// Releases the connection. Safe to call more than once.
    async fn close(&self);
}

/// Returns true when a server reports the JSON-RPC method-not-found code.
pub fn is_method_not_found(message: &ServerMessage) -> bool {
    matches!(
        message,
        ServerMessage::Error(error) if error.error.code == MCP_METHOD_NOT_FOUND
    )
}

/// Failures while exchanging messages with a running tool server.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The child process has exited or the connection was closed.
    Closed,
    /// The response slot was dropped before a reply arrived.
    ChannelClosed,
    /// No response before the configured deadline.
    Timeout(Duration),
    /// Writing the request to the child failed.
    Io(String),
    /// The server answered with a JSON-RPC error.
    Rpc {
        code: i64,
        message: String,
        details: Option<String>,
    },
    /// The reply could not be interpreted.
    Protocol(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "MCP server connection is closed."),
            TransportError::ChannelClosed => write!(f, "MCP stdio response channel closed."),
            TransportError::Timeout(after) => {
                write!(f, "MCP request timed out after {}s.", after.as_secs())
            }
            TransportError::Io(err) => write!(f, "MCP stdio write failed: {err}"),
            TransportError::Rpc {
                code,
                message,
                details,
            } => {
                write!(f, "MCP error {code}: {message}")?;
                if let Some(details) = details {
                    write!(f, "\n{details}")?;
                }
                Ok(())
            }
            TransportError::Protocol(err) => write!(f, "Unexpected MCP response: {err}"),
        }
    }
}

impl StdError for TransportError {}

/// Failures that prevent a connection from being established at all.
#[derive(Debug)]
pub enum ConnectionSetupError {
    /// A required environment variable is unset or blank.
    MissingEnvironment(String),
    /// `tool_server.host` is empty.
    MissingHost,
    /// The configured command is empty.
    MissingCommand,
    /// The child process could not be started.
    Spawn {
        command: String,
        source: std::io::Error,
    },
    /// The `initialize` exchange failed.
    Handshake(TransportError),
}

impl fmt::Display for ConnectionSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionSetupError::MissingEnvironment(name) => write!(
                f,
                "{name} is not set in the environment. Please export it before starting."
            ),
            ConnectionSetupError::MissingHost => write!(
                f,
                "tool_server.host is empty. Set it to github.com or your GitHub Enterprise host."
            ),
            ConnectionSetupError::MissingCommand => {
                write!(f, "MCP command is required for stdio transport.")
            }
            ConnectionSetupError::Spawn { command, source } => {
                write!(f, "Failed to start MCP server `{command}`: {source}")
            }
            ConnectionSetupError::Handshake(err) => {
                write!(f, "MCP initialize handshake failed: {err}")
            }
        }
    }
}

impl StdError for ConnectionSetupError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConnectionSetupError::Spawn { source, .. } => Some(source),
            ConnectionSetupError::Handshake(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_display_appends_details() {
        let err = TransportError::Rpc {
            code: -32603,
            message: "Internal error".to_string(),
            details: Some("Git Repository is empty.".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "MCP error -32603: Internal error\nGit Repository is empty."
        );
    }

    #[test]
    fn method_not_found_is_detected() {
        let message: ServerMessage = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {"code": -32601, "message": "Method not found"}
        }))
        .expect("message should parse");
        assert!(is_method_not_found(&message));
    }
}
