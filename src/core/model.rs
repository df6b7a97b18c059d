use crate::api::{ChatMessage, ChatToolCall, ChatToolDefinition};
use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;

/// One completion request: fixed instructions, the offered tools and the
/// running conversation.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub instructions: &'a str,
    pub messages: &'a [ChatMessage],
    /// Empty when the model must answer without tools.
    pub tools: &'a [ChatToolDefinition],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ChatToolCall>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tools(tool_calls: Vec<ChatToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }
}

/// A language model that can answer with text or request tool calls.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply, ModelInvocationError>;
}

#[derive(Debug)]
pub enum ModelInvocationError {
    /// The API key variable is unset or blank.
    MissingApiKey(String),
    /// The request never produced an HTTP response.
    Request(reqwest::Error),
    /// The provider answered with a non-success status.
    Status {
        status: u16,
        summary: Option<String>,
    },
    /// The response body was not a usable completion.
    Decode(String),
}

impl fmt::Display for ModelInvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelInvocationError::MissingApiKey(name) => write!(
                f,
                "{name} is not set in the environment. Please export it before starting."
            ),
            ModelInvocationError::Request(err) => {
                if err.is_timeout() {
                    write!(f, "Model request timed out: {err}")
                } else {
                    write!(f, "Model request failed: {err}")
                }
            }
            ModelInvocationError::Status { status, summary } => match summary {
                Some(summary) => write!(f, "Model API error ({status}): {summary}"),
                None => write!(f, "Model API error ({status})"),
            },
            ModelInvocationError::Decode(err) => write!(f, "Unexpected model response: {err}"),
        }
    }
}

impl StdError for ModelInvocationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ModelInvocationError::Request(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ModelInvocationError {
    fn from(err: reqwest::Error) -> Self {
        ModelInvocationError::Request(err)
    }
}
