use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_TOOL: &str = "tool";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ROLE_SYSTEM, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ROLE_USER, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(ROLE_ASSISTANT, content)
    }

    /// Assistant turn that requested tools; `content` may be empty.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ChatToolCall>) -> Self {
        Self {
            role: ROLE_ASSISTANT.to_string(),
            content,
            tool_call_id: None,
            tool_calls: Some(tool_calls),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ROLE_TOOL.to_string(),
            content: Some(content.into()),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

#[derive(Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<&'a [ChatToolDefinition]>,
}

#[derive(Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
}

#[derive(Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: ChatToolCallFunction,
}

impl ChatToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: ChatToolCallFunction {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatToolCallFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ChatToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatToolFunction,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ChatToolFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

fn function_kind() -> String {
    "function".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_message_serializes_call_id() {
        let message = ChatMessage::tool_result("call-1", "ok");
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call-1");
        assert!(value.get("tool_calls").is_none());
    }

    #[test]
    fn completion_response_accepts_null_content_with_tool_calls() {
        let raw = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "list_repositories", "arguments": "{}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let response: ChatCompletionResponse = serde_json::from_str(raw).expect("parse");
        let message = &response.choices[0].message;
        assert!(message.content.is_none());
        let calls = message.tool_calls.as_ref().expect("tool calls");
        assert_eq!(calls[0].function.name, "list_repositories");
        assert_eq!(calls[0].kind, "function");
    }
}
