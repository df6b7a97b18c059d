use crate::api::{ChatMessage, ChatToolCall, ROLE_TOOL};
use crate::core::model::{ChatModel, ModelInvocationError, ModelReply, ModelRequest};
use crate::mcp::catalog::ToolCatalog;
use crate::mcp::transport::{McpTransport, TransportError};
use async_trait::async_trait;
use rust_mcp_schema::schema_utils::{RequestFromClient, ServerMessage};
use rust_mcp_schema::{ListToolsResult, Tool, ToolInputSchema};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn sample_tool(name: &str) -> Tool {
    Tool {
        annotations: None,
        description: Some(format!("{name} tool")),
        execution: None,
        icons: Vec::new(),
        input_schema: ToolInputSchema::new(Vec::new(), None, None),
        meta: None,
        name: name.to_string(),
        output_schema: None,
        title: None,
    }
}

/// Tool with a declared `owner`/`repo` object schema, both required.
pub fn repo_tool(name: &str) -> Tool {
    let mut tool = sample_tool(name);
    tool.input_schema = serde_json::from_value(json!({
        "type": "object",
        "properties": {
            "owner": {"type": "string"},
            "repo": {"type": "string"}
        },
        "required": ["owner", "repo"]
    }))
    .expect("input schema");
    tool
}

pub fn catalog_of(tools: Vec<Tool>) -> ToolCatalog {
    tools.into_iter().collect()
}

pub fn list_tools_response(tools: Vec<Tool>, next_cursor: Option<&str>) -> ServerMessage {
    let result = ListToolsResult {
        meta: None,
        next_cursor: next_cursor.map(str::to_string),
        tools,
    };
    response_message(serde_json::to_value(result).expect("serialize tools"))
}

pub fn response_message(result: Value) -> ServerMessage {
    serde_json::from_value(json!({"jsonrpc": "2.0", "id": 0, "result": result}))
        .expect("response message")
}

pub fn rpc_error_message(code: i64, message: &str) -> ServerMessage {
    serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "id": 0,
        "error": {"code": code, "message": message}
    }))
    .expect("error message")
}

pub fn call_tool_result(text: &str, is_error: bool) -> Value {
    json!({
        "content": [{"type": "text", "text": text}],
        "isError": is_error
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    ListTools(Option<String>),
    CallTool {
        name: String,
        arguments: Option<Map<String, Value>>,
    },
    Other,
}

/// In-memory transport. `tools/list` replies come from a queue; `tools/call`
/// replies come from per-tool results.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<VecDeque<Result<ServerMessage, TransportError>>>,
    tool_results: Mutex<HashMap<String, Result<Value, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    closes: AtomicUsize,
}

impl FakeTransport {
    pub fn with_tool_pages(pages: Vec<(Vec<&str>, Option<&str>)>) -> Self {
        let transport = Self::default();
        for (names, cursor) in pages {
            transport.push_response(list_tools_response(
                names.into_iter().map(sample_tool).collect(),
                cursor,
            ));
        }
        transport
    }

    pub fn push_response(&self, message: ServerMessage) {
        self.responses.lock().unwrap().push_back(Ok(message));
    }

    pub fn push_error(&self, err: TransportError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    pub fn push_rpc_error(&self, code: i64, message: &str) {
        self.push_response(rpc_error_message(code, message));
    }

    pub fn set_tool_result(&self, name: &str, text: &str, is_error: bool) {
        self.tool_results
            .lock()
            .unwrap()
            .insert(name.to_string(), Ok(call_tool_result(text, is_error)));
    }

    pub fn set_tool_error(&self, name: &str, err: TransportError) {
        self.tool_results
            .lock()
            .unwrap()
            .insert(name.to_string(), Err(err));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn list_cursors(&self) -> Vec<Option<String>> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                RecordedRequest::ListTools(cursor) => Some(cursor),
                _ => None,
            })
            .collect()
    }

    pub fn tool_calls(&self) -> Vec<(String, Option<Map<String, Value>>)> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                RecordedRequest::CallTool { name, arguments } => Some((name, arguments)),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl McpTransport for FakeTransport {
    async fn send_request(&self, request: RequestFromClient) -> Result<ServerMessage, TransportError> {
        let recorded = match request {
            RequestFromClient::ListToolsRequest(params) => {
                RecordedRequest::ListTools(params.and_then(|params| params.cursor))
            }
            RequestFromClient::CallToolRequest(params) => RecordedRequest::CallTool {
                name: params.name,
                arguments: params.arguments,
            },
            _ => RecordedRequest::Other,
        };
        self.requests.lock().unwrap().push(recorded.clone());

        if let RecordedRequest::CallTool { name, .. } = &recorded {
            return match self.tool_results.lock().unwrap().get(name) {
                Some(Ok(result)) => Ok(response_message(result.clone())),
                Some(Err(err)) => Err(err.clone()),
                None => Ok(rpc_error_message(-32602, &format!("Unknown tool: {name}"))),
            };
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(TransportError::Closed))
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// One scripted model answer.
pub enum ModelStep {
    Reply(ModelReply),
    /// Answer with the content of the most recent tool message.
    EchoLastToolResult,
    Fail(u16, &'static str),
}

impl ModelStep {
    pub fn text(content: &str) -> Self {
        ModelStep::Reply(ModelReply::text(content))
    }

    pub fn call(name: &str, arguments: Value) -> Self {
        Self::calls(vec![(name, arguments)])
    }

    pub fn calls(calls: Vec<(&str, Value)>) -> Self {
        ModelStep::Reply(ModelReply::tools(
            calls
                .into_iter()
                .enumerate()
                .map(|(index, (name, arguments))| {
                    ChatToolCall::function(format!("call-{index}-{name}"), name, arguments.to_string())
                })
                .collect(),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct RecordedModelRequest {
    pub instructions: String,
    pub messages: Vec<ChatMessage>,
    pub offered: Vec<String>,
}

/// Plays back a fixed list of answers and records every request.
#[derive(Default)]
pub struct ScriptedModel {
    steps: Mutex<VecDeque<ModelStep>>,
    requests: Mutex<Vec<RecordedModelRequest>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<ModelStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, step: ModelStep) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn requests(&self) -> Vec<RecordedModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply, ModelInvocationError> {
        self.requests.lock().unwrap().push(RecordedModelRequest {
            instructions: request.instructions.to_string(),
            messages: request.messages.to_vec(),
            offered: request
                .tools
                .iter()
                .map(|tool| tool.function.name.clone())
                .collect(),
        });

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(ModelStep::Reply(reply)) => Ok(reply),
            Some(ModelStep::EchoLastToolResult) => {
                let content = request
                    .messages
                    .iter()
                    .rev()
                    .find(|message| message.role == ROLE_TOOL)
                    .and_then(|message| message.content.clone())
                    .unwrap_or_default();
                Ok(ModelReply::text(content))
            }
            Some(ModelStep::Fail(status, summary)) => Err(ModelInvocationError::Status {
                status,
                summary: Some(summary.to_string()),
            }),
            None => Err(ModelInvocationError::Decode("script exhausted".to_string())),
        }
    }
}
