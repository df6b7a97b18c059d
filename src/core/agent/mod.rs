//! The policy-constrained agent: a chat model driving the MCP tools of one
//! session through a bounded tool loop.

use crate::api::{ChatMessage, ChatToolCall, ChatToolDefinition, ChatToolFunction};
use crate::core::failure::{FailureKind, FailureOrigin, FailureRecord};
use crate::core::model::{ChatModel, ModelInvocationError, ModelRequest};
use crate::core::policy::{ToolPolicy, SAFETY_INSTRUCTIONS};
use crate::mcp::catalog::ToolCatalog;
use crate::mcp::operations::call_tool;
use crate::mcp::transport::McpTransport;
use async_trait::async_trait;
use rust_mcp_schema::Tool;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use tracing::debug;


const NO_ANSWER: &str = "I don't have an answer for that.";
const SKIPPED_RESULT: &str = "Skipped: the turn ended before this call ran.";

/// Answers one utterance at a time, keeping its own conversation memory.
#[async_trait]
pub trait ConversationAgent: Send {
    async fn respond(&mut self, utterance: &str) -> Result<AgentReply, AgentError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub text: String,
    /// Failures observed while answering, oldest first.
    pub failures: Vec<FailureRecord>,
}

#[derive(Debug)]
pub enum AgentError {
    Model(ModelInvocationError),
    /// The model still wanted tools after the last allowed round.
    ToolRoundsExhausted { rounds: usize },
}

impl AgentError {
    pub fn failure(&self) -> FailureRecord {
        match self {
            AgentError::Model(err) => FailureRecord::new(FailureOrigin::Model, err.to_string()),
            AgentError::ToolRoundsExhausted { .. } => FailureRecord::with_kind(
                FailureOrigin::Model,
                FailureKind::TurnLimit,
                self.to_string(),
            ),
        }
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Model(err) => write!(f, "{err}"),
            AgentError::ToolRoundsExhausted { rounds } => {
                write!(f, "Model requested tools after {rounds} rounds")
            }
        }
    }
}

impl StdError for AgentError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            AgentError::Model(err) => Some(err),
            AgentError::ToolRoundsExhausted { .. } => None,
        }
    }
}

impl From<ModelInvocationError> for AgentError {
    fn from(err: ModelInvocationError) -> Self {
        AgentError::Model(err)
    }
}

/// Result of one requested call, as seen by the loop.
enum CallOutcome {
    /// Fed back to the model as the tool message.
    Continue(String),
    /// Ends the turn with the failure's message.
    Stop(FailureRecord),
}

pub struct ToolAgent {
    model: Arc<dyn ChatModel>,
    transport: Arc<dyn McpTransport>,
    catalog: Arc<ToolCatalog>,
    policy: ToolPolicy,
    offered: Vec<ChatToolDefinition>,
    validators: HashMap<String, jsonschema::Validator>,
    history: Vec<ChatMessage>,
    max_tool_rounds: usize,
}

impl ToolAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        transport: Arc<dyn McpTransport>,
        catalog: Arc<ToolCatalog>,
        policy: ToolPolicy,
        max_tool_rounds: usize,
    ) -> Self {
        let mut offered = Vec::new();
        let mut validators = HashMap::new();
        for tool in catalog.iter().filter(|tool| policy.permits(&tool.name)) {
            let schema = input_schema(tool);
            match jsonschema::validator_for(&schema) {
                Ok(validator) => {
                    validators.insert(tool.name.clone(), validator);
                }
                Err(_) => debug!(tool = %tool.name, "Tool input schema is not usable for validation"),
            }
            offered.push(tool_definition(tool, schema));
        }
        debug!(
            catalog = catalog.len(),
            offered = offered.len(),
            "Tool agent ready"
        );

        Self {
            model,
            transport,
            catalog,
            policy,
            offered,
            validators,
            history: Vec::new(),
            max_tool_rounds: max_tool_rounds.max(1),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    async fn run_turn(&mut self) -> Result<AgentReply, AgentError> {
        let mut failures = Vec::new();
        let mut failed_calls: HashSet<String> = HashSet::new();

        for round in 0..self.max_tool_rounds {
            let last_round = round + 1 == self.max_tool_rounds;
            let tools: &[ChatToolDefinition] = if last_round { &[] } else { &self.offered };
            let reply = self
                .model
                .complete(ModelRequest {
                    instructions: SAFETY_INSTRUCTIONS,
                    messages: &self.history,
                    tools,
                })
                .await?;

            if reply.tool_calls.is_empty() {
                let text = reply
                    .content
                    .filter(|content| !content.trim().is_empty())
                    .or_else(|| failures.last().map(|failure: &FailureRecord| failure.user_message.clone()))
                    .unwrap_or_else(|| NO_ANSWER.to_string());
                self.history.push(ChatMessage::assistant(text.clone()));
                return Ok(AgentReply { text, failures });
            }

            if last_round {
                return Err(AgentError::ToolRoundsExhausted {
                    rounds: self.max_tool_rounds,
                });
            }

            let calls = reply.tool_calls;
            self.history.push(ChatMessage::assistant_tool_calls(
                reply.content,
                calls.clone(),
            ));

            if let Some(refused) = calls.iter().find(|call| !self.policy.permits(&call.function.name)) {
                debug!(tool = %refused.function.name, "Refusing tool outside read-only policy");
                let record = FailureRecord::with_kind(
                    FailureOrigin::Tool,
                    FailureKind::ReadOnlyRefusal,
                    String::new(),
                );
                return Ok(self.finish_early(&calls, 0, record, failures));
            }

            for (index, call) in calls.iter().enumerate() {
                match self.execute_call(call, &mut failed_calls, &mut failures).await {
                    CallOutcome::Continue(content) => {
                        self.history
                            .push(ChatMessage::tool_result(call.id.clone(), content));
                    }
                    CallOutcome::Stop(record) => {
                        return Ok(self.finish_early(&calls, index, record, failures));
                    }
                }
            }
        }

        Err(AgentError::ToolRoundsExhausted {
            rounds: self.max_tool_rounds,
        })
    }

    async fn execute_call(
        &self,
        call: &ChatToolCall,
        failed_calls: &mut HashSet<String>,
        failures: &mut Vec<FailureRecord>,
    ) -> CallOutcome {
        let name = call.function.name.as_str();
        if self.catalog.get(name).is_none() {
            return CallOutcome::Continue(format!("Tool `{name}` is not available."));
        }

        let arguments = match parse_tool_arguments(&call.function.arguments) {
            Ok(arguments) => arguments,
            Err(err) => return CallOutcome::Continue(format!("Invalid arguments: {err}")),
        };
        if let Err(err) = self.validate_arguments(name, arguments.as_ref()) {
            return CallOutcome::Continue(format!("Invalid arguments: {err}"));
        }

        let call_key = format!("{name}:{}", canonical_arguments(arguments.as_ref()));
        if failed_calls.contains(&call_key) {
            debug!(tool = %name, "Not repeating failed tool call");
            return CallOutcome::Continue(
                "This exact call already failed in this turn and was not repeated.".to_string(),
            );
        }

        debug!(tool = %name, "Calling MCP tool");
        let record = match call_tool(self.transport.as_ref(), name, arguments).await {
            Ok(output) if !output.is_error => return CallOutcome::Continue(output.text),
            Ok(output) => FailureRecord::new(FailureOrigin::Tool, output.text),
            Err(err) => FailureRecord::from_transport(&err),
        };
        debug!(tool = %name, kind = %record.kind, "MCP tool call failed");

        failed_calls.insert(call_key);
        failures.push(record.clone());
        if record.kind == FailureKind::EmptyResource {
            return CallOutcome::Stop(record);
        }
        CallOutcome::Continue(failure_result(&record))
    }

    fn validate_arguments(
        &self,
        name: &str,
        arguments: Option<&Map<String, Value>>,
    ) -> Result<(), String> {
        let Some(validator) = self.validators.get(name) else {
            return Ok(());
        };
        let instance = Value::Object(arguments.cloned().unwrap_or_default());
        let errors: Vec<String> = validator
            .iter_errors(&instance)
            .map(|err| err.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }

    /// Answers every call from `from` on, records the stopping failure and
    /// closes the turn with its message.
    fn finish_early(
        &mut self,
        calls: &[ChatToolCall],
        from: usize,
        record: FailureRecord,
        mut failures: Vec<FailureRecord>,
    ) -> AgentReply {
        for (offset, call) in calls[from..].iter().enumerate() {
            let content = if offset == 0 {
                failure_result(&record)
            } else {
                SKIPPED_RESULT.to_string()
            };
            self.history
                .push(ChatMessage::tool_result(call.id.clone(), content));
        }

        let text = record.user_message.clone();
        self.history.push(ChatMessage::assistant(text.clone()));
        if failures.last() != Some(&record) {
            failures.push(record);
        }
        AgentReply { text, failures }
    }
}

#[async_trait]
impl ConversationAgent for ToolAgent {
    async fn respond(&mut self, utterance: &str) -> Result<AgentReply, AgentError> {
        let checkpoint = self.history.len();
        self.history.push(ChatMessage::user(utterance));
        let result = self.run_turn().await;
        if result.is_err() {
            self.history.truncate(checkpoint);
        }
        result
    }
}

fn input_schema(tool: &Tool) -> Value {
    serde_json::to_value(&tool.input_schema)
        .unwrap_or_else(|_| json!({"type": "object", "properties": {}}))
}

fn tool_definition(tool: &Tool, parameters: Value) -> ChatToolDefinition {
    ChatToolDefinition {
        kind: "function".to_string(),
        function: ChatToolFunction {
            name: tool.name.clone(),
            description: tool.description.clone().or_else(|| tool.title.clone()),
            parameters,
        },
    }
}

fn parse_tool_arguments(raw: &str) -> Result<Option<Map<String, Value>>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(trimmed).map_err(|err| err.to_string())?;
    match value {
        Value::Object(map) => Ok(Some(map)),
        _ => Err("Tool arguments must be a JSON object.".to_string()),
    }
}

/// Key-sorted copy so equal arguments compare equal regardless of order.
fn canonical_arguments(arguments: Option<&Map<String, Value>>) -> Value {
    fn canonical(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                Value::Object(
                    entries
                        .into_iter()
                        .map(|(key, value)| (key.clone(), canonical(value)))
                        .collect(),
                )
            }
            Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
            other => other.clone(),
        }
    }

    arguments
        .map(|map| canonical(&Value::Object(map.clone())))
        .unwrap_or_else(|| Value::Object(Map::new()))
}

/// Model-visible form of a failure. Raw detail stays out of the history.
fn failure_result(record: &FailureRecord) -> String {
    json!({
        "error": record.kind.as_str(),
        "message": record.user_message,
    })
    .to_string()
}
