use crate::api::{ChatCompletionResponse, ChatMessage, ChatRequest};
use crate::core::config::ModelConfig;
use crate::core::model::{ChatModel, ModelInvocationError, ModelReply, ModelRequest};
use crate::utils::url::construct_api_url;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Non-streaming client for an OpenAI-compatible `chat/completions` endpoint.
pub struct ChatCompletionsModel {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsModel {
    pub fn from_config<F>(config: &ModelConfig, lookup: F) -> Result<Self, ModelInvocationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(&config.api_key_env)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ModelInvocationError::MissingApiKey(config.api_key_env.clone()))?;

        let mut builder = reqwest::Client::builder();
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }

        Ok(Self {
            client: builder.build()?,
            url: construct_api_url(&config.base_url, "chat/completions"),
            api_key,
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatModel for ChatCompletionsModel {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply, ModelInvocationError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatMessage::system(request.instructions));
        messages.extend(request.messages.iter().cloned());

        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            tools: (!request.tools.is_empty()).then_some(request.tools),
        };

        debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = request.tools.len(),
            "Requesting chat completion"
        );

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ModelInvocationError::Status {
                status: status.as_u16(),
                summary: serde_json::from_str::<serde_json::Value>(&text)
                    .ok()
                    .and_then(|value| extract_error_summary(&value)),
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|err| ModelInvocationError::Decode(err.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelInvocationError::Decode("response had no choices".to_string()))?;

        debug!(
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            tool_calls = choice.message.tool_calls.as_ref().map_or(0, Vec::len),
            "Received chat completion"
        );

        Ok(ModelReply {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
        })
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
}
