//! Chat-completion transports with a single declared tool.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::settings::ModelSettings;

/// A function the model may call, with its JSON Schema parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    fn as_tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// What the model answered. Tool arguments are left as raw JSON; some
/// providers send an object, others a JSON-encoded string.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    ToolCall { name: String, arguments: Value },
    TextReply { text: String },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("model transport is not configured")]
    NotConfigured,
    #[error("model endpoint answered with HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("model request failed")]
    Http(#[from] reqwest::Error),
    #[error("unexpected model response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ModelTransport: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn invoke_with_tool(
        &self,
        system_prompt: &str,
        user_text: &str,
        tool: &ToolSpec,
    ) -> Result<ModelReply, TransportError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Ollama,
    OpenAi,
}

pub struct ChatTransport {
    client: reqwest::Client,
    provider: Provider,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    enabled: bool,
}

impl ChatTransport {
    pub fn new(settings: &ModelSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            provider: settings.provider,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.trim().to_string(),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
            temperature: settings.temperature,
            enabled: settings.enabled,
        })
    }

    fn messages(system_prompt: &str, user_text: &str) -> Value {
        json!([
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_text },
        ])
    }

    async fn post(&self, url: String, body: Value) -> Result<reqwest::Response, TransportError> {
        let mut request = self.client.post(url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }
        Ok(response)
    }

    async fn ollama(
        &self,
        system_prompt: &str,
        user_text: &str,
        tool: &ToolSpec,
    ) -> Result<ModelReply, TransportError> {
        let body = json!({
            "model": self.model,
            "messages": Self::messages(system_prompt, user_text),
            "tools": [tool.as_tool()],
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let response: OllamaResponse = self
            .post(format!("{}/api/chat", self.base_url), body)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        Ok(response.message.into_reply())
    }

    async fn openai(
        &self,
        system_prompt: &str,
        user_text: &str,
        tool: &ToolSpec,
    ) -> Result<ModelReply, TransportError> {
        let body = json!({
            "model": self.model,
            "messages": Self::messages(system_prompt, user_text),
            "tools": [tool.as_tool()],
            "tool_choice": "auto",
            "temperature": self.temperature,
        });
        let response: OpenAiResponse = self
            .post(format!("{}/chat/completions", self.base_url), body)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.into_reply())
            .ok_or_else(|| TransportError::Malformed("no choices".to_string()))
    }
}

#[async_trait]
impl ModelTransport for ChatTransport {
    fn is_configured(&self) -> bool {
        self.enabled
            && !self.model.is_empty()
            && (self.provider != Provider::OpenAi || self.api_key.is_some())
    }

    #[instrument(name = "model_call", skip_all, fields(provider = ?self.provider, model = %self.model))]
    async fn invoke_with_tool(
        &self,
        system_prompt: &str,
        user_text: &str,
        tool: &ToolSpec,
    ) -> Result<ModelReply, TransportError> {
        if !self.is_configured() {
            return Err(TransportError::NotConfigured);
        }
        let reply = match self.provider {
            Provider::Ollama => self.ollama(system_prompt, user_text, tool).await?,
            Provider::OpenAi => self.openai(system_prompt, user_text, tool).await?,
        };
        debug!(?reply, "Model replied");
        Ok(reply)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallPayload>,
}

#[derive(Debug, Deserialize)]
struct ToolCallPayload {
    function: FunctionPayload,
}

#[derive(Debug, Deserialize)]
struct FunctionPayload {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl ChatMessage {
    /// The first tool call wins; otherwise the text content is the reply.
    fn into_reply(self) -> ModelReply {
        match self.tool_calls.into_iter().next() {
            Some(call) => ModelReply::ToolCall {
                name: call.function.name,
                arguments: call.function.arguments,
            },
            None => ModelReply::TextReply {
                text: self.content.unwrap_or_default(),
            },
        }
    }
}
