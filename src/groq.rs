//! Groq chat-completions client (OpenAI-compatible wire format)
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::config::GROQ_API_KEY;
use crate::error::CopilotError;
use crate::http::ProviderClient;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

const PROVIDER: &str = "Groq";
const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Reusable Groq client (connection-pooled)
pub struct GroqClient {
    http: ProviderClient,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl GroqClient {
    pub fn new(api_key: Option<String>, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: ProviderClient::new(PROVIDER, timeout)?,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// One completion round. Returns the first choice's message.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
    ) -> Result<ChatMessage> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(CopilotError::CredentialMissing(GROQ_API_KEY))?;

        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            tool_choice: if tools.is_empty() { None } else { Some("auto") },
            parallel_tool_calls: if tools.is_empty() { None } else { Some(false) },
            tools,
            temperature: 0.1,
            max_tokens: 2048,
        };

        info!(model = %self.model, messages = request.messages.len(), "Calling Groq API");

        let body = self
            .http
            .send_json(
                self.http
                    .post(&self.endpoint)
                    .bearer_auth(api_key)
                    .json(&request),
            )
            .await
            .map_err(|e| match e {
                CopilotError::RateLimit { .. } => CopilotError::LlmError(
                    "reasoning engine is rate limited, retry shortly".to_string(),
                ),
                other => {
                    error!("Groq API request failed: {}", other);
                    CopilotError::LlmError(format!("Groq API error: {}", other))
                }
            })?;

        let response: ChatCompletionResponse = serde_json::from_value(body).map_err(|e| {
            error!("Failed to parse Groq response: {}", e);
            CopilotError::LlmError(format!("Groq parse error: {}", e))
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CopilotError::LlmError("No response from Groq API".to_string()))?;

        info!(
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            tool_calls = choice.message.tool_calls.as_ref().map_or(0, Vec::len),
            "Groq response received"
        );

        Ok(choice.message)
    }
}

//
// ================= Wire types =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_call(call: WireToolCall) -> Self {
        Self {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(vec![call]),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: &str, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: WireFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireFunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as sent by the model
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            kind: "function",
            function: FunctionDefinition {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}
