//! OpenAI-compatible model backend.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/chat/completions`.
//!
//! When the model answers with a native tool call, the first call is
//! re-encoded as `{"tool_name": ..., "args": {...}}` JSON text so the agent
//! language can parse it like any other response.

use async_trait::async_trait;
use gamekit_config::AppConfig;
use gamekit_core::error::ProviderError;
use gamekit_core::model::LanguageModel;
use gamekit_core::prompt::{Prompt, PromptMessage, PromptRole, ToolSchema};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub struct OpenAiCompatModel {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatModel {
    /// Create a backend for `model` at `base_url`.
    ///
    /// `timeout` bounds each request; `None` waits indefinitely.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ProviderError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            client,
        })
    }

    /// Build from application config. Fails if no API key is available.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(
                "no API key; set GAMEKIT_API_KEY or api_key in config.toml".into(),
            )
        })?;
        let timeout = (config.request_timeout_secs > 0)
            .then(|| Duration::from_secs(config.request_timeout_secs));

        Ok(Self::new("openai", &config.api_url, api_key, &config.model, timeout)?
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_api_messages(messages: &[PromptMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    PromptRole::System => "system".into(),
                    PromptRole::User => "user".into(),
                    PromptRole::Assistant => "assistant".into(),
                },
                content: m.content.clone(),
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolSchema]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(&self, prompt: &Prompt) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(prompt.messages()),
            "temperature": self.temperature,
        });

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !prompt.tools().is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(prompt.tools()));
        }

        body
    }

    /// Turn the first choice into response text.
    fn response_text(api_response: ApiResponse) -> Result<String, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        if let Some(call) = choice.message.tool_calls.and_then(|calls| calls.into_iter().next()) {
            let args: serde_json::Value =
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    ProviderError::InvalidResponse(format!(
                        "tool call arguments for '{}' are not JSON: {e}",
                        call.function.name
                    ))
                })?;
            let encoded = serde_json::json!({
                "tool_name": call.function.name,
                "args": args,
            });
            return Ok(encoded.to_string());
        }

        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(prompt);

        debug!(
            provider = %self.name,
            model = %self.model,
            messages = prompt.messages().len(),
            tools = prompt.tools().len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        Self::response_text(api_response)
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> OpenAiCompatModel {
        OpenAiCompatModel::new(
            "openai",
            "https://api.openai.com/v1/",
            "sk-test",
            "gpt-4o-mini",
            None,
        )
        .unwrap()
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(backend().base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn from_config_requires_key() {
        let config = AppConfig::default();
        assert!(matches!(
            OpenAiCompatModel::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));

        let config = AppConfig {
            api_key: Some("sk-test".into()),
            model: "gpt-4o".into(),
            ..AppConfig::default()
        };
        let model = OpenAiCompatModel::from_config(&config).unwrap();
        assert_eq!(model.model(), "gpt-4o");
        assert_eq!(model.max_tokens, Some(config.max_tokens));
    }

    #[test]
    fn request_body_includes_tools_only_when_present() {
        let model = backend();
        let plain = model.request_body(&Prompt::system_and_user("sys", "hi"));
        assert!(plain.get("tools").is_none());
        assert_eq!(plain["messages"][0]["role"], "system");

        let with_tools = Prompt::new(
            vec![PromptMessage::user("read it")],
            vec![ToolSchema {
                name: "read_file".into(),
                description: "Read a file".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            serde_json::Map::new(),
        );
        let body = model.request_body(&with_tools);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "read_file");
    }

    #[test]
    fn tool_call_is_reencoded() {
        let raw = r#"{"choices":[{"message":{"content":null,"tool_calls":[
            {"id":"call_1","type":"function","function":{"name":"read_file","arguments":"{\"file_name\":\"a.txt\"}"}}
        ]}}]}"#;
        let api: ApiResponse = serde_json::from_str(raw).unwrap();
        let text = OpenAiCompatModel::response_text(api).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["tool_name"], "read_file");
        assert_eq!(parsed["args"]["file_name"], "a.txt");
    }

    #[test]
    fn plain_content_passes_through() {
        let raw = r#"{"choices":[{"message":{"content":"All done."}}]}"#;
        let api: ApiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(OpenAiCompatModel::response_text(api).unwrap(), "All done.");
    }

    #[test]
    fn empty_choices_is_invalid() {
        let api: ApiResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            OpenAiCompatModel::response_text(api),
            Err(ProviderError::InvalidResponse(_))
        ));
    }
}
