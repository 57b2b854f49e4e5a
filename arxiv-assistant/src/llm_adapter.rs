use crate::types::{AssistantError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Trait for chat-completion backends the relevance filter can talk to
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier, used in logs
    fn model_name(&self) -> String;

    /// Send the conversation and return the assistant's full reply text
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub timeout_seconds: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo-16k".to_string(),
            temperature: 0.7,
            max_tokens: 512,
            stream: false,
            timeout_seconds: None,
        }
    }
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiCompletionClient {
    client: Client,
    config: LlmConfig,
    api_key: String,
}

impl OpenAiCompletionClient {
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AssistantError::Config("OpenAI API key is empty".to_string()));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        Ok(Self {
            client: builder.build()?,
            config,
            api_key,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "top_p": 1,
            "frequency_penalty": 0,
            "presence_penalty": 0,
        });
        if self.config.stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    fn model_name(&self) -> String {
        self.config.model.clone()
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!("Requesting completion from {} ({} messages)", self.config.model, messages.len());

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages))
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let content = if self.config.stream {
            parse_stream_body(&body)?
        } else {
            parse_completion_body(&body)?
        };

        info!("Completion from {}: {} chars", self.config.model, content.len());
        Ok(content)
    }
}

fn parse_completion_body(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body).map_err(|e| AssistantError::MalformedResponse {
        response: body.to_string(),
        reason: e.to_string(),
    })?;

    value["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AssistantError::MalformedResponse {
            response: body.to_string(),
            reason: "missing choices[0].message.content".to_string(),
        })
}

/// Concatenate the `delta.content` of every server-sent chunk up to
/// `data: [DONE]`.
pub fn parse_stream_body(body: &str) -> Result<String> {
    let mut content = String::new();

    for line in body.lines() {
        let Some(data) = line.trim().strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            break;
        }
        if data.is_empty() {
            continue;
        }

        let chunk: Value = serde_json::from_str(data).map_err(|e| AssistantError::MalformedResponse {
            response: data.to_string(),
            reason: format!("bad stream chunk: {}", e),
        })?;
        if let Some(piece) = chunk["choices"][0]["delta"]["content"].as_str() {
            content.push_str(piece);
        }
    }

    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_stream_deltas_until_done() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"[3, \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"1]\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        assert_eq!(parse_stream_body(body).unwrap(), "[3, 1]");
    }

    #[test]
    fn missing_content_is_malformed() {
        let err = parse_completion_body(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, AssistantError::MalformedResponse { .. }));
    }

    #[test]
    fn stream_flag_only_sent_when_enabled() {
        let client = OpenAiCompletionClient::new(LlmConfig::default(), "sk-test").unwrap();
        let body = client.request_body(&[ChatMessage::user("hi")]);
        assert!(body.get("stream").is_none());
        assert_eq!(body["top_p"], 1);
        assert_eq!(body["messages"][0]["role"], "user");

        let config = LlmConfig {
            stream: true,
            ..LlmConfig::default()
        };
        let client = OpenAiCompletionClient::new(config, "sk-test").unwrap();
        assert_eq!(client.request_body(&[])["stream"], true);
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(OpenAiCompletionClient::new(LlmConfig::default(), " ").is_err());
    }
}
