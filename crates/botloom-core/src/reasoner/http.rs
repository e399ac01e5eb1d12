//! HTTP reasoner - Anthropic Messages API or an OpenAI-compatible
//! chat completions endpoint.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ReasonRequest, Reasoner, ReasonerConfig, ReasonerError};

pub struct HttpReasoner {
    client: reqwest::Client,
    config: ReasonerConfig,
}

impl HttpReasoner {
    pub fn new(config: ReasonerConfig) -> Result<Self, ReasonerError> {
        match config.adapter.as_str() {
            "anthropic" | "openai" => {}
            other => {
                return Err(ReasonerError::Config(format!(
                    "Unknown adapter type: '{}'",
                    other
                )))
            }
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| ReasonerError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ReasonerConfig {
        &self.config
    }

    fn api_key(&self) -> Result<&str, ReasonerError> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ReasonerError::Config("no API key configured".into()))
    }

    /// POST {base_url}/v1/messages
    fn anthropic_body(&self, request: &ReasonRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": messages,
        });
        if let Some(system) = &request.system {
            body["system"] = Value::String(system.clone());
        }
        if let Some(temp) = self.config.temperature {
            body["temperature"] = json!(temp);
        }
        body
    }

    /// POST {base_url}/chat/completions
    fn openai_body(&self, request: &ReasonRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.extend(
            request
                .messages
                .iter()
                .map(|m| json!({ "role": m.role.as_str(), "content": m.content })),
        );

        let mut body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": messages,
        });
        if let Some(temp) = self.config.temperature {
            body["temperature"] = json!(temp);
        }
        body
    }

    async fn post(&self, builder: reqwest::RequestBuilder, body: &Value) -> Result<Value, ReasonerError> {
        let response = builder
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ReasonerError::Http(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ReasonerError::Http(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(ReasonerError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| ReasonerError::Parse(e.to_string()))
    }
}

#[async_trait]
impl Reasoner for HttpReasoner {
    async fn complete(&self, request: ReasonRequest) -> Result<String, ReasonerError> {
        let key = self.api_key()?;
        let base = self.config.base_url.trim_end_matches('/');

        tracing::info!(
            "[Reasoner] calling {} adapter (model: {})",
            self.config.adapter,
            self.config.model
        );

        if self.config.adapter == "openai" {
            let url = format!("{}/chat/completions", base);
            let builder = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", key));
            let json = self.post(builder, &self.openai_body(&request)).await?;
            extract_openai_text(&json)
        } else {
            let url = format!("{}/v1/messages", base);
            let builder = self
                .client
                .post(&url)
                .header("x-api-key", key)
                .header("anthropic-version", "2023-06-01");
            let json = self.post(builder, &self.anthropic_body(&request)).await?;
            extract_anthropic_text(&json)
        }
    }
}

fn extract_anthropic_text(json: &Value) -> Result<String, ReasonerError> {
    json.get("content")
        .and_then(|c| c.as_array())
        .and_then(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .map(str::to_string)
                .reduce(|a, b| format!("{}\n{}", a, b))
        })
        .ok_or_else(|| ReasonerError::Parse("response has no text content".into()))
}

fn extract_openai_text(json: &Value) -> Result<String, ReasonerError> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.pointer("/message/content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| ReasonerError::Parse("response has no message content".into()))
}
