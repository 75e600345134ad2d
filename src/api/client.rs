use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::auth::{self, AuthMode};
use crate::config::{valid_temperature, Config};
use crate::error::{Error, Result};
use crate::thinking::ThinkingMode;
use crate::types::{ApiMessage, Content, MessageResponse, ModelList};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Hard per-model output caps, matched by model-id prefix. The configured
/// max_tokens is clamped to the matching cap; an unmatched model gets the
/// conservative default.
const MODEL_MAX_TOKENS: [(&str, u32); 7] = [
    ("claude-opus-4", 32_000),
    ("claude-sonnet-4", 64_000),
    ("claude-3-7-sonnet", 64_000),
    ("claude-3-5-sonnet", 8_192),
    ("claude-3-5-haiku", 8_192),
    ("claude-3-opus", 4_096),
    ("claude-3-haiku", 4_096),
];
const FALLBACK_MAX_TOKENS: u32 = 4_096;

/// Model families that accept `cache_control` markers on system blocks.
const CACHE_CONTROL_MODEL_PREFIXES: [&str; 5] = [
    "claude-opus-4",
    "claude-sonnet-4",
    "claude-3-7",
    "claude-3-5",
    "claude-haiku-4",
];

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, body: &Value) -> Result<ByteStream>;
}

#[cfg(test)]
pub trait MockResponseProducer: Send + Sync {
    fn create_mock_response(&self, body: &Value) -> Result<MessageResponse>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Config,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
    #[cfg(test)]
    mock_response_producer: Option<Arc<dyn MockResponseProducer>>,
}

impl ApiClient {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            http: reqwest::Client::new(),
            config,
            #[cfg(test)]
            mock_stream_producer: None,
            #[cfg(test)]
            mock_response_producer: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    #[cfg(test)]
    pub fn new_mock_stream(producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Config {
                api_key: Some("test-key".to_string()),
                model: "mock-model".to_string(),
                ..Config::default()
            },
            mock_stream_producer: Some(producer),
            mock_response_producer: None,
        }
    }

    #[cfg(test)]
    pub fn new_mock_response(producer: Arc<dyn MockResponseProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Config {
                api_key: Some("test-key".to_string()),
                model: "mock-model".to_string(),
                ..Config::default()
            },
            mock_stream_producer: None,
            mock_response_producer: Some(producer),
        }
    }

    #[cfg(test)]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Assemble a `POST /messages` body. Empty messages are dropped before
    /// serialization because the server rejects them, and thinking modes
    /// force temperature to 1.0.
    pub fn build_messages_body(
        &self,
        messages: &[ApiMessage],
        system: &[String],
        tools: Option<&Value>,
        mode: ThinkingMode,
        stream: bool,
    ) -> Value {
        let max_tokens = resolve_max_tokens(&self.config.model, self.config.max_tokens);
        let temperature = if mode.is_thinking() {
            1.0
        } else {
            valid_temperature(self.config.temperature)
        };
        let messages: Vec<&ApiMessage> = messages.iter().filter(|m| message_has_content(m)).collect();

        let mut body = json!({
            "model": self.config.model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "stream": stream,
            "messages": messages,
        });
        let object = body.as_object_mut().expect("body must be a JSON object");

        if !system.is_empty() {
            object.insert(
                "system".to_string(),
                system_blocks(system, &self.config.model),
            );
        }
        if let Some(tools) = tools {
            object.insert("tools".to_string(), tools.clone());
            object.insert("tool_choice".to_string(), json!({ "type": "auto" }));
        }

        mode.apply(&mut body, &self.config.thinking, max_tokens);
        body
    }

    /// Start a streaming request and return the raw byte stream. Non-success
    /// statuses are turned into errors before any bytes are yielded.
    pub async fn create_stream(&self, body: &Value) -> Result<ByteStream> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream(body);
            }
        }

        let url = self.messages_url();
        let response = self.post_messages(&url, body).await?;
        let response = check_status(response).await?;
        let stream = response.bytes_stream().map(|item| item.map_err(Error::from));
        Ok(Box::pin(stream))
    }

    /// Non-streaming request, used by the tool loop.
    pub async fn send_messages(&self, body: &Value) -> Result<MessageResponse> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_response_producer {
                return producer.create_mock_response(body);
            }
        }

        let url = self.messages_url();
        let response = self.post_messages(&url, body).await?;
        let response = check_status(response).await?;
        Ok(response.json::<MessageResponse>().await?)
    }

    /// List available model ids via `GET /models`.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = self.models_url();
        let auth = auth::resolve(&self.config, &self.http).await?;
        let mut request = self
            .http
            .get(&url)
            .header(auth.name, &auth.value)
            .header("anthropic-version", &self.config.anthropic_version);
        if auth.mode == AuthMode::Oauth {
            request = request.header("anthropic-beta", auth::OAUTH_BETA_HEADER);
        }

        let response = check_status(request.send().await?).await?;
        let list: ModelList = response.json().await?;
        Ok(list.data.into_iter().map(|model| model.id).collect())
    }

    async fn post_messages(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let auth = auth::resolve(&self.config, &self.http).await?;
        let mut request = self
            .http
            .post(url)
            .header("content-type", "application/json")
            .header(auth.name, &auth.value)
            .header("anthropic-version", &self.config.anthropic_version)
            .json(body);
        if auth.mode == AuthMode::Oauth {
            request = request.header("anthropic-beta", auth::OAUTH_BETA_HEADER);
        }

        if debug_payload_enabled() {
            emit_debug_payload(url, body);
        }

        Ok(request.send().await?)
    }

    fn messages_url(&self) -> String {
        format!("{}messages", self.config.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}models", self.config.base_url)
    }
}

fn message_has_content(message: &ApiMessage) -> bool {
    match &message.content {
        Content::Text(text) => !text.trim().is_empty(),
        Content::Blocks(blocks) => !blocks.is_empty(),
    }
}

/// System prompt as a block array, with a `cache_control` marker on the last
/// block for model families that support prompt caching.
fn system_blocks(system: &[String], model: &str) -> Value {
    let cacheable = should_use_cache_control(model);
    let last = system.len() - 1;
    let blocks: Vec<Value> = system
        .iter()
        .enumerate()
        .map(|(index, text)| {
            if cacheable && index == last {
                json!({
                    "type": "text",
                    "text": text,
                    "cache_control": { "type": "ephemeral" },
                })
            } else {
                json!({ "type": "text", "text": text })
            }
        })
        .collect();
    Value::Array(blocks)
}

fn should_use_cache_control(model: &str) -> bool {
    let model = model.to_lowercase();
    CACHE_CONTROL_MODEL_PREFIXES
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

fn resolve_max_tokens(model: &str, configured: u32) -> u32 {
    let model = model.to_lowercase();
    let cap = MODEL_MAX_TOKENS
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, cap)| *cap)
        .unwrap_or(FALLBACK_MAX_TOKENS);
    configured.min(cap)
}

/// Map a non-success response to an error. A 404 whose structured body names
/// a model becomes [`Error::ModelNotFound`]; everything else keeps the
/// status plus the best message the body offers.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status.as_u16() == 404 {
        if let Some(model) = parse_model_not_found(&body) {
            return Err(Error::ModelNotFound { model });
        }
    }
    Err(Error::Api {
        status: status.as_u16(),
        message: extract_error_message(&body),
    })
}

fn parse_model_not_found(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let error = parsed.get("error")?;
    if error.get("type")?.as_str()? != "not_found_error" {
        return None;
    }
    let message = error.get("message")?.as_str()?;
    let model = message.strip_prefix("model:")?.trim();
    if model.is_empty() {
        None
    } else {
        Some(model.to_string())
    }
}

fn extract_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        if let Some(error) = parsed.get("error") {
            let error_type = error.get("type").and_then(Value::as_str).unwrap_or("error");
            if let Some(message) = error.get("message").and_then(Value::as_str) {
                return format!("{error_type}: {message}");
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "<empty response body>".to_string()
    } else {
        trimmed.to_string()
    }
}
