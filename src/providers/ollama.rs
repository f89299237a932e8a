use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::ProviderError;
use crate::providers::{BatchItem, Provider, decode_items, encode_items, request_error, status_error};

/// Default Ollama server address
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Ollama client for interacting with Ollama API
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API, always ending in `/`
    base_url: Url,
    /// Model used for translation
    model: String,
    /// HTTP client for making requests
    client: Client,
    /// Per-request timeout
    timeout: Duration,
    /// Sampling temperature
    temperature: f32,
}

/// Chat message object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user or assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Chat request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model name to use for generation
    model: String,
    /// Messages of the conversation
    messages: Vec<ChatMessage>,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
    /// Whether to stream the response
    stream: bool,
}

/// Chat response from the Ollama API
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    /// Model name
    #[serde(default)]
    pub model: String,
    /// Response message
    pub message: ChatMessage,
    /// Number of prompt tokens
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    /// Number of generated tokens
    #[serde(default)]
    pub eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

impl Ollama {
    /// Create a new Ollama client
    ///
    /// `endpoint` is the server root, e.g. `http://localhost:11434`.
    pub fn new(endpoint: &str, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = parse_base_url(endpoint)?;

        let client = Client::builder()
            .timeout(timeout)
            // Ollama speaks HTTP/1.1
            .http1_only()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url,
            model: model.into(),
            client,
            timeout,
            temperature: 0.3,
        })
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::RequestFailed(format!("Invalid Ollama URL: {}", e)))
    }

    /// Chat with the Ollama API
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = self.api_url("api/chat")?;

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Ollama API error ({}): {}", status, error_text);
            return Err(status_error(status.as_u16(), error_text));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| request_error(e, self.timeout))?;

        parse_chat_response(&response_text)
    }
}

#[async_trait]
impl Provider for Ollama {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn send_batch(
        &self,
        units: &[BatchItem],
        system_prompt: &str,
    ) -> Result<Vec<BatchItem>, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: encode_items(units)?,
                },
            ],
            options: Some(ChatOptions {
                temperature: Some(self.temperature),
            }),
            stream: false,
        };

        let response = self.chat(&request).await?;
        debug!(
            "Ollama answered {} units (prompt tokens: {:?}, completion tokens: {:?})",
            units.len(),
            response.prompt_eval_count,
            response.eval_count
        );

        decode_items(&response.message.content)
    }

    async fn validate_key(&self) -> Result<bool, ProviderError> {
        // A local server has no credentials; reachability is what matters
        let url = self.api_url("api/version")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;

        Ok(response.status().is_success())
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = self.api_url("api/tags")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), error_text));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse Ollama tags: {}", e)))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Parse an endpoint into a base URL that relative API paths can be joined onto
fn parse_base_url(endpoint: &str) -> Result<Url> {
    let endpoint = if endpoint.trim().is_empty() {
        DEFAULT_ENDPOINT
    } else {
        endpoint.trim()
    };

    let with_scheme = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };

    let mut url = Url::parse(&with_scheme).with_context(|| format!("Invalid Ollama endpoint: {}", endpoint))?;
    if url.cannot_be_a_base() {
        return Err(anyhow!("Ollama endpoint cannot be used as a base URL: {}", endpoint));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Parse a non-streaming chat response, falling back to concatenating a JSONL stream
fn parse_chat_response(response_text: &str) -> Result<ChatResponse, ProviderError> {
    if let Ok(chat_response) = serde_json::from_str::<ChatResponse>(response_text) {
        return Ok(chat_response);
    }

    // Some servers stream even when asked not to
    let mut content = String::new();
    let mut last: Option<ChatResponse> = None;
    for line in response_text.lines().filter(|l| !l.trim().is_empty()) {
        let chunk = serde_json::from_str::<ChatResponse>(line).map_err(|e| {
            ProviderError::ParseError(format!("Failed to parse Ollama chat response: {}", e))
        })?;
        content.push_str(&chunk.message.content);
        last = Some(chunk);
    }

    let mut response =
        last.ok_or_else(|| ProviderError::ParseError("Empty Ollama chat response".to_string()))?;
    response.message.content = content;
    Ok(response)
}
