//! Chat-completion backends. `OllamaBackend` talks to a local Ollama
//! server; `OpenAIBackend` talks to any OpenAI-compatible endpoint
//! (OpenAI, Azure OpenAI, vLLM, local servers). Both are stateless:
//! each call carries its own system and user prompt, no session
//! context is retained between calls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::LlmError;

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// How long Ollama keeps the model loaded between calls.
    pub keep_alive: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5:14b-instruct".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            keep_alive: "5m".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub tokens: usize,
    pub total_time_ms: u64,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Error,
    Cancelled,
}

/// A chat backend: the lower-level HTTP integration that `PromptGenerator`
/// sits on top of to satisfy `policyrag_core::traits::Generator`.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<GenerationResult, LlmError>;

    async fn generate_stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: usize,
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError>;

    fn model_name(&self) -> &str;
}

#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }

    fn request(&self, system_prompt: &str, user_prompt: &str, temperature: f32, max_tokens: usize, stream: bool) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                OllamaMessage { role: "system".into(), content: system_prompt.to_string() },
                OllamaMessage { role: "user".into(), content: user_prompt.to_string() },
            ],
            stream,
            options: Some(OllamaOptions {
                temperature: Some(temperature),
                num_predict: Some(max_tokens as i32),
            }),
            keep_alive: Some(self.config.keep_alive.clone()),
        }
    }

    async fn execute(&self, request: &OllamaChatRequest) -> Result<OllamaChatResponse, LlmError> {
        let response = self.client.post(self.api_url("/chat")).json(request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(LlmError::Network(format!("server error {}: {}", status, body)));
            }
            return Err(LlmError::Api(body));
        }
        response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    fn is_retryable(error: &LlmError) -> bool {
        matches!(error, LlmError::Network(_) | LlmError::Timeout)
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();
        let request = self.request(system_prompt, user_prompt, temperature, max_tokens, false);

        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(?backoff, attempt, "generation request failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            match self.execute(&request).await {
                Ok(result) => {
                    return Ok(GenerationResult {
                        text: result.message.content,
                        tokens: result.eval_count.unwrap_or(0) as usize,
                        total_time_ms: start.elapsed().as_millis() as u64,
                        finish_reason: if result.done { FinishReason::Stop } else { FinishReason::Length },
                    });
                }
                Err(e) if Self::is_retryable(&e) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| LlmError::Network("max retries exceeded".to_string())))
    }

    async fn generate_stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: usize,
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();
        let request = self.request(system_prompt, user_prompt, temperature, max_tokens, true);

        let response = self.client.post(self.api_url("/chat")).json(&request).send().await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(body));
        }

        use futures::StreamExt;
        let mut stream = response.bytes_stream();
        let mut full_response = String::new();
        let mut total_tokens = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let text = String::from_utf8_lossy(&chunk);
            for line in text.lines() {
                if line.is_empty() {
                    continue;
                }
                if let Ok(parsed) = serde_json::from_str::<OllamaStreamChunk>(line) {
                    let token = parsed.message.content;
                    full_response.push_str(&token);
                    total_tokens += 1;
                    if tx.send(token).await.is_err() {
                        return Ok(GenerationResult {
                            text: full_response,
                            tokens: total_tokens,
                            total_time_ms: start.elapsed().as_millis() as u64,
                            finish_reason: FinishReason::Cancelled,
                        });
                    }
                    if parsed.done {
                        break;
                    }
                }
            }
        }

        Ok(GenerationResult {
            text: full_response,
            tokens: total_tokens,
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: FinishReason::Stop,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    done: bool,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    message: OllamaMessage,
    done: bool,
}

// ---------------------------------------------------------------------
// OpenAI-compatible backend (OpenAI, Azure OpenAI, vLLM, local servers)
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub organization: Option<String>,
    pub api_version: Option<String>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(60),
            organization: None,
            api_version: None,
        }
    }
}

impl OpenAIConfig {
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), model: model.into(), ..Default::default() }
    }

    pub fn azure(endpoint: impl Into<String>, api_key: impl Into<String>, deployment: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: deployment.into(),
            api_version: Some(api_version.into()),
            ..Default::default()
        }
    }

    pub fn local(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), api_key: "not-needed".to_string(), model: model.into(), ..Default::default() }
    }
}

pub struct OpenAIBackend {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() && !config.endpoint.starts_with("http://localhost") {
            return Err(LlmError::Configuration("API key required for remote endpoints".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        if let Some(ref api_version) = self.config.api_version {
            format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.config.endpoint.trim_end_matches('/'),
                self.config.model,
                api_version
            )
        } else {
            format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
        }
    }

    fn build_headers(&self) -> reqwest::header::HeaderMap {
        use reqwest::header::HeaderValue;
        let mut headers = reqwest::header::HeaderMap::new();
        if self.config.api_version.is_some() {
            if let Ok(val) = HeaderValue::from_str(&self.config.api_key) {
                headers.insert("api-key", val);
            }
        } else if let Ok(val) = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key)) {
            headers.insert(reqwest::header::AUTHORIZATION, val);
        }
        if let Some(ref org) = self.config.organization {
            if let Ok(val) = HeaderValue::from_str(org) {
                headers.insert("OpenAI-Organization", val);
            }
        }
        headers.insert(reqwest::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn messages(system_prompt: &str, user_prompt: &str) -> Vec<OpenAIMessage> {
        vec![
            OpenAIMessage { role: "system".into(), content: system_prompt.to_string() },
            OpenAIMessage { role: "user".into(), content: user_prompt.to_string() },
        ]
    }
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();
        let request = OpenAIChatRequest {
            model: self.config.model.clone(),
            messages: Self::messages(system_prompt, user_prompt),
            max_tokens: Some(max_tokens),
            temperature: Some(temperature),
            stream: Some(false),
        };

        let response = self.client.post(&self.chat_url()).headers(self.build_headers()).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let parsed: OpenAIChatResponse = response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let choice = parsed.choices.first().ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;
        let tokens = parsed.usage.map(|u| u.completion_tokens).unwrap_or(0);

        Ok(GenerationResult {
            text: choice.message.content.clone(),
            tokens,
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: match choice.finish_reason.as_deref() {
                Some("length") => FinishReason::Length,
                _ => FinishReason::Stop,
            },
        })
    }

    async fn generate_stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: usize,
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();
        let request = OpenAIChatRequest {
            model: self.config.model.clone(),
            messages: Self::messages(system_prompt, user_prompt),
            max_tokens: Some(max_tokens),
            temperature: Some(temperature),
            stream: Some(true),
        };

        let response = self.client.post(&self.chat_url()).headers(self.build_headers()).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        use futures::StreamExt;
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut full_text = String::new();
        let mut token_count = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();
                if line.is_empty() || line == "data: [DONE]" {
                    continue;
                }
                if let Some(json_str) = line.strip_prefix("data: ") {
                    if let Ok(chunk) = serde_json::from_str::<OpenAIStreamChunk>(json_str) {
                        if let Some(choice) = chunk.choices.first() {
                            if let Some(content) = choice.delta.as_ref().and_then(|d| d.content.clone()) {
                                full_text.push_str(&content);
                                token_count += 1;
                                if tx.send(content).await.is_err() {
                                    return Ok(GenerationResult {
                                        text: full_text,
                                        tokens: token_count,
                                        total_time_ms: start.elapsed().as_millis() as u64,
                                        finish_reason: FinishReason::Cancelled,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(GenerationResult {
            text: full_text,
            tokens: token_count,
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: FinishReason::Stop,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: Option<OpenAIDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_config_default() {
        let config = OllamaConfig::default();
        assert_eq!(config.keep_alive, "5m");
    }

    #[test]
    fn ollama_request_serialization_includes_system_and_user() {
        let backend = OllamaBackend::new(OllamaConfig::default()).unwrap();
        let request = backend.request("answer only from context", "what is the hand hygiene policy", 0.0, 500, false);
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("answer only from context"));
        assert!(json.contains("hand hygiene"));
        assert!(json.contains("\"temperature\":0.0"));
    }

    #[test]
    fn openai_config_local_needs_no_key() {
        let config = OpenAIConfig::local("http://localhost:8000/v1", "llama-3");
        assert_eq!(config.api_key, "not-needed");
        assert!(OpenAIBackend::new(config).is_ok());
    }

    #[test]
    fn openai_backend_rejects_remote_without_key() {
        let config = OpenAIConfig::default();
        assert!(OpenAIBackend::new(config).is_err());
    }

    #[test]
    fn openai_azure_chat_url_includes_deployment_and_version() {
        let config = OpenAIConfig::azure("https://myresource.openai.azure.com", "key", "deployment", "2024-02-01");
        let backend = OpenAIBackend::new(config).unwrap();
        assert!(backend.chat_url().contains("openai/deployments/deployment"));
        assert!(backend.chat_url().contains("api-version=2024-02-01"));
    }
}
