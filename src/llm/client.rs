//! Remote answer generator
//!
//! Sends the composed prompt to an OpenAI-compatible chat completions
//! endpoint. Only one request may be outstanding; a second caller gets a
//! stand-in answer instead of a second request.

use crate::llm::prompts::{compose_prompt, PERSONA, STILL_PROCESSING};
use crate::{ConciergeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Turns a visitor utterance into answer text
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn answer(&self, utterance: &str) -> Result<String>;
}

/// Configuration for the remote answer endpoint
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub endpoint: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    pub model: String,

    pub timeout_ms: u64,

    pub max_tokens: Option<u32>,

    /// Persona text prepended to every utterance
    pub persona: String,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key_env: "CONCIERGE_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_ms: 15_000,
            max_tokens: Some(200),
            persona: PERSONA.to_string(),
        }
    }
}

impl AnswerConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize, Debug)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Clears the in-flight flag when a request finishes, however it finishes
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct HttpAnswerClient {
    client: reqwest::Client,
    config: AnswerConfig,
    api_key: Option<String>,
    in_flight: AtomicBool,
}

impl HttpAnswerClient {
    /// Build a client, reading the API key from `config.api_key_env`
    pub fn new(config: AnswerConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(
                "{} is not set, calling {} without credentials",
                config.api_key_env, config.endpoint
            );
        }
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: AnswerConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ConciergeError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            api_key,
            in_flight: AtomicBool::new(false),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    async fn request(&self, prompt: String) -> Result<String> {
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
        };

        let mut request = self.client.post(self.url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ConciergeError::Timeout(format!(
                    "answer endpoint after {}ms",
                    self.config.timeout_ms
                ))
            } else {
                ConciergeError::AnswerGenerator(format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ConciergeError::AnswerGenerator(format!(
                "endpoint returned {}: {}",
                status, detail
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ConciergeError::AnswerGenerator(format!("bad response: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(ConciergeError::AnswerGenerator(
                "response contained no answer".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl AnswerGenerator for HttpAnswerClient {
    async fn answer(&self, utterance: &str) -> Result<String> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            info!("Answer request already in flight, returning stand-in");
            return Ok(STILL_PROCESSING.to_string());
        }
        let _guard = InFlight(&self.in_flight);

        let prompt = compose_prompt(&self.config.persona, utterance);
        debug!("Asking {} ({} chars)", self.config.model, prompt.len());

        match self.request(prompt).await {
            Ok(text) => {
                debug!("Answer received ({} chars)", text.len());
                Ok(text)
            }
            Err(e) => {
                error!("Answer generator failed: {}", e);
                Err(e)
            }
        }
    }
}
