//! [`DecisionClient`] – the `infer(prompt) → text` capability.
//!
//! Talks to a locally-running Ollama instance via the `/api/generate`
//! endpoint. The reply is raw decision text; [`crate::grammar::decode`]
//! turns it into an action. Low temperature keeps the answers pragmatic
//! and repeatable.
//!
//! The [`DecisionService`] trait is the seam the control loop depends on,
//! so tests can script replies without a model server.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sampling temperature for decision requests.
const TEMPERATURE: f32 = 0.2;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the decision capability.
#[derive(Error, Debug)]
pub enum DecisionError {
    /// The HTTP request to the model server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response shape was unexpected.
    #[error("unexpected response format: {0}")]
    BadResponse(String),
}

/// The opaque `infer(prompt) → text` capability.
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn infer(&self, prompt: &str) -> Result<String, DecisionError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Request / response shapes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

// ────────────────────────────────────────────────────────────────────────────
// DecisionClient
// ────────────────────────────────────────────────────────────────────────────

/// An async client for Ollama's `/api/generate` endpoint.
///
/// Construct once and reuse across polling cycles.
pub struct DecisionClient {
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl DecisionClient {
    /// Create a client pointing at `base_url` (e.g.
    /// `"http://localhost:11434"`) and using `model` (e.g. `"llama3"`).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DecisionService for DecisionClient {
    /// Send `prompt` to the model and return the trimmed reply text.
    ///
    /// # Errors
    ///
    /// [`DecisionError::Http`] when the request fails or times out,
    /// [`DecisionError::BadResponse`] when the reply carries no text.
    async fn infer(&self, prompt: &str) -> Result<String, DecisionError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: TEMPERATURE,
            },
        };

        let response: GenerateResponse = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = response.response.trim().to_string();
        if text.is_empty() {
            return Err(DecisionError::BadResponse("empty response field".into()));
        }
        Ok(text)
    }
}
