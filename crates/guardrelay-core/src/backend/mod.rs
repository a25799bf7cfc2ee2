//! Language-model backend client.
//!
//! Sends the turn's upstream payload to an OpenAI-compatible chat
//! completions endpoint and normalises the reply into a
//! `CompletionResult`. Failures are values, not errors, and are never
//! retried.

mod client;
mod response;

pub use client::HttpBackendClient;
pub use response::{CompletionResult, extract_first_reply, interpret_completion_response};

use async_trait::async_trait;

use crate::context::UpstreamPayload;
use crate::secret::{ExposeSecret, SecretString};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Backend endpoint, credential and model.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub api_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
}

impl BackendConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::non_empty(api_key),
            ..Self::default()
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|k| !k.is_empty())
    }

    pub(crate) fn api_key_str(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .map(|k| k.expose_secret())
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Result of one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub result: CompletionResult,
    pub latency_ms: u64,
    /// `None` when the call stopped before a request was built.
    pub raw_request: Option<String>,
    /// `None` when no response body was received.
    pub raw_response: Option<String>,
}

/// Anything that can produce a chat completion.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, config: &BackendConfig, payload: &UpstreamPayload) -> CompletionReport;
}
