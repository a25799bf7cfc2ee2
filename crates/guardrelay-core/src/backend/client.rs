use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, instrument, warn};

use super::response::interpret_completion_response;
use super::{BackendConfig, CompletionBackend, CompletionReport, CompletionResult};
use crate::context::UpstreamPayload;
use crate::transport::{describe_transport_error, elapsed_ms};

/// `CompletionBackend` for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct HttpBackendClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpBackendClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl CompletionBackend for HttpBackendClient {
    #[instrument(skip_all, fields(model = %config.model, messages = payload.len()))]
    async fn complete(
        &self,
        config: &BackendConfig,
        payload: &UpstreamPayload,
    ) -> CompletionReport {
        let Some(api_key) = config.api_key_str() else {
            warn!("Backend API key missing, not sending request");
            return CompletionReport {
                result: CompletionResult::missing_credential(),
                latency_ms: 0,
                raw_request: None,
                raw_response: None,
            };
        };

        let body = json!({
            "model": config.model,
            "messages": payload.to_chat_messages(),
        });
        let raw_request = body.to_string();

        let start = Instant::now();
        let sent = self
            .http
            .post(&config.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await;

        let (result, raw_response) = match sent {
            Ok(resp) => {
                let status = resp.status().as_u16();
                match resp.text().await {
                    Ok(text) => {
                        let result = interpret_completion_response(status, &text);
                        (result, Some(text))
                    }
                    Err(e) => (
                        CompletionResult::transport_error(describe_transport_error(
                            &e,
                            self.timeout,
                            &config.api_url,
                        )),
                        None,
                    ),
                }
            }
            Err(e) => (
                CompletionResult::transport_error(describe_transport_error(
                    &e,
                    self.timeout,
                    &config.api_url,
                )),
                None,
            ),
        };
        let latency_ms = elapsed_ms(start);

        match &result {
            CompletionResult::Success { content } => {
                debug!(
                    latency_ms,
                    chars = content.len(),
                    "Backend completion received"
                )
            }
            CompletionResult::Failure {
                status_code,
                message,
            } => {
                warn!(latency_ms, status_code, message = %message, "Backend completion failed")
            }
        }

        CompletionReport {
            result,
            latency_ms,
            raw_request: Some(raw_request),
            raw_response,
        }
    }
}
