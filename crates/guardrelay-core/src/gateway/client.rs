use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde_json::json;
use tracing::{debug, instrument, warn};

use super::{GatewayConfig, ScanReport, ScanVerdict, Scanner, interpret_scan_response};
use crate::context::UpstreamPayload;
use crate::error::CredentialError;
use crate::secret::ExposeSecret;
use crate::transport::{describe_transport_error, elapsed_ms};

/// Header carrying the entity id derived from the credential.
pub const ENTITY_ID_HEADER: &str = "X-Entity-ID";

/// `Scanner` backed by an HTTP POST to the gateway.
#[derive(Debug, Clone)]
pub struct HttpGatewayClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpGatewayClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Scanner for HttpGatewayClient {
    #[instrument(skip_all, fields(messages = payload.len()))]
    async fn scan(
        &self,
        config: &GatewayConfig,
        payload: &UpstreamPayload,
    ) -> Result<ScanReport, CredentialError> {
        let entity_id = config.entity_id()?;
        let url = config.url.as_deref().unwrap_or_default();
        let credential = config
            .credential
            .as_ref()
            .map(|c| c.expose_secret())
            .unwrap_or_default();

        let body = json!({ "messages": payload.to_chat_messages() });
        let raw_request = body.to_string();
        debug!(entity_id = %entity_id, url, "Submitting scan request");

        let start = Instant::now();
        let sent = self
            .http
            .post(url)
            .header(AUTHORIZATION, credential)
            .header(ENTITY_ID_HEADER, entity_id.as_str())
            .json(&body)
            .send()
            .await;

        let (verdict, raw_response) = match sent {
            Ok(resp) => {
                let status = resp.status().as_u16();
                match resp.text().await {
                    Ok(text) => (interpret_scan_response(status, &text), Some(text)),
                    Err(e) => (
                        ScanVerdict::Unreachable {
                            cause: describe_transport_error(&e, self.timeout, url),
                        },
                        None,
                    ),
                }
            }
            Err(e) => (
                ScanVerdict::Unreachable {
                    cause: describe_transport_error(&e, self.timeout, url),
                },
                None,
            ),
        };
        let latency_ms = elapsed_ms(start);

        match &verdict {
            ScanVerdict::Unreachable { cause } => {
                warn!(latency_ms, cause = %cause, "Gateway unreachable")
            }
            ScanVerdict::Blocked { threats, .. } => {
                debug!(
                    latency_ms,
                    threats = threats.len(),
                    "Gateway blocked message"
                )
            }
            _ => debug!(latency_ms, "Gateway allowed message"),
        }

        Ok(ScanReport {
            verdict,
            latency_ms,
            raw_request,
            raw_response,
        })
    }
}
