//! Security gateway client.
//!
//! Submits the turn's upstream payload to the threat-scanning gateway and
//! normalises the reply into a `ScanVerdict`. Transport and HTTP failures
//! are reported as `Unreachable`; whether that blocks the turn is decided
//! by the pipeline, not here.

mod client;
mod verdict;

pub use client::{ENTITY_ID_HEADER, HttpGatewayClient};
pub use verdict::{ScanVerdict, ThreatDetail, interpret_scan_response};

use async_trait::async_trait;

use crate::context::UpstreamPayload;
use crate::credential::{EntityId, extract_entity_id};
use crate::error::CredentialError;
use crate::secret::{ExposeSecret, SecretString};

/// Gateway location and credential.
///
/// Both `url` and `credential` must be present for the gateway to count as
/// configured; otherwise scanning is skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayConfig {
    pub url: Option<String>,
    pub credential: Option<SecretString>,
    /// Explicit entity id; when set it replaces extraction from the credential.
    pub entity_id: Option<String>,
}

impl GatewayConfig {
    pub fn new(url: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            credential: Some(SecretString::new(credential)),
            entity_id: None,
        }
    }

    pub fn unconfigured() -> Self {
        Self::default()
    }

    pub fn is_configured(&self) -> bool {
        let has_url = self.url.as_deref().is_some_and(|u| !u.trim().is_empty());
        let has_credential = self.credential.as_ref().is_some_and(|c| !c.is_empty());
        has_url && has_credential
    }

    /// Resolve the entity id sent alongside each scan.
    pub fn entity_id(&self) -> Result<EntityId, CredentialError> {
        if let Some(explicit) = self.entity_id.as_deref().filter(|s| !s.trim().is_empty()) {
            return EntityId::parse(explicit);
        }
        let credential = self
            .credential
            .as_ref()
            .ok_or(CredentialError::NotExtractable)?;
        extract_entity_id(credential.expose_secret())
    }
}

/// Result of one scan call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub verdict: ScanVerdict,
    /// Wall-clock time around the network call, reported for every outcome.
    pub latency_ms: u64,
    pub raw_request: String,
    /// `None` when no response body was received.
    pub raw_response: Option<String>,
}

/// Anything that can scan an upstream payload.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Scan `payload` against the gateway described by `config`.
    ///
    /// Callers must only invoke this with a configured gateway. Fails
    /// before touching the network when no entity id can be derived.
    async fn scan(
        &self,
        config: &GatewayConfig,
        payload: &UpstreamPayload,
    ) -> Result<ScanReport, CredentialError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "vpsk_live_0123456789abcdef01234567secret";

    #[test]
    fn configured_requires_both_fields() {
        const URL: &str = "https://gw.example/";
        assert!(GatewayConfig::new(URL, KEY).is_configured());
        assert!(!GatewayConfig::unconfigured().is_configured());
        assert!(!GatewayConfig::new("", KEY).is_configured());
        assert!(!GatewayConfig::new(URL, "  ").is_configured());
        let url_only = GatewayConfig {
            url: Some("https://gw.example/".into()),
            ..Default::default()
        };
        assert!(!url_only.is_configured());
    }

    #[test]
    fn entity_id_from_credential_or_override() {
        let config = GatewayConfig::new("https://gw.example/", KEY);
        assert_eq!(
            config.entity_id().unwrap().as_str(),
            "0123456789abcdef01234567"
        );

        let overridden = GatewayConfig {
            entity_id: Some("AAAAAAAAAAAAAAAAAAAAAAAA".into()),
            ..config.clone()
        };
        assert_eq!(
            overridden.entity_id().unwrap().as_str(),
            "aaaaaaaaaaaaaaaaaaaaaaaa"
        );

        let bad = GatewayConfig::new("https://gw.example/", "sk-not-a-gateway-key");
        assert_eq!(bad.entity_id(), Err(CredentialError::NotExtractable));
    }
}
