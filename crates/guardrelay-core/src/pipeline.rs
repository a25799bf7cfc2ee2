//! Scan-then-forward turn pipeline.
//!
//! Each submitted message runs one pass of the state machine:
//!
//! ```text
//! Start → ConfigCheck ─┬─ Skipped ───────────────────────┬─ Forwarding → Done
//!                      └─ Scanning ─┬─ Allowed ──────────┤
//!                                   ├─ ScanFailed ─(open)┘
//!                                   ├─ ScanFailed ─(closed)→ Done
//!                                   └─ Blocked ───────────→ Done
//! ```
//!
//! The backend is never called for a blocked turn. Every path ends in a
//! single `TurnOutcome` appended to the session's turn log.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendConfig, CompletionBackend, CompletionResult, HttpBackendClient};
use crate::context::{ContextMode, build_upstream_payload};
use crate::conversation::{ChatSession, Message};
use crate::error::{EmptyMessage, PipelineError};
use crate::gateway::{GatewayConfig, HttpGatewayClient, ScanVerdict, Scanner};
use crate::transport::elapsed_ms;

/// What to do when a configured gateway cannot produce a verdict.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum UnreachablePolicy {
    /// Forward to the backend anyway and attach a warning.
    #[default]
    FailOpen,
    /// Stop the turn as if the message had been blocked.
    FailClosed,
}

/// States of the per-turn state machine, recorded on the outcome in the
/// order they were entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum PipelineStage {
    Start,
    ConfigCheck,
    Skipped,
    Scanning,
    Blocked,
    ScanFailed,
    Forwarding,
    Done,
}

/// Non-fatal notice attached to a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// Gateway URL or credential missing; the message was not scanned.
    ScanSkipped,
    /// The gateway could not be reached or returned an unusable reply.
    GatewayUnreachable { cause: String, failed_open: bool },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanSkipped => {
                f.write_str("security gateway not configured; message was not scanned")
            }
            Self::GatewayUnreachable {
                cause,
                failed_open: true,
            } => write!(
                f,
                "security gateway unreachable ({cause}); message sent unscanned"
            ),
            Self::GatewayUnreachable {
                cause,
                failed_open: false,
            } => write!(
                f,
                "security gateway unreachable ({cause}); message withheld"
            ),
        }
    }
}

/// Everything the UI needs to render one turn. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub verdict: ScanVerdict,
    /// `None` when the turn stopped before forwarding. A missing backend
    /// key is reported here as the code `0` failure.
    pub completion: Option<CompletionResult>,
    /// Wall-clock time for the whole turn.
    pub latency_ms: u64,
    pub scan_latency_ms: Option<u64>,
    pub backend_latency_ms: Option<u64>,
    /// Request body of the last upstream call made.
    pub raw_request: Option<String>,
    /// Response body of the last upstream call made.
    pub raw_response: Option<String>,
    pub advisories: Vec<Advisory>,
    /// Configuration problem that stopped the turn before the network.
    pub error: Option<PipelineError>,
    pub stages: Vec<PipelineStage>,
}

impl TurnOutcome {
    /// Assistant reply text, if the backend produced one.
    pub fn reply(&self) -> Option<&str> {
        self.completion.as_ref().and_then(CompletionResult::content)
    }

    /// True when the turn stopped before forwarding: blocked, failed
    /// closed, or an unusable gateway credential.
    pub fn is_halted(&self) -> bool {
        self.completion.is_none()
    }

    pub fn failed_open(&self) -> bool {
        self.advisories.iter().any(|a| {
            matches!(
                a,
                Advisory::GatewayUnreachable {
                    failed_open: true,
                    ..
                }
            )
        })
    }

    #[cfg(test)]
    pub(crate) fn empty_for_tests() -> Self {
        TurnBuilder::new().build(0)
    }
}

/// Construction-time options for a `Pipeline`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub context_mode: ContextMode,
    pub on_unreachable: UnreachablePolicy,
}

/// Accumulates the pieces of a `TurnOutcome` as the state machine runs.
struct TurnBuilder {
    verdict: ScanVerdict,
    completion: Option<CompletionResult>,
    scan_latency_ms: Option<u64>,
    backend_latency_ms: Option<u64>,
    raw_request: Option<String>,
    raw_response: Option<String>,
    advisories: Vec<Advisory>,
    error: Option<PipelineError>,
    stages: Vec<PipelineStage>,
}

impl TurnBuilder {
    fn new() -> Self {
        Self {
            verdict: ScanVerdict::Skipped,
            completion: None,
            scan_latency_ms: None,
            backend_latency_ms: None,
            raw_request: None,
            raw_response: None,
            advisories: Vec::new(),
            error: None,
            stages: vec![PipelineStage::Start],
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!(%stage, "Pipeline stage");
        self.stages.push(stage);
    }

    fn build(mut self, latency_ms: u64) -> TurnOutcome {
        self.stages.push(PipelineStage::Done);
        TurnOutcome {
            verdict: self.verdict,
            completion: self.completion,
            latency_ms,
            scan_latency_ms: self.scan_latency_ms,
            backend_latency_ms: self.backend_latency_ms,
            raw_request: self.raw_request,
            raw_response: self.raw_response,
            advisories: self.advisories,
            error: self.error,
            stages: self.stages,
        }
    }
}

/// The scan-then-forward orchestrator.
///
/// Configuration is passed in explicitly; nothing is read from the
/// environment here.
pub struct Pipeline {
    gateway: GatewayConfig,
    backend: BackendConfig,
    options: PipelineOptions,
    scanner: Arc<dyn Scanner>,
    completer: Arc<dyn CompletionBackend>,
}

impl Pipeline {
    pub fn new(
        gateway: GatewayConfig,
        backend: BackendConfig,
        options: PipelineOptions,
        scanner: Arc<dyn Scanner>,
        completer: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            gateway,
            backend,
            options,
            scanner,
            completer,
        }
    }

    /// Build a pipeline using the HTTP gateway and backend clients.
    pub fn with_http(
        gateway: GatewayConfig,
        backend: BackendConfig,
        options: PipelineOptions,
        gateway_timeout: Duration,
        backend_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let scanner = Arc::new(HttpGatewayClient::new(gateway_timeout)?);
        let completer = Arc::new(HttpBackendClient::new(backend_timeout)?);
        Ok(Self::new(gateway, backend, options, scanner, completer))
    }

    pub fn gateway(&self) -> &GatewayConfig {
        &self.gateway
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    /// Switch the backend model for subsequent turns.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.backend.model = model.into();
    }

    pub fn set_context_mode(&mut self, mode: ContextMode) {
        self.options.context_mode = mode;
    }

    /// Run one turn for `text` and record it in `session`.
    ///
    /// The user message is always appended; an assistant message is
    /// appended only when the backend returned a reply.
    #[instrument(
        skip(self, session, text),
        fields(mode = %self.options.context_mode, history = session.conversation().len())
    )]
    pub async fn run_turn<'s>(
        &self,
        session: &'s mut ChatSession,
        text: &str,
    ) -> Result<&'s TurnOutcome, EmptyMessage> {
        if text.trim().is_empty() {
            return Err(EmptyMessage);
        }

        let start = Instant::now();
        let user = Message::user(text);
        let mut turn = TurnBuilder::new();
        turn.enter(PipelineStage::ConfigCheck);

        if !self.backend.has_api_key() {
            warn!("Backend API key missing; turn stopped before any network call");
            turn.error = Some(PipelineError::MissingBackendKey);
            turn.completion = Some(CompletionResult::missing_credential());
            return Ok(session.record(user, None, turn.build(elapsed_ms(start))));
        }

        let payload =
            build_upstream_payload(self.options.context_mode, session.conversation(), &user);

        if self.gateway.is_configured() {
            turn.enter(PipelineStage::Scanning);
            let report = match self.scanner.scan(&self.gateway, &payload).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(error = %e, "Gateway credential unusable; turn stopped");
                    turn.error = Some(e.into());
                    return Ok(session.record(user, None, turn.build(elapsed_ms(start))));
                }
            };
            turn.scan_latency_ms = Some(report.latency_ms);
            turn.raw_request = Some(report.raw_request);
            turn.raw_response = report.raw_response;
            turn.verdict = report.verdict;

            match &turn.verdict {
                ScanVerdict::Blocked { threats, .. } => {
                    info!(threats = threats.len(), "Message blocked by gateway");
                    turn.enter(PipelineStage::Blocked);
                    return Ok(session.record(user, None, turn.build(elapsed_ms(start))));
                }
                ScanVerdict::Unreachable { cause } => {
                    let failed_open = self.options.on_unreachable == UnreachablePolicy::FailOpen;
                    warn!(cause = %cause, failed_open, "Gateway scan failed");
                    turn.advisories.push(Advisory::GatewayUnreachable {
                        cause: cause.clone(),
                        failed_open,
                    });
                    turn.enter(PipelineStage::ScanFailed);
                    if !failed_open {
                        return Ok(session.record(user, None, turn.build(elapsed_ms(start))));
                    }
                }
                ScanVerdict::Allowed | ScanVerdict::Skipped => {}
            }
        } else {
            info!("Security gateway not configured; skipping scan");
            turn.advisories.push(Advisory::ScanSkipped);
            turn.enter(PipelineStage::Skipped);
        }

        turn.enter(PipelineStage::Forwarding);
        let report = self.completer.complete(&self.backend, &payload).await;
        turn.backend_latency_ms = Some(report.latency_ms);
        if report.raw_request.is_some() {
            turn.raw_request = report.raw_request;
            turn.raw_response = report.raw_response;
        }

        let assistant = report.result.content().map(Message::assistant);
        turn.completion = Some(report.result);
        let outcome = turn.build(elapsed_ms(start));
        Ok(session.record(user, assistant, outcome))
    }
}
