//! Turns a finished `TurnOutcome` into terminal lines.

use guardrelay_core::backend::CompletionResult;
use guardrelay_core::gateway::{ScanVerdict, ThreatDetail};
use guardrelay_core::{ChatSession, Message, Role, TurnOutcome};
use serde_json::Value;

use crate::theme as t;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const RAW_PREVIEW_CHARS: usize = 600;

pub fn timestamp(message: &Message) -> String {
    message.timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Lines describing the most recent turn in `session`.
pub fn last_turn_lines(session: &ChatSession) -> Vec<String> {
    let Some(outcome) = session.last_turn() else {
        return Vec::new();
    };
    let reply = session
        .conversation()
        .last()
        .filter(|m| m.role == Role::Assistant && outcome.reply().is_some());
    outcome_lines(outcome, reply)
}

/// Render one outcome. `reply` is the assistant message appended for it, if any.
pub fn outcome_lines(outcome: &TurnOutcome, reply: Option<&Message>) -> Vec<String> {
    let mut lines = Vec::new();

    for advisory in &outcome.advisories {
        lines.push(t::icon_warn(&advisory.to_string()));
    }

    if let Some(error) = &outcome.error {
        lines.push(t::icon_fail(&format!("Configuration error: {error}")));
    }

    if let ScanVerdict::Blocked { threats, message } = &outcome.verdict {
        lines.push(t::icon_fail(&t::bold(message)));
        if !threats.is_empty() {
            lines.push(t::muted("Detected threats:"));
            lines.extend(
                threats
                    .iter()
                    .enumerate()
                    .map(|(i, threat)| format!("  {}. {}", i + 1, threat_line(threat))),
            );
        }
    }

    match &outcome.completion {
        Some(CompletionResult::Success { content }) => {
            let when = reply.map(timestamp).unwrap_or_default();
            lines.push(format!("{} {}", t::accent("assistant>"), t::muted(&when)));
            lines.push(content.clone());
        }
        Some(CompletionResult::Failure {
            status_code,
            message,
        }) => {
            lines.push(t::icon_fail(&format!(
                "Backend error ({}): {message}",
                status_label(*status_code)
            )));
            if let Some(raw) = &outcome.raw_request {
                lines.push(t::muted(&format!("request:  {}", preview(raw))));
            }
            if let Some(raw) = &outcome.raw_response {
                lines.push(t::muted(&format!("response: {}", preview(raw))));
            }
        }
        None => {}
    }

    lines.push(t::muted(&latency_summary(outcome)));
    lines
}

fn threat_line(threat: &ThreatDetail) -> String {
    let mut line = threat.display_category();
    if let Some(severity) = &threat.severity {
        line.push_str(&format!(" [{severity}]"));
    }
    if let Some(method) = &threat.method {
        line.push_str(&format!(" ({method})"));
    }
    if !threat.description.is_empty() {
        line.push_str(&format!(": {}", threat.description));
    }
    line
}

fn status_label(status_code: i32) -> String {
    match status_code {
        CompletionResult::MISSING_CREDENTIAL => "missing credential".to_string(),
        CompletionResult::TRANSPORT_ERROR => "transport error".to_string(),
        CompletionResult::MALFORMED_RESPONSE => "malformed response".to_string(),
        code => format!("HTTP {code}"),
    }
}

/// Compact JSON (when parseable) cut to a readable length.
fn preview(raw: &str) -> String {
    let compact = serde_json::from_str::<Value>(raw)
        .map(|v| v.to_string())
        .unwrap_or_else(|_| raw.trim().to_string());
    if compact.chars().count() > RAW_PREVIEW_CHARS {
        let cut: String = compact.chars().take(RAW_PREVIEW_CHARS).collect();
        format!("{cut}…")
    } else {
        compact
    }
}

fn latency_summary(outcome: &TurnOutcome) -> String {
    let mut parts = Vec::new();
    if let Some(ms) = outcome.scan_latency_ms {
        parts.push(format!("scan {ms} ms"));
    }
    if let Some(ms) = outcome.backend_latency_ms {
        parts.push(format!("backend {ms} ms"));
    }
    parts.push(format!("total {} ms", outcome.latency_ms));
    parts.join(" · ")
}
