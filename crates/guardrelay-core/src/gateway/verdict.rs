//! Interpretation of gateway scan responses.
//!
//! The gateway's response is a loosely-typed contract: unknown fields are
//! ignored and only two capabilities are checked, "carries a blocked
//! marker" and "carries a threat list".

use serde_json::Value;

use crate::transport::is_success;

const DEFAULT_BLOCKED_MESSAGE: &str = "Message blocked by security gateway";

/// The gateway's classification of a single scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanVerdict {
    /// No scan was attempted (gateway unconfigured or turn stopped early).
    Skipped,
    Allowed,
    Blocked {
        threats: Vec<ThreatDetail>,
        message: String,
    },
    Unreachable {
        cause: String,
    },
}

impl ScanVerdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }

    pub fn threats(&self) -> &[ThreatDetail] {
        match self {
            Self::Blocked { threats, .. } => threats,
            _ => &[],
        }
    }
}

/// One gateway finding, passed through for display.
///
/// The gateway's entry shape is not fixed; the raw entry is kept alongside
/// the fields the UI knows how to render.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreatDetail {
    pub category: String,
    pub description: String,
    pub severity: Option<String>,
    pub method: Option<String>,
    pub raw: Value,
}

impl ThreatDetail {
    pub fn from_value(entry: &Value) -> Self {
        match entry {
            Value::Object(map) => Self {
                category: text_field(map.get("category")).unwrap_or_else(|| "unknown".to_string()),
                description: ["description", "reason", "message"]
                    .iter()
                    .find_map(|key| text_field(map.get(*key)))
                    .unwrap_or_default(),
                severity: text_field(map.get("severity")),
                method: text_field(map.get("method")),
                raw: entry.clone(),
            },
            Value::String(name) => Self {
                category: name.clone(),
                description: String::new(),
                severity: None,
                method: None,
                raw: entry.clone(),
            },
            other => Self {
                category: "unknown".to_string(),
                description: other.to_string(),
                severity: None,
                method: None,
                raw: entry.clone(),
            },
        }
    }

    /// Category with underscores shown as spaces (`prompt_injection` → `prompt injection`).
    pub fn display_category(&self) -> String {
        self.category.replace('_', " ")
    }
}

fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn has_blocked_marker(body: &Value) -> bool {
    let marker = |key: &str| body.get(key).and_then(Value::as_str) == Some("blocked");
    marker("action")
        || marker("status")
        || body.get("blocked").and_then(Value::as_bool) == Some(true)
}

fn threat_list(body: &Value) -> Vec<ThreatDetail> {
    match body.get("threats") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => entries.iter().map(ThreatDetail::from_value).collect(),
        Some(single) => vec![ThreatDetail::from_value(single)],
    }
}

/// Map an HTTP status and response body to a verdict.
///
/// A blocked marker wins regardless of status. Otherwise a 2xx status with
/// a JSON object body is `Allowed`; everything else is `Unreachable`.
pub fn interpret_scan_response(status: u16, body: &str) -> ScanVerdict {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if let Some(json) = parsed.as_ref().filter(|v| has_blocked_marker(v)) {
        return ScanVerdict::Blocked {
            threats: threat_list(json),
            message: text_field(json.get("message"))
                .unwrap_or_else(|| DEFAULT_BLOCKED_MESSAGE.to_string()),
        };
    }

    if let Some(json) = parsed
        .as_ref()
        .filter(|v| v.get("action").and_then(Value::as_str) == Some("error"))
    {
        let cause = text_field(json.get("message"))
            .unwrap_or_else(|| "gateway reported an error".to_string());
        return ScanVerdict::Unreachable { cause };
    }

    if !is_success(status) {
        return ScanVerdict::Unreachable {
            cause: format!("gateway returned HTTP {status}"),
        };
    }

    match parsed {
        Some(Value::Object(_)) => ScanVerdict::Allowed,
        _ => ScanVerdict::Unreachable {
            cause: "unparsable gateway response".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blocked_with_threats() {
        let body = json!({
            "action": "blocked",
            "message": "Prompt injection detected",
            "threats": [
                {
                    "category": "prompt_injection",
                    "severity": "HIGH",
                    "method": "ml",
                    "reason": "override attempt"
                },
                { "category": "pii", "severity": "LOW" },
                { "category": "jailbreak" }
            ]
        })
        .to_string();

        let verdict = interpret_scan_response(200, &body);
        let ScanVerdict::Blocked { threats, message } = verdict else {
            panic!("expected blocked verdict");
        };
        assert_eq!(threats.len(), 3);
        assert_eq!(message, "Prompt injection detected");
        assert_eq!(threats[0].display_category(), "prompt injection");
        assert_eq!(threats[0].severity.as_deref(), Some("HIGH"));
        assert_eq!(threats[0].method.as_deref(), Some("ml"));
        assert_eq!(threats[0].description, "override attempt");
        assert_eq!(threats[2].severity, None);
    }

    #[test]
    fn blocked_without_threat_list_is_valid() {
        let verdict = interpret_scan_response(200, r#"{"action":"blocked"}"#);
        assert!(verdict.is_blocked());
        assert!(verdict.threats().is_empty());
        if let ScanVerdict::Blocked { message, .. } = verdict {
            assert_eq!(message, DEFAULT_BLOCKED_MESSAGE);
        }
    }

    #[test]
    fn blocked_marker_wins_over_error_status() {
        let body = r#"{"action":"blocked","threats":[{"category":"pii"}]}"#;
        let verdict = interpret_scan_response(403, body);
        assert_eq!(verdict.threats().len(), 1);
    }

    #[test]
    fn alternative_blocked_markers() {
        let ok = |body| interpret_scan_response(200, body);
        assert!(ok(r#"{"status":"blocked"}"#).is_blocked());
        assert!(ok(r#"{"blocked":true}"#).is_blocked());
        assert!(!ok(r#"{"blocked":false}"#).is_blocked());
    }

    #[test]
    fn allowed_on_2xx_without_marker() {
        assert_eq!(
            interpret_scan_response(200, r#"{"action":"allowed"}"#),
            ScanVerdict::Allowed
        );
        assert_eq!(
            interpret_scan_response(204, r#"{"extra":{"ignored":1}}"#),
            ScanVerdict::Allowed
        );
    }

    #[test]
    fn unreachable_on_non_2xx_or_garbage() {
        let bad_gateway = r#"{"error":"bad gateway"}"#;
        assert!(interpret_scan_response(502, bad_gateway).is_unreachable());
        let html = "<html>oops</html>";
        assert!(interpret_scan_response(200, html).is_unreachable());
        assert!(interpret_scan_response(200, "").is_unreachable());
        assert!(interpret_scan_response(200, "[1,2]").is_unreachable());
    }

    #[test]
    fn gateway_error_action_is_unreachable_with_message() {
        let body = r#"{"action":"error","message":"scanner offline"}"#;
        assert_eq!(
            interpret_scan_response(200, body),
            ScanVerdict::Unreachable {
                cause: "scanner offline".to_string()
            }
        );
    }

    #[test]
    fn odd_threat_entries_are_passed_through() {
        let threat = ThreatDetail::from_value(&json!("toxicity"));
        assert_eq!(threat.category, "toxicity");

        let threat = ThreatDetail::from_value(&json!({ "severity": 3 }));
        assert_eq!(threat.category, "unknown");
        assert_eq!(threat.severity.as_deref(), Some("3"));
    }
}
