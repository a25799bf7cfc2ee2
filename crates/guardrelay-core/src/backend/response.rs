use serde_json::Value;

use crate::transport::is_success;

/// Outcome of a completion call.
///
/// Failure status codes below 1 are local: `0` missing credential,
/// `-1` transport error, `-2` malformed response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResult {
    Success { content: String },
    Failure { status_code: i32, message: String },
}

impl CompletionResult {
    pub const MISSING_CREDENTIAL: i32 = 0;
    pub const TRANSPORT_ERROR: i32 = -1;
    pub const MALFORMED_RESPONSE: i32 = -2;

    pub fn missing_credential() -> Self {
        Self::Failure {
            status_code: Self::MISSING_CREDENTIAL,
            message: "missing credential".to_string(),
        }
    }

    pub fn transport_error(cause: impl Into<String>) -> Self {
        Self::Failure {
            status_code: Self::TRANSPORT_ERROR,
            message: cause.into(),
        }
    }

    pub fn malformed() -> Self {
        Self::Failure {
            status_code: Self::MALFORMED_RESPONSE,
            message: "malformed response".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Success { content } => Some(content),
            Self::Failure { .. } => None,
        }
    }
}

/// Reply text of the first choice.
///
/// Only the first candidate is ever used, even when the backend returns
/// several. Tries `message.content`, then `text`, then `delta.content`.
pub fn extract_first_reply(body: &Value) -> Option<String> {
    let first = body.get("choices")?.as_array()?.first()?;
    first
        .pointer("/message/content")
        .and_then(Value::as_str)
        .or_else(|| first.get("text").and_then(Value::as_str))
        .or_else(|| first.pointer("/delta/content").and_then(Value::as_str))
        .map(str::to_string)
}

fn upstream_error_message(parsed: Option<&Value>, body: &str) -> Option<String> {
    let from_json = parsed.and_then(|json| match json.get("error")? {
        Value::Object(err) => err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        Value::String(s) => Some(s.clone()),
        _ => None,
    });
    from_json.or_else(|| {
        let trimmed = body.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Map an HTTP status and response body to a `CompletionResult`.
pub fn interpret_completion_response(status: u16, body: &str) -> CompletionResult {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if !is_success(status) {
        return CompletionResult::Failure {
            status_code: i32::from(status),
            message: upstream_error_message(parsed.as_ref(), body)
                .unwrap_or_else(|| format!("HTTP {status} error")),
        };
    }

    match parsed.as_ref().and_then(extract_first_reply) {
        Some(content) => CompletionResult::Success { content },
        None => CompletionResult::malformed(),
    }
}
