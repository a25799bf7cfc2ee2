//! Error taxonomy for guardrelay.
//!
//! Only configuration problems are errors. Gateway and backend transport
//! failures are normalised into `ScanVerdict::Unreachable` and
//! `CompletionResult::Failure` values instead, so a turn always completes
//! with a well-formed outcome.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to extract an entity id from a gateway credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("entity id not extractable from gateway credential")]
    NotExtractable,
}

/// Problems loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} URL '{value}': {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Configuration errors that stop a turn before any network call.
///
/// Carried on `TurnOutcome::error`; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("configuration error: backend API key is not set")]
    MissingBackendKey,

    #[error("configuration error: {0}")]
    EntityId(#[from] CredentialError),
}

/// A turn was submitted with no text. No turn is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("message is empty")]
pub struct EmptyMessage;
