//! Structured logging configuration for guardrelay.
//!
//! Uses `tracing` with `tracing-subscriber`. Logs go to stderr so they never
//! interleave with chat output on stdout.
//!
//! ## Environment Variables
//!
//! - `GUARDRELAY_LOG` or `RUST_LOG`: log filter (e.g. `debug`, `guardrelay=debug,reqwest=warn`)
//! - `GUARDRELAY_LOG_FORMAT`: output format (`pretty`, `compact`, `json`)
//!
//! ```bash
//! GUARDRELAY_LOG=guardrelay=debug guardrelay
//! GUARDRELAY_LOG_FORMAT=json guardrelay --message "hello"
//! ```

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

const DEFAULT_FILTER: &str = "guardrelay=warn";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, multi-line
    Pretty,
    /// Single-line output
    #[default]
    Compact,
    /// JSON output for log aggregation
    Json,
}

impl LogFormat {
    /// Parse from string (case-insensitive); unknown values fall back to compact.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Compact,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive (e.g. "debug", "guardrelay=debug,hyper=warn")
    pub filter: String,
    pub format: LogFormat,
    /// Emit span open/close events
    pub with_spans: bool,
    /// Include file/line
    pub with_file: bool,
    /// Include target (module path)
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Compact,
            with_spans: false,
            with_file: false,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Build from variables provided by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let filter = lookup("GUARDRELAY_LOG")
            .or_else(|| lookup("RUST_LOG"))
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());

        let format = lookup("GUARDRELAY_LOG_FORMAT")
            .map(|s| LogFormat::parse(&s))
            .unwrap_or_default();

        Self {
            filter,
            format,
            ..Default::default()
        }
    }

    /// Build from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Per-turn pipeline tracing, including stage transitions.
    pub fn debug() -> Self {
        Self {
            filter: "guardrelay=debug,info".to_string(),
            with_file: true,
            ..Default::default()
        }
    }

    /// Production configuration with JSON output and span timings.
    pub fn production() -> Self {
        Self {
            filter: "guardrelay=info,warn".to_string(),
            format: LogFormat::Json,
            with_spans: true,
            ..Default::default()
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Call once at program start; later calls are ignored.
pub fn init(config: LogConfig) {
    let env_filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let span_events = if config.with_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(span_events)
        .with_file(config.with_file)
        .with_line_number(config.with_file)
        .with_target(config.with_target);

    let registry = tracing_subscriber::registry().with(env_filter);
    let _ = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(registry.with(layer.json())),
        LogFormat::Compact => {
            tracing::subscriber::set_global_default(registry.with(layer.compact()))
        }
        LogFormat::Pretty => tracing::subscriber::set_global_default(registry.with(layer.pretty())),
    };
}

/// Initialize logging from the environment.
pub fn init_from_env() {
    init(LogConfig::from_env());
}
