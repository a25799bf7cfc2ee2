//! Layered settings: TOML file, then environment, then CLI flags.
//!
//! Settings are resolved once at startup and handed to the pipeline as
//! explicit `GatewayConfig` / `BackendConfig` values.
//!
//! ```toml
//! [gateway]
//! url = "https://gateway.example.com/"
//! credential = "Bearer vpsk_live_..."
//! timeout_secs = 30
//! on_unreachable = "fail-open"
//!
//! [backend]
//! api_url = "https://api.openai.com/v1/chat/completions"
//! api_key = "sk-..."
//! model = "gpt-4o-mini"
//! timeout_secs = 60
//!
//! [pipeline]
//! context_mode = "single-message"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{BackendConfig, DEFAULT_API_URL, DEFAULT_MODEL};
use crate::context::ContextMode;
use crate::error::ConfigError;
use crate::gateway::GatewayConfig;
use crate::pipeline::{PipelineOptions, UnreachablePolicy};
use crate::secret::SecretString;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub url: Option<String>,
    pub credential: Option<String>,
    pub entity_id: Option<String>,
    pub timeout_secs: u64,
    pub on_unreachable: UnreachablePolicy,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: None,
            credential: None,
            entity_id: None,
            timeout_secs: 30,
            on_unreachable: UnreachablePolicy::FailOpen,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub context_mode: ContextMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gateway: GatewaySettings,
    pub backend: BackendSettings,
    pub pipeline: PipelineSettings,
}

/// Default location of the settings file: `~/.guardrelay/config.toml`.
pub fn default_config_path() -> PathBuf {
    let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home_dir.join(".guardrelay").join("config.toml")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn first_set<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter().find_map(|key| non_empty(lookup(*key)))
}

fn parse_enum<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn check_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|source| ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
            source,
        })
}

impl Settings {
    /// Load from `path`, or the default location when `None`.
    ///
    /// A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);

        if !config_path.exists() {
            debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let settings: Settings = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: config_path.clone(),
            source,
        })?;
        debug!(path = %config_path.display(), "Loaded config file");
        Ok(settings)
    }

    /// Overlay values from the environment, read through `lookup` so
    /// callers (and tests) decide where variables come from.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = first_set(&lookup, &["GATEWAY_URL", "RPROXY_URL"]) {
            self.gateway.url = Some(url);
        }
        if let Some(credential) =
            first_set(&lookup, &["GATEWAY_AUTH_HEADER", "RPROXY_AUTH_HEADER"])
        {
            self.gateway.credential = Some(credential);
        }
        if let Some(entity_id) = first_set(&lookup, &["ENTITY_ID"]) {
            self.gateway.entity_id = Some(entity_id);
        }
        if let Some(policy) = first_set(&lookup, &["GUARDRELAY_ON_UNREACHABLE"]) {
            self.gateway.on_unreachable = parse_enum("GUARDRELAY_ON_UNREACHABLE", &policy)?;
        }
        if let Some(key) = first_set(&lookup, &["OPENAI_API_KEY"]) {
            self.backend.api_key = Some(key);
        }
        if let Some(api_url) = first_set(&lookup, &["OPENAI_API_URL"]) {
            self.backend.api_url = api_url;
        }
        if let Some(model) = first_set(&lookup, &["DEFAULT_MODEL"]) {
            self.backend.model = model;
        }
        if let Some(mode) = first_set(&lookup, &["GUARDRELAY_CONTEXT_MODE"]) {
            self.pipeline.context_mode = parse_enum("GUARDRELAY_CONTEXT_MODE", &mode)?;
        }
        Ok(())
    }

    /// Overlay the real process environment.
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Check URLs and normalise blank fields. Call after all layers are applied.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.gateway.url = non_empty(self.gateway.url.take());
        self.gateway.credential = non_empty(self.gateway.credential.take());
        self.gateway.entity_id = non_empty(self.gateway.entity_id.take());
        self.backend.api_key = non_empty(self.backend.api_key.take());

        if let Some(url) = self.gateway.url.as_mut() {
            check_url("gateway", url)?;
            if !url.ends_with('/') {
                url.push('/');
            }
        }
        check_url("backend", &self.backend.api_url)?;
        if self.backend.model.trim().is_empty() {
            self.backend.model = DEFAULT_MODEL.to_string();
        }
        Ok(())
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            url: self.gateway.url.clone(),
            credential: self
                .gateway
                .credential
                .clone()
                .and_then(SecretString::non_empty),
            entity_id: self.gateway.entity_id.clone(),
        }
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            api_url: self.backend.api_url.clone(),
            api_key: self
                .backend
                .api_key
                .clone()
                .and_then(SecretString::non_empty),
            model: self.backend.model.clone(),
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            context_mode: self.pipeline.context_mode,
            on_unreachable: self.gateway.on_unreachable,
        }
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.timeout_secs.max(1))
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_leave_gateway_unconfigured() {
        let mut settings = Settings::default();
        settings.validate().unwrap();
        assert!(!settings.gateway_config().is_configured());
        assert_eq!(settings.backend.api_url, DEFAULT_API_URL);
        assert_eq!(settings.backend.model, "gpt-4o-mini");
        assert_eq!(settings.pipeline_options(), PipelineOptions::default());
        assert_eq!(settings.gateway_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn loads_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[gateway]
url = "https://gw.example.com"
credential = "vpsk_live_0123456789abcdef01234567abc"
on_unreachable = "fail-closed"

[pipeline]
context_mode = "full-history"
"#,
        )
        .unwrap();

        let mut settings = Settings::load(Some(path.as_path())).unwrap();
        settings.validate().unwrap();

        assert_eq!(
            settings.gateway.url.as_deref(),
            Some("https://gw.example.com/")
        );
        assert!(settings.gateway_config().is_configured());
        assert_eq!(settings.backend.model, DEFAULT_MODEL);
        let options = settings.pipeline_options();
        assert_eq!(options.context_mode, ContextMode::FullHistory);
        assert_eq!(options.on_unreachable, UnreachablePolicy::FailClosed);
    }

    #[test]
    fn bad_toml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway\nurl = 1").unwrap();

        let err = Settings::load(Some(path.as_path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut settings = Settings::default();
        settings.backend.model = "from-file".into();
        settings
            .apply_env(env(&[
                ("RPROXY_URL", "https://legacy.example.com"),
                ("GATEWAY_AUTH_HEADER", "Bearer vpsk_live_0123456789abcdef01234567zz"),
                ("OPENAI_API_KEY", "sk-env"),
                ("DEFAULT_MODEL", "gpt-4o"),
                ("GUARDRELAY_CONTEXT_MODE", "full-history"),
            ]))
            .unwrap();
        settings.validate().unwrap();

        assert_eq!(
            settings.gateway.url.as_deref(),
            Some("https://legacy.example.com/")
        );
        assert_eq!(settings.backend.model, "gpt-4o");
        assert!(settings.backend_config().has_api_key());
        assert_eq!(settings.pipeline.context_mode, ContextMode::FullHistory);
        assert_eq!(
            settings.gateway_config().entity_id().unwrap().as_str(),
            "0123456789abcdef01234567"
        );
    }

    #[test]
    fn primary_env_name_wins_over_alias() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[
                ("GATEWAY_URL", "https://new.example.com/"),
                ("RPROXY_URL", "https://old.example.com/"),
            ]))
            .unwrap();
        assert_eq!(
            settings.gateway.url.as_deref(),
            Some("https://new.example.com/")
        );
    }

    #[test]
    fn entity_id_env_overrides_the_credential() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[
                ("GATEWAY_URL", "https://gw.example.com/"),
                ("GATEWAY_AUTH_HEADER", "Bearer vpsk_live_0123456789abcdef01234567zz"),
                ("ENTITY_ID", "FFFFFFFFFFFFFFFFFFFFFFFF"),
            ]))
            .unwrap();
        settings.validate().unwrap();
        assert_eq!(
            settings.gateway_config().entity_id().unwrap().as_str(),
            "ffffffffffffffffffffffff"
        );

        settings.apply_env(env(&[("ENTITY_ID", "tenant-7")])).unwrap();
        assert!(settings.gateway_config().entity_id().is_err());
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut settings = Settings::default();
        settings.backend.api_key = Some("sk-file".into());
        settings
            .apply_env(env(&[("OPENAI_API_KEY", "  "), ("GATEWAY_URL", "")]))
            .unwrap();
        assert_eq!(settings.backend.api_key.as_deref(), Some("sk-file"));
        assert_eq!(settings.gateway.url, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(env(&[("GUARDRELAY_ON_UNREACHABLE", "sometimes")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "GUARDRELAY_ON_UNREACHABLE",
                ..
            }
        ));

        let mut settings = Settings::default();
        settings.gateway.url = Some("not a url".into());
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidUrl {
                field: "gateway",
                ..
            })
        ));
    }
}
