//! Configuration management
//!
//! Handles loading and validating relay configuration from TOML files,
//! plus endpoint scheme normalization.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Once;
use tracing::warn;

use crate::store::StoreMethod;

/// Payload format negotiated with the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Message bodies are JSON and drive store translation
    Json,
}

impl PayloadFormat {
    /// Parse a format name, case-insensitively. Unknown formats mean raw.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(PayloadFormat::Json),
            _ => None,
        }
    }
}

/// Unknown format names deserialize to `None` (raw), matching `parse`
fn deserialize_payload_format<'de, D>(deserializer: D) -> Result<Option<PayloadFormat>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(PayloadFormat::parse))
}

/// Transport security of the embedding context, used to resolve
/// scheme-relative endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    /// Secure context: `//host` becomes `wss://host`
    Secure,
    /// Insecure context: `//host` becomes `ws://host`
    #[default]
    Insecure,
}

/// Connection configuration, immutable after construction
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Socket endpoint. A scheme-relative `//host/path` is rewritten to
    /// `ws://` or `wss://` based on the transport security context.
    pub endpoint: String,
    /// Payload format; only `"json"` enables store translation, any
    /// other name is treated as raw
    #[serde(default, deserialize_with = "deserialize_payload_format")]
    pub payload_format: Option<PayloadFormat>,
    /// Subprotocol passed to the transport on every (re)connect
    #[serde(default)]
    pub subprotocol: Option<String>,
    /// Reconnect automatically after unexpected closure
    #[serde(default)]
    pub reconnection: bool,
    /// Maximum reconnect attempts (unbounded when absent)
    #[serde(default)]
    pub max_reconnection_attempts: Option<u32>,
    /// Delay between reconnect attempts in milliseconds
    #[serde(default = "default_reconnection_delay_ms")]
    pub reconnection_delay_ms: u64,
    /// Store method used for unmatched targets
    #[serde(default)]
    pub store_method: StoreMethod,
    /// Mapping from canonical event target to a translated target
    #[serde(default)]
    pub method_names: Option<HashMap<String, String>>,
    /// Deprecated alias for `method_names`
    #[serde(default)]
    pub mutations: Option<HashMap<String, String>>,
}

fn default_reconnection_delay_ms() -> u64 {
    1000
}

static MUTATIONS_DEPRECATION: Once = Once::new();

impl RelayConfig {
    /// Minimal configuration for an endpoint, everything else defaulted
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            payload_format: None,
            subprotocol: None,
            reconnection: false,
            max_reconnection_attempts: None,
            reconnection_delay_ms: default_reconnection_delay_ms(),
            store_method: StoreMethod::default(),
            method_names: None,
            mutations: None,
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: RelayConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            anyhow::bail!("endpoint must not be empty");
        }
        if self.reconnection_delay_ms == 0 {
            anyhow::bail!("reconnection_delay_ms must be > 0");
        }
        Ok(())
    }

    /// Rewrite a scheme-relative endpoint (`//host/path`) to a concrete
    /// `ws://` or `wss://` address. Absolute endpoints pass through.
    pub fn normalize_endpoint(&mut self, security: TransportSecurity) {
        if let Some(rest) = self.endpoint.strip_prefix("//") {
            let scheme = match security {
                TransportSecurity::Secure => "wss",
                TransportSecurity::Insecure => "ws",
            };
            self.endpoint = format!("{scheme}://{rest}");
        }
    }

    /// Fold the deprecated `mutations` alias into `method_names`,
    /// warning once per process.
    pub fn resolve_method_names(&mut self) {
        if let Some(mutations) = self.mutations.take() {
            MUTATIONS_DEPRECATION.call_once(|| {
                warn!("the `mutations` option is deprecated, use `method_names` instead");
            });
            if self.method_names.is_none() {
                self.method_names = Some(mutations);
            }
        }
    }

    /// True when JSON mode is active
    pub fn json_mode(&self) -> bool {
        self.payload_format == Some(PayloadFormat::Json)
    }
}

/// Logging configuration for the CLI runner
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::new("ws://localhost:9001/ws");
        assert!(!config.reconnection);
        assert_eq!(config.max_reconnection_attempts, None);
        assert_eq!(config.reconnection_delay_ms, 1000);
        assert_eq!(config.store_method, StoreMethod::Commit);
        assert!(!config.json_mode());
    }

    #[test]
    fn test_scheme_relative_endpoint_secure() {
        let mut config = RelayConfig::new("//host/path");
        config.normalize_endpoint(TransportSecurity::Secure);
        assert_eq!(config.endpoint, "wss://host/path");
    }

    #[test]
    fn test_scheme_relative_endpoint_insecure() {
        let mut config = RelayConfig::new("//host/path");
        config.normalize_endpoint(TransportSecurity::Insecure);
        assert_eq!(config.endpoint, "ws://host/path");
    }

    #[test]
    fn test_absolute_endpoint_untouched() {
        let mut config = RelayConfig::new("wss://example.com/socket");
        config.normalize_endpoint(TransportSecurity::Insecure);
        assert_eq!(config.endpoint, "wss://example.com/socket");
    }

    #[test]
    fn test_payload_format_case_insensitive() {
        assert_eq!(PayloadFormat::parse("JSON"), Some(PayloadFormat::Json));
        assert_eq!(PayloadFormat::parse("json"), Some(PayloadFormat::Json));
        assert_eq!(PayloadFormat::parse("msgpack"), None);
    }

    #[test]
    fn test_unknown_payload_format_means_raw() {
        let config: RelayConfig = toml::from_str(
            r#"
            endpoint = "ws://localhost/ws"
            payload_format = "msgpack"
            "#,
        )
        .unwrap();
        assert_eq!(config.payload_format, None);
        assert!(!config.json_mode());
    }

    #[test]
    fn test_mutations_alias_resolves() {
        let mut config = RelayConfig::new("ws://localhost/ws");
        let mut map = HashMap::new();
        map.insert("auth/setUser".to_string(), "AUTH_SET_USER".to_string());
        config.mutations = Some(map);

        config.resolve_method_names();
        assert!(config.mutations.is_none());
        assert_eq!(
            config.method_names.as_ref().unwrap().get("auth/setUser"),
            Some(&"AUTH_SET_USER".to_string())
        );
    }

    #[test]
    fn test_method_names_win_over_mutations() {
        let mut config = RelayConfig::new("ws://localhost/ws");
        config.method_names = Some(HashMap::from([(
            "a".to_string(),
            "modern".to_string(),
        )]));
        config.mutations = Some(HashMap::from([(
            "a".to_string(),
            "legacy".to_string(),
        )]));

        config.resolve_method_names();
        assert_eq!(
            config.method_names.as_ref().unwrap().get("a"),
            Some(&"modern".to_string())
        );
    }

    #[test]
    fn test_toml_parsing() {
        let config: RelayConfig = toml::from_str(
            r#"
            endpoint = "//localhost:9001/ws"
            payload_format = "JSON"
            reconnection = true
            max_reconnection_attempts = 5
            reconnection_delay_ms = 250
            store_method = "dispatch"

            [method_names]
            "auth/setUser" = "AUTH_SET_USER"
            "#,
        )
        .unwrap();

        assert!(config.json_mode());
        assert!(config.reconnection);
        assert_eq!(config.max_reconnection_attempts, Some(5));
        assert_eq!(config.reconnection_delay_ms, 250);
        assert_eq!(config.store_method, StoreMethod::Dispatch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_delay() {
        let mut config = RelayConfig::new("ws://localhost/ws");
        config.reconnection_delay_ms = 0;
        assert!(config.validate().is_err());
    }
}
