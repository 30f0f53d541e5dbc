//! Configuration module for the call bridge server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Example
//! ```rust,no_run
//! use callbridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use zeroize::Zeroizing;

mod yaml;

pub use yaml::YamlConfig;

use crate::auth::generate_secret;
use crate::core::bridge::{BridgeSettings, DEFAULT_END_CALL_GRACE};
use crate::core::placement::{TWILIO_API_BASE, TwilioSettings};
use crate::core::realtime::openai::{
    DEFAULT_REALTIME_MODEL, DEFAULT_TEMPERATURE, DEFAULT_VOICE, OPENAI_REALTIME_URL,
};
use crate::core::realtime::{RealtimeSessionConfig, SessionSchema, TurnDetectionMode};
use crate::core::tracker::DEFAULT_CALL_TIMEOUT;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3004;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Server configuration
///
/// Contains everything needed to run the bridge:
/// - Listen address and the public URL the telephony provider calls back on
/// - Realtime AI session settings
/// - Telephony provider credentials for placing calls
/// - Call lifecycle timings
#[derive(Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, used to build the media stream URL
    pub public_url: Option<String>,
    /// Bearer token required on the call API; generated when unset
    pub api_secret: Option<String>,
    /// Shared with the provider through the TwiML stream parameters; a
    /// random per-process value when unset
    pub stream_secret: String,

    // Realtime AI session
    pub openai_api_key: Option<String>,
    pub openai_realtime_url: String,
    pub openai_realtime_model: String,
    pub turn_detection: TurnDetectionMode,
    pub session_schema: SessionSchema,
    pub voice: String,
    pub temperature: f32,

    // Telephony provider
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_number: Option<String>,
    pub twilio_api_base: String,
    /// Ask the provider to record placed calls
    pub record_calls: bool,

    // Call lifecycle
    /// Delay between the end_call tool and closing both legs
    pub end_call_grace: Duration,
    /// Default time a caller waits for a placed call to finish
    pub call_timeout: Duration,
}

/// Zeroize secret fields when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut token) = self.twilio_auth_token {
            token.zeroize();
        }
        if let Some(ref mut secret) = self.api_secret {
            secret.zeroize();
        }
        self.stream_secret.zeroize();
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("public_url", &self.public_url)
            .field("api_secret", &redacted(&self.api_secret))
            .field("stream_secret", &"[REDACTED]")
            .field("openai_api_key", &redacted(&self.openai_api_key))
            .field("openai_realtime_url", &self.openai_realtime_url)
            .field("openai_realtime_model", &self.openai_realtime_model)
            .field("turn_detection", &self.turn_detection)
            .field("session_schema", &self.session_schema)
            .field("voice", &self.voice)
            .field("temperature", &self.temperature)
            .field("twilio_account_sid", &self.twilio_account_sid)
            .field("twilio_auth_token", &redacted(&self.twilio_auth_token))
            .field("twilio_number", &self.twilio_number)
            .field("twilio_api_base", &self.twilio_api_base)
            .field("record_calls", &self.record_calls)
            .field("end_call_grace", &self.end_call_grace)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// The `.env` file, if any, is loaded in `main.rs` before this runs.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_file_with(path, |name| std::env::var(name).ok())
    }

    /// [`from_file`](Self::from_file) with an explicit variable source.
    pub fn from_file_with<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let yaml_config = YamlConfig::from_file(path)?;
        let mut config = Self::from_lookup(lookup)?;
        config.apply_yaml(yaml_config)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the configuration from a variable source. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: var("PORT")
                .map(|v| parse_number("PORT", &v))
                .transpose()?
                .unwrap_or(DEFAULT_PORT),
            public_url: var("PUBLIC_URL"),
            api_secret: var("API_SECRET"),
            stream_secret: var("STREAM_SECRET").unwrap_or_else(generate_secret),

            openai_api_key: var("OPENAI_API_KEY"),
            openai_realtime_url: var("OPENAI_REALTIME_URL")
                .unwrap_or_else(|| OPENAI_REALTIME_URL.to_string()),
            openai_realtime_model: var("OPENAI_REALTIME_MODEL")
                .unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string()),
            turn_detection: var("OPENAI_TURN_DETECTION")
                .map(|v| parse_turn_detection(&v))
                .transpose()?
                .unwrap_or_default(),
            session_schema: var("OPENAI_SESSION_SCHEMA")
                .map(|v| SessionSchema::from_setting(&v))
                .unwrap_or_default(),
            voice: var("OPENAI_VOICE").unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            temperature: var("OPENAI_TEMPERATURE")
                .map(|v| parse_number("OPENAI_TEMPERATURE", &v))
                .transpose()?
                .unwrap_or(DEFAULT_TEMPERATURE),

            twilio_account_sid: var("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: var("TWILIO_AUTH_TOKEN"),
            twilio_number: var("TWILIO_NUMBER"),
            twilio_api_base: var("TWILIO_API_BASE")
                .unwrap_or_else(|| TWILIO_API_BASE.to_string()),
            record_calls: var("RECORD").is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),

            end_call_grace: var("END_CALL_GRACE_MS")
                .map(|v| parse_number("END_CALL_GRACE_MS", &v).map(Duration::from_millis))
                .transpose()?
                .unwrap_or(DEFAULT_END_CALL_GRACE),
            call_timeout: var("CALL_TIMEOUT_MS")
                .map(|v| parse_number("CALL_TIMEOUT_MS", &v).map(Duration::from_millis))
                .transpose()?
                .unwrap_or(DEFAULT_CALL_TIMEOUT),
        };

        config.validate()?;
        Ok(config)
    }

    /// Overlay values present in the YAML file.
    fn apply_yaml(&mut self, yaml: YamlConfig) -> Result<(), ConfigError> {
        if let Some(server) = yaml.server {
            if let Some(host) = server.host {
                self.host = host;
            }
            if let Some(port) = server.port {
                self.port = port;
            }
            if server.public_url.is_some() {
                self.public_url = server.public_url;
            }
            if server.api_secret.is_some() {
                self.api_secret = server.api_secret;
            }
        }

        if let Some(openai) = yaml.openai {
            if openai.api_key.is_some() {
                self.openai_api_key = openai.api_key;
            }
            if let Some(url) = openai.realtime_url {
                self.openai_realtime_url = url;
            }
            if let Some(model) = openai.model {
                self.openai_realtime_model = model;
            }
            if let Some(mode) = openai.turn_detection {
                self.turn_detection = parse_turn_detection(&mode)?;
            }
            if let Some(schema) = openai.session_schema {
                self.session_schema = SessionSchema::from_setting(&schema);
            }
            if let Some(voice) = openai.voice {
                self.voice = voice;
            }
            if let Some(temperature) = openai.temperature {
                self.temperature = temperature;
            }
        }

        if let Some(twilio) = yaml.twilio {
            if twilio.account_sid.is_some() {
                self.twilio_account_sid = twilio.account_sid;
            }
            if twilio.auth_token.is_some() {
                self.twilio_auth_token = twilio.auth_token;
            }
            if twilio.number.is_some() {
                self.twilio_number = twilio.number;
            }
            if let Some(api_base) = twilio.api_base {
                self.twilio_api_base = api_base;
            }
            if let Some(record) = twilio.record {
                self.record_calls = record;
            }
        }

        if let Some(calls) = yaml.calls {
            if let Some(ms) = calls.end_call_grace_ms {
                self.end_call_grace = Duration::from_millis(ms);
            }
            if let Some(ms) = calls.timeout_ms {
                self.call_timeout = Duration::from_millis(ms);
            }
        }

        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.openai_realtime_url).map_err(|e| ConfigError::Invalid {
            name: "OPENAI_REALTIME_URL",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::Invalid {
                name: "OPENAI_REALTIME_URL",
                reason: format!("expected ws or wss scheme, got {}", url.scheme()),
            });
        }

        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ConfigError::Invalid {
                name: "OPENAI_TEMPERATURE",
                reason: format!("{} is not a valid temperature", self.temperature),
            });
        }

        if let Some(public_url) = &self.public_url {
            url::Url::parse(public_url).map_err(|e| ConfigError::Invalid {
                name: "PUBLIC_URL",
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings shared by every call bridge.
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            realtime: RealtimeSessionConfig {
                url: self.openai_realtime_url.clone(),
                api_key: Zeroizing::new(self.openai_api_key.clone().unwrap_or_default()),
                model: self.openai_realtime_model.clone(),
                schema: self.session_schema,
                turn_detection: self.turn_detection,
                voice: self.voice.clone(),
                temperature: self.temperature,
            },
            end_call_grace: self.end_call_grace,
            stream_secret: Zeroizing::new(self.stream_secret.clone()),
        }
    }

    /// Settings for placing calls through the telephony provider.
    pub fn twilio_settings(&self) -> TwilioSettings {
        TwilioSettings {
            api_base: self.twilio_api_base.clone(),
            account_sid: self.twilio_account_sid.clone().unwrap_or_default(),
            auth_token: Zeroizing::new(self.twilio_auth_token.clone().unwrap_or_default()),
            from_number: self.twilio_number.clone().unwrap_or_default(),
            public_url: self.public_url.clone().unwrap_or_default(),
            record: self.record_calls,
            stream_secret: Zeroizing::new(self.stream_secret.clone()),
        }
    }
}

fn parse_number<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: format!("'{value}': {e}"),
    })
}

fn parse_turn_detection(value: &str) -> Result<TurnDetectionMode, ConfigError> {
    value.parse().map_err(|reason| ConfigError::Invalid {
        name: "OPENAI_TURN_DETECTION",
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.address(), "0.0.0.0:3004");
        assert_eq!(config.openai_realtime_url, "wss://api.openai.com/v1/realtime");
        assert_eq!(config.openai_realtime_model, "gpt-realtime");
        assert_eq!(config.turn_detection, TurnDetectionMode::SemanticVad);
        assert_eq!(config.session_schema, SessionSchema::Legacy);
        assert_eq!(config.voice, "sage");
        assert!(!config.record_calls);
        assert_eq!(config.end_call_grace, Duration::from_millis(5000));
        assert_eq!(config.call_timeout, Duration::from_millis(300_000));
        assert_eq!(config.twilio_api_base, "https://api.twilio.com");
    }

    #[test]
    fn test_env_values() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("OPENAI_API_KEY", "sk-env"),
            ("OPENAI_TURN_DETECTION", "server_vad"),
            ("OPENAI_SESSION_SCHEMA", "ga"),
            ("RECORD", "true"),
            ("END_CALL_GRACE_MS", "1500"),
            ("CALL_TIMEOUT_MS", "60000"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.turn_detection, TurnDetectionMode::ServerVad);
        assert_eq!(config.session_schema, SessionSchema::Current);
        assert!(config.record_calls);
        assert_eq!(config.end_call_grace, Duration::from_millis(1500));
        assert_eq!(config.call_timeout, Duration::from_millis(60_000));
    }

    #[test]
    fn test_secrets() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_secret, None);
        assert_eq!(config.stream_secret.len(), 32);
        assert_eq!(
            config.twilio_settings().stream_secret.as_str(),
            config.stream_secret
        );

        let other = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_ne!(config.stream_secret, other.stream_secret);

        let config = ServerConfig::from_lookup(lookup(&[
            ("API_SECRET", "api-token"),
            ("STREAM_SECRET", "stream-token"),
        ]))
        .unwrap();
        assert_eq!(config.api_secret.as_deref(), Some("api-token"));
        assert_eq!(config.stream_secret, "stream-token");
    }

    #[test]
    fn test_record_only_for_true() {
        for value in ["1", "yes", "false", ""] {
            let config = ServerConfig::from_lookup(lookup(&[("RECORD", value)])).unwrap();
            assert!(!config.record_calls, "RECORD={value}");
        }
    }

    #[test]
    fn test_invalid_values() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));

        let err =
            ServerConfig::from_lookup(lookup(&[("OPENAI_TURN_DETECTION", "manual")])).unwrap_err();
        assert!(err.to_string().contains("OPENAI_TURN_DETECTION"));

        let err = ServerConfig::from_lookup(lookup(&[(
            "OPENAI_REALTIME_URL",
            "https://api.openai.com/v1/realtime",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("OPENAI_REALTIME_URL"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-super-secret"),
            ("TWILIO_AUTH_TOKEN", "twilio-secret"),
        ]))
        .unwrap();

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-super-secret"));
        assert!(!rendered.contains("twilio-secret"));
        assert!(!rendered.contains(&config.stream_secret));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_bridge_settings() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-env"),
            ("OPENAI_VOICE", "alloy"),
            ("END_CALL_GRACE_MS", "250"),
        ]))
        .unwrap();

        let settings = config.bridge_settings();
        assert_eq!(settings.realtime.api_key.as_str(), "sk-env");
        assert_eq!(settings.stream_secret.as_str(), config.stream_secret);
        assert_eq!(settings.realtime.voice, "alloy");
        assert_eq!(settings.end_call_grace, Duration::from_millis(250));
    }

    #[test]
    fn test_yaml_overrides_env() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
server:
  port: 9000
  public_url: "https://bridge.example.com"
  api_secret: "yaml-token"
openai:
  turn_detection: "server_vad"
  session_schema: "ga"
twilio:
  number: "+15550009"
calls:
  timeout_ms: 1000
"#,
        )
        .unwrap();

        let config = ServerConfig::from_file_with(
            &config_path,
            lookup(&[
                ("PORT", "8080"),
                ("HOST", "127.0.0.1"),
                ("TWILIO_NUMBER", "+15550001"),
            ]),
        )
        .unwrap();

        assert_eq!(config.address(), "127.0.0.1:9000");
        assert_eq!(config.public_url.as_deref(), Some("https://bridge.example.com"));
        assert_eq!(config.api_secret.as_deref(), Some("yaml-token"));
        assert_eq!(config.turn_detection, TurnDetectionMode::ServerVad);
        assert_eq!(config.session_schema, SessionSchema::Current);
        assert_eq!(config.twilio_number.as_deref(), Some("+15550009"));
        assert_eq!(config.call_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_yaml_invalid_turn_detection() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "openai:\n  turn_detection: \"push_to_talk\"\n").unwrap();

        let err = ServerConfig::from_file_with(&config_path, lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
