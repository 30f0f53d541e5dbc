use serde::Deserialize;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3004
///   public_url: "https://bridge.example.com"
///   api_secret: "..."
///
/// openai:
///   api_key: "sk-..."
///   realtime_url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-realtime"
///   turn_detection: "semantic_vad"
///   session_schema: "ga"
///   voice: "sage"
///   temperature: 0.8
///
/// twilio:
///   account_sid: "AC..."
///   auth_token: "..."
///   number: "+15550001"
///   api_base: "https://api.twilio.com"
///   record: false
///
/// calls:
///   end_call_grace_ms: 5000
///   timeout_ms: 300000
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub openai: Option<OpenAIYaml>,
    pub twilio: Option<TwilioYaml>,
    pub calls: Option<CallsYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_url: Option<String>,
    /// Bearer token for the call API
    pub api_secret: Option<String>,
}

/// Realtime AI session configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAIYaml {
    pub api_key: Option<String>,
    pub realtime_url: Option<String>,
    pub model: Option<String>,
    /// "server_vad" or "semantic_vad"
    pub turn_detection: Option<String>,
    /// "ga" selects the current schema, anything else legacy
    pub session_schema: Option<String>,
    pub voice: Option<String>,
    pub temperature: Option<f32>,
}

/// Telephony provider configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TwilioYaml {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub number: Option<String>,
    pub api_base: Option<String>,
    pub record: Option<bool>,
}

/// Call lifecycle timings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CallsYaml {
    pub end_call_grace_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: YamlConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}
