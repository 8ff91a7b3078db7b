//! Configuration loading, validation, and management for Easel.
//!
//! Loads configuration from `~/.easel/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Credentials are resolved here, once, and then passed explicitly into
//! providers and tool connectors. Nothing downstream reads the process
//! environment.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.easel/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat-completion API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_provider")]
    pub default_provider: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub agents: AgentsConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// The image-generation tool server
    #[serde(default)]
    pub tool_server: ToolServerConfig,
}

fn default_provider() -> String {
    "dashscope".into()
}
fn default_model() -> String {
    "qwen-max".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    16000
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("gateway", &self.gateway)
            .field("agents", &self.agents)
            .field("providers", &self.providers)
            .field("tool_server", &self.tool_server)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Live playground sessions kept in memory before the oldest is evicted
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_sessions() -> usize {
    64
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Behavior shared by every agent in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// How many previous exchanges are replayed to the model
    #[serde(default = "default_history_responses")]
    pub num_history_responses: usize,

    /// Safety limit on tool-call rounds per message
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
}

fn default_history_responses() -> usize {
    3
}
fn default_max_tool_iterations() -> u32 {
    10
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            num_history_responses: default_history_responses(),
            max_tool_iterations: default_max_tool_iterations(),
        }
    }
}

/// The external tool server attached to the image generator.
#[derive(Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    #[serde(default = "default_tool_server_name")]
    pub name: String,

    /// Executable speaking MCP over stdio
    #[serde(default = "default_tool_command")]
    pub command: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Extra environment for the child process
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Credential handed to the child as `api_key_env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_tool_api_key_env")]
    pub api_key_env: String,

    /// Variables copied from the parent environment when present
    #[serde(default = "default_forward_env")]
    pub forward_env: Vec<String>,

    /// Connect when the agent starts rather than on the first message
    #[serde(default = "default_true")]
    pub auto_connect: bool,

    /// Additional error keywords treated as transient
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_transient_keywords: Vec<String>,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_tool_server_name() -> String {
    "wavespeed".into()
}
fn default_tool_command() -> String {
    "wavespeed-mcp".into()
}
fn default_tool_api_key_env() -> String {
    "WAVESPEED_API_KEY".into()
}
fn default_forward_env() -> Vec<String> {
    vec![
        "WAVESPEED_API_HOST".into(),
        "WAVESPEED_API_RESOURCE_MODE".into(),
    ]
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            name: default_tool_server_name(),
            command: default_tool_command(),
            args: vec![],
            env: HashMap::new(),
            api_key: None,
            api_key_env: default_tool_api_key_env(),
            forward_env: default_forward_env(),
            auto_connect: true,
            extra_transient_keywords: vec![],
            retry: RetryConfig::default(),
        }
    }
}

impl std::fmt::Debug for ToolServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolServerConfig")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env_keys", &self.env.keys().collect::<Vec<_>>())
            .field("api_key", &redact(&self.api_key))
            .field("api_key_env", &self.api_key_env)
            .field("forward_env", &self.forward_env)
            .field("auto_connect", &self.auto_connect)
            .field("extra_transient_keywords", &self.extra_transient_keywords)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Connection retry settings, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Handshake timeout of the first attempt
    #[serde(default = "default_base_timeout")]
    pub base_timeout_secs: u64,

    /// Added to the handshake timeout for every further attempt
    #[serde(default = "default_timeout_growth")]
    pub timeout_growth_secs: u64,

    /// Pause before the first retry
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,

    #[serde(default)]
    pub delay_growth_secs: u64,

    /// Upper bound on one chat-completion turn; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_timeout() -> u64 {
    30
}
fn default_timeout_growth() -> u64 {
    10
}
fn default_base_delay() -> u64 {
    3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_timeout_secs: default_base_timeout(),
            timeout_growth_secs: default_timeout_growth(),
            base_delay_secs: default_base_delay(),
            delay_growth_secs: 0,
            request_timeout_secs: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.easel/config.toml).
    ///
    /// Environment overrides:
    /// - `EASEL_API_KEY`, then `DASHSCOPE_API_KEY`, then `OPENAI_API_KEY`
    /// - `EASEL_PROVIDER`, `EASEL_MODEL`
    /// - the tool server's `api_key_env` (default `WAVESPEED_API_KEY`)
    /// - every name listed in `tool_server.forward_env`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` as the variable source.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("EASEL_API_KEY")
                .or_else(|| lookup("DASHSCOPE_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("EASEL_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("EASEL_MODEL") {
            self.default_model = model;
        }

        let tool = &mut self.tool_server;
        if tool.api_key.is_none() {
            tool.api_key = lookup(&tool.api_key_env).filter(|key| !key.is_empty());
        }
        for name in &tool.forward_env {
            if tool.env.contains_key(name) {
                continue;
            }
            if let Some(value) = lookup(name) {
                tool.env.insert(name.clone(), value);
            }
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs_home().join(".easel")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.tool_server.command.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "tool_server.command must not be empty".into(),
            ));
        }

        if self.tool_server.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "tool_server.retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.gateway.max_sessions == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.max_sessions must be at least 1".into(),
            ));
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            gateway: GatewayConfig::default(),
            agents: AgentsConfig::default(),
            providers: HashMap::new(),
            tool_server: ToolServerConfig::default(),
        }
    }
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "dashscope");
        assert_eq!(config.default_model, "qwen-max");
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.agents.num_history_responses, 3);
        assert_eq!(config.tool_server.command, "wavespeed-mcp");
        assert_eq!(config.tool_server.retry.max_attempts, 3);
        assert!(config.tool_server.auto_connect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.tool_server.retry, config.tool_server.retry);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = AppConfig::default();
        config.tool_server.retry.max_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "dashscope");
    }

    #[test]
    fn load_from_file_with_tool_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_model = "qwen-plus"

[tool_server]
command = "npx"
args = ["-y", "wavespeed-mcp"]
auto_connect = false
extra_transient_keywords = ["wavespeed"]

[tool_server.retry]
max_attempts = 2
base_timeout_secs = 5
request_timeout_secs = 120
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "qwen-plus");
        assert_eq!(config.tool_server.command, "npx");
        assert_eq!(config.tool_server.args, vec!["-y", "wavespeed-mcp"]);
        assert!(!config.tool_server.auto_connect);
        assert_eq!(config.tool_server.retry.max_attempts, 2);
        assert_eq!(config.tool_server.retry.base_timeout_secs, 5);
        assert_eq!(config.tool_server.retry.timeout_growth_secs, 10);
        assert_eq!(config.tool_server.retry.request_timeout_secs, Some(120));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_model = [").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_fill_credentials() {
        let mut config = AppConfig::default();
        config.apply_env(env_of(&[
            ("DASHSCOPE_API_KEY", "sk-dash"),
            ("EASEL_MODEL", "qwen-turbo"),
            ("WAVESPEED_API_KEY", "ws-key"),
            ("WAVESPEED_API_HOST", "https://api.wavespeed.ai"),
        ]));

        assert_eq!(config.api_key.as_deref(), Some("sk-dash"));
        assert_eq!(config.default_model, "qwen-turbo");
        assert_eq!(config.tool_server.api_key.as_deref(), Some("ws-key"));
        assert_eq!(
            config.tool_server.env.get("WAVESPEED_API_HOST").map(String::as_str),
            Some("https://api.wavespeed.ai")
        );
        assert!(!config.tool_server.env.contains_key("WAVESPEED_API_RESOURCE_MODE"));
    }

    #[test]
    fn file_values_win_over_env() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.tool_server.api_key = Some("tool-from-file".into());
        config.apply_env(env_of(&[
            ("EASEL_API_KEY", "from-env"),
            ("WAVESPEED_API_KEY", "tool-from-env"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.tool_server.api_key.as_deref(), Some("tool-from-file"));
    }

    #[test]
    fn empty_tool_key_counts_as_missing() {
        let mut config = AppConfig::default();
        config.apply_env(env_of(&[("WAVESPEED_API_KEY", "")]));
        assert!(config.tool_server.api_key.is_none());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        config.tool_server.api_key = Some("ws-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("ws-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("dashscope"));
        assert!(toml_str.contains("wavespeed-mcp"));
    }
}
