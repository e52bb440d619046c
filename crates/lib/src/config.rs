//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.parley/config.json`) and environment.
//! Secrets (classifier and mail API keys) may come from the environment instead of the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Classifier backend, model, and timeout.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Message store backend and location.
    #[serde(default)]
    pub store: StoreConfig,

    /// Outbound mail adapter.
    #[serde(default)]
    pub mail: MailConfig,

    /// Reply/compose policy and listing limits.
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// HTTP port (default 8787).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// The gateway has no auth of its own; binding beyond loopback requires opting in here.
    #[serde(default)]
    pub allow_public_bind: bool,
}

fn default_gateway_port() -> u16 {
    8787
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            allow_public_bind: false,
        }
    }
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "[::1]" || b == "localhost"
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    /// OpenAI-compatible /chat/completions (OpenAI, LM Studio, vLLM, ...).
    #[default]
    Openai,
    /// Ollama /api/chat.
    Ollama,
}

/// Classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierConfig {
    #[serde(default)]
    pub backend: ClassifierBackend,
    /// Base URL; defaults per backend when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model id passed as-is to the backend; defaults per backend when unset.
    #[serde(default)]
    pub model: Option<String>,
    /// API key. Overridden by PARLEY_CLASSIFIER_API_KEY or OPENAI_API_KEY env.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Upper bound for one classifier call in milliseconds (default 20000).
    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,
    /// Whether the deployed schema asks for and keeps the extended logistics fields.
    #[serde(default = "default_true")]
    pub extended_fields: bool,
}

fn default_classifier_timeout_ms() -> u64 {
    20_000
}

fn default_true() -> bool {
    true
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: ClassifierBackend::default(),
            base_url: None,
            model: None,
            api_key: None,
            timeout_ms: default_classifier_timeout_ms(),
            extended_fields: true,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// SQLite file at `store.path`.
    #[default]
    Sqlite,
    /// Process memory only; contents are lost on restart.
    Memory,
}

/// Message store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database path (default ~/.parley/messages.db).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Upper bound for one store operation in milliseconds (default 5000).
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    /// Write outbound mail to the log only.
    #[default]
    Log,
    /// Resend transactional email API.
    Resend,
}

/// Outbound mail settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailConfig {
    #[serde(default)]
    pub provider: MailProvider,
    /// Sender address (e.g. "Parley <relay@example.com>").
    #[serde(default)]
    pub from: Option<String>,
    /// Provider API base URL; defaults per provider.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Provider API key. Overridden by RESEND_API_KEY env.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Relay policy: who may receive mail, and listing bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Recipient addresses reply/compose may send to. Empty means nothing may be sent.
    #[serde(default)]
    pub allow_list: Vec<String>,
    /// Default listing size (default 200).
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
    /// Largest listing size a caller may request (default 500).
    #[serde(default = "default_max_list_limit")]
    pub max_list_limit: usize,
}

fn default_list_limit() -> usize {
    200
}

fn default_max_list_limit() -> usize {
    500
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            allow_list: Vec::new(),
            list_limit: default_list_limit(),
            max_list_limit: default_max_list_limit(),
        }
    }
}

/// Trimmed, non-empty env var value.
fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn trimmed(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the classifier API key: env PARLEY_CLASSIFIER_API_KEY, then OPENAI_API_KEY, then config.
pub fn resolve_classifier_api_key(config: &Config) -> Option<String> {
    env_non_empty("PARLEY_CLASSIFIER_API_KEY")
        .or_else(|| env_non_empty("OPENAI_API_KEY"))
        .or_else(|| trimmed(config.classifier.api_key.as_ref()))
}

/// Resolve the mail API key: env RESEND_API_KEY overrides config.
pub fn resolve_mail_api_key(config: &Config) -> Option<String> {
    env_non_empty("RESEND_API_KEY").or_else(|| trimmed(config.mail.api_key.as_ref()))
}

fn parley_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".parley"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PARLEY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| parley_home().join("config.json"))
}

/// Resolve the SQLite database path: `store.path` or ~/.parley/messages.db.
pub fn resolve_store_path(config: &Config) -> PathBuf {
    config
        .store
        .path
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| parley_home().join("messages.db"))
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
