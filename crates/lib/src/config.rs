//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.hakobu/config.json`).
//! Secrets can always be supplied via environment variables, which take
//! precedence over the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// LINE Messaging API credentials.
    #[serde(default)]
    pub line: LineConfig,

    /// Dify chat app settings.
    #[serde(default)]
    pub dify: DifyConfig,

    /// Google Apps Script forwarding settings.
    #[serde(default)]
    pub gas: GasConfig,

    /// Daily digest settings.
    #[serde(default)]
    pub digest: DigestConfig,

    /// Structured deal field-set settings.
    #[serde(default)]
    pub fields: FieldsConfig,
}

/// Server bind and port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for the webhook endpoints (default 8001).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1"; put a reverse proxy in front when exposing).
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

fn default_server_port() -> u16 {
    8001
}

fn default_server_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
        }
    }
}

/// LINE channel credentials. Both are overridable via env.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineConfig {
    /// Channel access token for push/reply. Overridden by LINE_CHANNEL_ACCESS_TOKEN env when set.
    pub channel_access_token: Option<String>,
    /// Channel secret for webhook signature verification. Overridden by LINE_CHANNEL_SECRET env when set.
    /// When absent, signature verification is skipped (local development only).
    pub channel_secret: Option<String>,
}

/// Dify chat app settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifyConfig {
    /// App API key. Overridden by DIFY_API_KEY env when set.
    pub api_key: Option<String>,
    /// API base URL (default "https://api.dify.ai/v1"). Overridden by DIFY_BASE_URL env when set.
    pub base_url: Option<String>,
    /// User identifier sent with every query (default "abc-123"). Overridden by DIFY_USER env when set.
    pub user: Option<String>,
}

/// GAS web-app forwarding settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasConfig {
    /// Deployed web-app /exec URL. Overridden by GAS_WEBHOOK_URL env when set.
    /// When absent, forwarding reports a failure string instead of posting.
    pub webhook_url: Option<String>,
}

/// Daily digest settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestConfig {
    /// LINE user id that receives the daily deal digest. Overridden by HAKOBU_DIGEST_RECIPIENT env when set.
    pub recipient: Option<String>,
}

/// Which deal field set the extractor requires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldsConfig {
    /// Field-set version: 1 (base deal fields) or 2 (base + prefecture/code/createdat/rawtext). Default 1.
    #[serde(default)]
    pub version: Option<u32>,
}

/// Env var override helper: non-empty env value wins over the config value.
fn env_or(config_value: Option<&String>, env_key: &str) -> Option<String> {
    std::env::var(env_key)
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config_value
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the LINE channel access token: env LINE_CHANNEL_ACCESS_TOKEN overrides config.
pub fn resolve_channel_access_token(config: &Config) -> Option<String> {
    env_or(
        config.line.channel_access_token.as_ref(),
        "LINE_CHANNEL_ACCESS_TOKEN",
    )
}

/// Resolve the LINE channel secret: env LINE_CHANNEL_SECRET overrides config.
pub fn resolve_channel_secret(config: &Config) -> Option<String> {
    env_or(config.line.channel_secret.as_ref(), "LINE_CHANNEL_SECRET")
}

/// Resolve the Dify API key: env DIFY_API_KEY overrides config.
pub fn resolve_dify_api_key(config: &Config) -> Option<String> {
    env_or(config.dify.api_key.as_ref(), "DIFY_API_KEY")
}

/// Resolve the Dify base URL: env DIFY_BASE_URL overrides config; falls back to the public API.
pub fn resolve_dify_base_url(config: &Config) -> String {
    env_or(config.dify.base_url.as_ref(), "DIFY_BASE_URL")
        .unwrap_or_else(|| crate::llm::DEFAULT_DIFY_BASE_URL.to_string())
}

/// Resolve the Dify user id: env DIFY_USER overrides config; falls back to the default id.
pub fn resolve_dify_user(config: &Config) -> String {
    env_or(config.dify.user.as_ref(), "DIFY_USER")
        .unwrap_or_else(|| crate::llm::DEFAULT_DIFY_USER.to_string())
}

/// Resolve the GAS webhook URL: env GAS_WEBHOOK_URL overrides config.
pub fn resolve_gas_webhook_url(config: &Config) -> Option<String> {
    env_or(config.gas.webhook_url.as_ref(), "GAS_WEBHOOK_URL")
}

/// Resolve the digest recipient: env HAKOBU_DIGEST_RECIPIENT overrides config.
pub fn resolve_digest_recipient(config: &Config) -> Option<String> {
    env_or(config.digest.recipient.as_ref(), "HAKOBU_DIGEST_RECIPIENT")
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("HAKOBU_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".hakobu").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or HAKOBU_CONFIG_PATH). Missing file => default config.
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
