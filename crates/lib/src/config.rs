//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.simon/config.json`) and
//! environment. Secrets (WhatsApp token, completion API key) can be supplied
//! either way; environment overrides the file.

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

    /// WhatsApp Cloud API settings.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Completion backend settings.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Conversation store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

/// Server bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for the webhook HTTP server (default 8080).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1"). Expose via a reverse proxy.
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

fn default_server_port() -> u16 {
    8080
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

/// WhatsApp Cloud API config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppConfig {
    /// Bearer token for the Cloud API. Overridden by WHATSAPP_API_TOKEN env.
    pub api_token: Option<String>,
    /// Sender phone-number id. Overridden by WHATSAPP_NUMBER_ID env.
    pub number_id: Option<String>,
    /// Shared secret for the webhook verification handshake. Overridden by
    /// WHATSAPP_HOOK_TOKEN env.
    pub verify_token: Option<String>,
    /// Graph API base URL override (for tests or API version pinning).
    pub api_base: Option<String>,
}

/// Completion backend config (OpenAI-compatible completions endpoint).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionConfig {
    /// API key. Overridden by OPENAI_API_KEY env.
    pub api_key: Option<String>,
    /// Base URL override (default https://api.openai.com/v1).
    pub base_url: Option<String>,
    /// Model id (default "text-davinci-003").
    pub model: Option<String>,
}

/// Conversation store config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Directory for per-sender conversation files (default
    /// ~/.simon/conversations).
    pub directory: Option<PathBuf>,
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn config_nonempty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the WhatsApp bearer token: env WHATSAPP_API_TOKEN overrides config.
pub fn resolve_whatsapp_token(config: &Config) -> Option<String> {
    env_nonempty("WHATSAPP_API_TOKEN").or_else(|| config_nonempty(config.whatsapp.api_token.as_ref()))
}

/// Resolve the sender phone-number id: env WHATSAPP_NUMBER_ID overrides config.
pub fn resolve_number_id(config: &Config) -> Option<String> {
    env_nonempty("WHATSAPP_NUMBER_ID").or_else(|| config_nonempty(config.whatsapp.number_id.as_ref()))
}

/// Resolve the webhook verification secret: env WHATSAPP_HOOK_TOKEN overrides config.
pub fn resolve_verify_token(config: &Config) -> Option<String> {
    env_nonempty("WHATSAPP_HOOK_TOKEN")
        .or_else(|| config_nonempty(config.whatsapp.verify_token.as_ref()))
}

/// Resolve the completion API key: env OPENAI_API_KEY overrides config.
pub fn resolve_completion_key(config: &Config) -> Option<String> {
    env_nonempty("OPENAI_API_KEY").or_else(|| config_nonempty(config.completion.api_key.as_ref()))
}

/// Resolve the conversation store directory (default ~/.simon/conversations).
pub fn resolve_store_dir(config: &Config) -> PathBuf {
    config.store.directory.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .map(|h| h.join(".simon").join("conversations"))
            .unwrap_or_else(|| PathBuf::from("conversations"))
    })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("SIMON_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".simon").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or SIMON_CONFIG_PATH). Missing file =>
/// default config. Returns the config and the path that was used.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_port_and_bind() {
        let s = ServerConfig::default();
        assert_eq!(s.port, 8080);
        assert_eq!(s.bind, "127.0.0.1");
    }

    #[test]
    fn store_dir_override() {
        let mut config = Config::default();
        config.store.directory = Some(PathBuf::from("/srv/simon/conversations"));
        assert_eq!(
            resolve_store_dir(&config),
            PathBuf::from("/srv/simon/conversations")
        );
    }

    #[test]
    fn empty_config_values_are_ignored() {
        let mut config = Config::default();
        config.whatsapp.api_token = Some("   ".to_string());
        assert_eq!(resolve_whatsapp_token(&config), None);
        config.whatsapp.api_token = Some("tok".to_string());
        assert_eq!(resolve_whatsapp_token(&config), Some("tok".to_string()));
    }

    #[test]
    fn parses_camel_case_sections() {
        let json = r#"{
            "server": { "port": 9000 },
            "whatsapp": { "numberId": "1055", "verifyToken": "secret" },
            "completion": { "model": "text-davinci-003" }
        }"#;
        let config: Config = serde_json::from_str(json).expect("parse");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.whatsapp.number_id.as_deref(), Some("1055"));
        assert_eq!(config.whatsapp.verify_token.as_deref(), Some("secret"));
        assert_eq!(config.completion.model.as_deref(), Some("text-davinci-003"));
    }
}
