use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const BOT_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const CHAT_ID_VAR: &str = "TELEGRAM_CHAT_ID";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_route")]
    pub route: String,
    /// Request bodies above this size are answered as an invalid lead
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Where the Bot API lives. Secrets never go here; see [`CredentialSource`].
#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            route: default_route(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_route() -> String {
    "/lead".to_string()
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load settings from a TOML file. A missing file yields the defaults,
    /// an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;

        if config.server.max_body_bytes == 0 {
            anyhow::bail!("server.max_body_bytes must be greater than zero");
        }

        if !config.server.route.starts_with('/') {
            anyhow::bail!(
                "server.route must start with '/', got {:?}",
                config.server.route
            );
        }

        Ok(config)
    }
}

/// Bot token and destination chat, both required to relay a lead.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub bot_token: String,
    pub chat_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Where credentials come from. They are resolved on every request, so a
/// missing variable is reported per request rather than at startup.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    Environment,
    #[allow(dead_code)]
    Fixed {
        bot_token: Option<String>,
        chat_id: Option<String>,
    },
}

impl CredentialSource {
    pub fn resolve(&self) -> Option<Credentials> {
        let (bot_token, chat_id) = match self {
            CredentialSource::Environment => (
                std::env::var(BOT_TOKEN_VAR).ok(),
                std::env::var(CHAT_ID_VAR).ok(),
            ),
            CredentialSource::Fixed { bot_token, chat_id } => (bot_token.clone(), chat_id.clone()),
        };

        // An empty value counts as unset
        let bot_token = bot_token.filter(|t| !t.is_empty())?;
        let chat_id = chat_id.filter(|c| !c.is_empty())?;

        Some(Credentials { bot_token, chat_id })
    }
}
