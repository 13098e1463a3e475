use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_polling_delay")]
    pub polling_delay_ms: u64,
    #[serde(default)]
    pub fan_out: FanOut,
    /// Install the process-wide Ctrl-C handler when polling starts.
    #[serde(default = "default_true")]
    pub handle_interrupt: bool,
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_polling_delay() -> u64 {
    200
}
fn default_true() -> bool {
    true
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout(),
            polling_delay_ms: default_polling_delay(),
            fan_out: FanOut::default(),
            handle_interrupt: true,
        }
    }
}

impl BotConfig {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn polling_delay(&self) -> Duration {
        Duration::from_millis(self.polling_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(BotError::Config("bot.token is required".to_string()));
        }
        url::Url::parse(&self.api_url)
            .map_err(|e| BotError::Config(format!("Invalid bot.api_url '{}': {e}", self.api_url)))?;
        Ok(())
    }
}

/// How a polled batch of updates is handed to the dispatcher.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FanOut {
    /// Every update in the batch is dispatched at once; no ordering between them.
    #[default]
    Concurrent,
    /// Updates are dispatched one after another in id order.
    Sequential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Public URL registered with `setWebhook`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub secret_token: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1:8443".to_string()
}

fn default_path() -> String {
    "/telegram/webhook".to_string()
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            path: default_path(),
            url: None,
            secret_token: None,
        }
    }
}

impl WebhookConfig {
    /// The configured secret, treating an empty string (unset env var) as none.
    pub fn secret(&self) -> Option<&str> {
        self.secret_token.as_deref().filter(|s| !s.is_empty())
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BotError::Config(format!("Failed to read config: {e}")))?;
        let content = substitute_env_vars(&content);
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        home_dir().join("config.toml")
    }

    pub fn default_toml() -> &'static str {
        r#"[bot]
token = "${TELEGRAM_BOT_TOKEN}"
api_url = "https://api.telegram.org"
request_timeout_secs = 30
polling_delay_ms = 200
fan_out = "concurrent"
handle_interrupt = true

[webhook]
bind = "127.0.0.1:8443"
path = "/telegram/webhook"
# url = "https://example.com/telegram/webhook"
secret_token = "${TELEGRAM_WEBHOOK_SECRET}"
"#
    }
}

/// `~/.tgbot`, falling back to the current directory.
pub fn home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tgbot")
}

/// Substitute `${VAR_NAME}` patterns with environment variable values.
pub fn substitute_env_vars(input: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .to_string()
}
