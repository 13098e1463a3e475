use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Config error: {0}")]
    Config(String),

    /// The Bot API answered with `ok: false` or a non-2xx status.
    #[error("{description}")]
    Api {
        description: String,
        error_code: Option<i64>,
    },

    #[error("Payload error: {0}")]
    Payload(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BotError {
    /// Shorthand for handlers that want to fail with a plain message.
    pub fn handler(msg: impl Into<String>) -> Self {
        BotError::Handler(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
