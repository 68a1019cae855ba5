use std::io::ErrorKind;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("VK API error {code}: {message}")]
    Vk { code: i64, message: String },

    #[error("Telegram API error {code}: {description}")]
    Telegram { code: u16, description: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing data: {0}")]
    MissingData(String),
}

impl Error {
    /// Connectivity-class failure: worth one more attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            Error::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
