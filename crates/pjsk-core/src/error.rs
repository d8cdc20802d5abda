use thiserror::Error;

use crate::region::Region;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown region: {0:?}")]
    UnknownRegion(String),

    #[error("Profile {user_id} not found on {region}")]
    ProfileNotFound { region: Region, user_id: u64 },

    #[error("Upstream rejected app version {attempted} after retry with {retried}")]
    ProtocolVersion { attempted: String, retried: String },

    #[error("Failed to decrypt upstream payload: {0}")]
    Decryption(String),

    #[error("Account pull cooldown active, {remaining}s remaining")]
    Cooldown { remaining: i64 },

    #[error("No data available yet for {0}")]
    NoDataYet(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            format!("Request timed out: {}", e)
        } else if e.is_connect() {
            format!("Connection failed: {}", e)
        } else if e.is_request() {
            format!("Request error: {}", e)
        } else if let Some(status) = e.status() {
            format!("HTTP {} error: {}", status.as_u16(), e)
        } else {
            format!("HTTP error: {}", e)
        };
        Error::Http(message)
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::MalformedPayload(format!("msgpack encode: {}", e))
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Decryption(format!("msgpack decode: {}", e))
    }
}
