use thiserror::Error;

/// Result type for bets-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Path of the session check; a 401 from it means "not logged in yet",
/// not "session expired".
const SESSION_PROBE_PATH: &str = "/auth/me";

/// Error types for bets-sync
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed URL
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// API error response
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The API rejected the request because the session is missing or expired
    #[error("Unauthorized request to {path}")]
    Unauthorized { path: String },

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// WebSocket connection closed
    #[error("WebSocket connection closed")]
    ConnectionClosed,
}

impl Error {
    /// Whether the caller should send the user back to the login screen.
    ///
    /// A 401 on the session check is the normal "anonymous" answer and is
    /// left to whoever bootstraps the session.
    pub fn requires_login(&self) -> bool {
        matches!(self, Error::Unauthorized { path } if path != SESSION_PROBE_PATH)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        match err {
            tokio_tungstenite::tungstenite::Error::ConnectionClosed
            | tokio_tungstenite::tungstenite::Error::AlreadyClosed => Error::ConnectionClosed,
            other => Error::WebSocket(other.to_string()),
        }
    }
}
