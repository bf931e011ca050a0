use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("notification not found: {id}")]
    NotFound { id: String },

    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ClientError {
    /// Short, user-facing description used for the sync indicator.
    pub fn summary(&self) -> &'static str {
        match self {
            ClientError::Transport(_) => "couldn't sync notifications",
            ClientError::NotFound { .. } => "notification no longer available",
            ClientError::UnsupportedEnvironment(_) => "live updates unavailable",
            ClientError::Malformed(_) => "received an unreadable notification",
            ClientError::Config(_) => "notification client misconfigured",
            ClientError::Internal(_) => "couldn't sync notifications",
        }
    }

    /// Whether a manual retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Internal(_))
    }
}

impl From<reqwest_middleware::Error> for ClientError {
    fn from(e: reqwest_middleware::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Malformed(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
