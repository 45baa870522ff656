use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Credential refresh exhausted: {0}")]
    CredentialExhausted(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

impl RemoteError {
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    /// Errors that abort the whole request instead of escalating to the next
    /// search strategy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::CredentialExhausted(_) | Self::Cancelled
        )
    }

    /// Errors the caller may retry locally after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }

    /// Status code a transport front end should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Unauthorized(_) | Self::CredentialExhausted(_) => 401,
            Self::RateLimited { .. } => 429,
            Self::Configuration(_) => 400,
            Self::Cancelled => 499,
            Self::Decode(_) => 502,
            Self::Transient(_) | Self::Unavailable(_) => 503,
        }
    }
}
