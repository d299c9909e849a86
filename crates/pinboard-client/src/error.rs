use thiserror::Error;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// A remote read or write that did not go through.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote rejected the request with status {status}")]
    Rejected { status: u16 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("could not decode remote response: {0}")]
    Decode(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Rejected { status: 409 })
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Rejected {
                status: status.as_u16(),
            }
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RemoteError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Failures reported by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("identity provider is not configured")]
    Unconfigured,

    #[error("domain '{0}' is not authorized for sign-in")]
    UnauthorizedDomain(String),

    #[error("identity provider error: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
}
