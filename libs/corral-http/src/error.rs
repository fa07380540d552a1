use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a URL was refused before dialing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    Malformed,
    /// No host, e.g. a path-only URL
    MissingAuthority,
    MissingScheme,
}

/// Transport failure, or a status the caller asked to be checked.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    #[error("invalid url '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    #[error("scheme '{scheme}' refused: {reason}")]
    InvalidScheme { scheme: String, reason: String },

    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("could not assemble request: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("could not encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// No response head within the configured timeout
    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),

    /// Connect, DNS or I/O failure; nothing was received
    #[error("transport failure: {0}")]
    Transport(#[source] BoxError),

    #[error("TLS setup failed: {0}")]
    Tls(#[source] BoxError),

    #[error("response body exceeds {limit} bytes (read {actual})")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Non-2xx status with the start of the body
    #[error("{status} from {url}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        url: String,
        body_preview: String,
        content_type: Option<String>,
    },

    /// The request queue is full
    #[error("request queue is full")]
    Overloaded,

    /// The dispatch worker is gone
    #[error("HTTP client is shut down")]
    ServiceClosed,
}

impl HttpError {
    /// Whether the failure happened before any response was received
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Tls(_) | Self::Timeout(_) | Self::ServiceClosed
        )
    }

    /// Status of an [`HttpError::HttpStatus`]
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}
