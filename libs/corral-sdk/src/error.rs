//! Error taxonomy shared by every operation and wait primitive.

use crate::models::Collection;
use std::time::Duration;
use thiserror::Error;

/// Status code the control plane answers with when an entity does not exist
pub const STATUS_NOT_FOUND: u16 = 404;
/// Status code for an authenticated caller lacking permission
pub const STATUS_FORBIDDEN: u16 = 403;
/// Status code for a write that lost an optimistic-concurrency race
pub const STATUS_CONFLICT: u16 = 409;

/// A response was received with a status of 300 or above.
///
/// The server body is parsed for the norman `{"type":"error","code","message"}`
/// envelope when present, so callers never have to pick the message out of the
/// display string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestError {
    /// HTTP status code
    pub status: u16,
    /// Canonical reason phrase of `status` (e.g. `"Forbidden"`)
    pub status_text: String,
    /// URL the request was sent to
    pub url: String,
    /// Machine-readable error code from the body (e.g. `"PermissionDenied"`)
    pub code: Option<String>,
    /// Human-readable message from the body, or the raw body preview
    pub message: Option<String>,
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} for {}", self.status, self.status_text, self.url)?;
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, ": [{code}] {message}"),
            (None, Some(message)) => write!(f, ": {message}"),
            (Some(code), None) => write!(f, ": [{code}]"),
            (None, None) => Ok(()),
        }
    }
}

impl std::error::Error for RequestError {}

/// Errors returned by operations, pagination and waits
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// No response was received (DNS, connect, TLS, timeout, reset)
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A response with a non-success status was received
    #[error("request failed: {0}")]
    Request(RequestError),

    /// The addressed entity does not exist (HTTP 404)
    #[error("not found: {0}")]
    NotFound(RequestError),

    /// The target does not expose the requested action to this caller
    #[error("action '{action}' is not available on {target}")]
    ActionNotPermitted { action: String, target: String },

    /// A wait primitive ran out of time
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout {
        what: String,
        waited: Duration,
        /// Fetches (or events) observed before giving up
        attempts: u32,
    },

    /// The server emitted an `ERROR` event on a watch stream
    #[error("watch stream error: {message}")]
    WatchStream { code: Option<u16>, message: String },

    /// A response body did not have the expected shape
    #[error("failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    /// A wait condition reported a fatal state
    #[error("condition failed: {0}")]
    Condition(String),

    /// Invalid configuration, URL or missing link
    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Build the status-carrying variant, routing 404 to [`ApiError::NotFound`].
    #[must_use]
    pub fn from_status(err: RequestError) -> Self {
        if err.status == STATUS_NOT_FOUND {
            Self::NotFound(err)
        } else {
            Self::Request(err)
        }
    }

    /// Wrap a decoding failure.
    #[must_use]
    pub fn decode(what: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// HTTP status of the failed request, if a response was received
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.request_error().map(|e| e.status)
    }

    /// The structured request error, if a response was received
    #[must_use]
    pub fn request_error(&self) -> Option<&RequestError> {
        match self {
            Self::Request(e) | Self::NotFound(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(STATUS_FORBIDDEN)
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(STATUS_CONFLICT)
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// `list_all` failed part-way through the cursor chain.
///
/// `partial` holds every element fetched before the failing page, in order.
#[derive(Debug)]
pub struct PartialListError<T> {
    pub partial: Collection<T>,
    pub source: ApiError,
}

impl<T> std::fmt::Display for PartialListError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "listing stopped after {} items: {}",
            self.partial.data.len(),
            self.source
        )
    }
}

impl<T: std::fmt::Debug> std::error::Error for PartialListError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl<T> PartialListError<T> {
    /// Discard the partial result and keep the cause
    #[must_use]
    pub fn into_source(self) -> ApiError {
        self.source
    }
}

impl<T> From<PartialListError<T>> for ApiError {
    fn from(err: PartialListError<T>) -> Self {
        err.source
    }
}
