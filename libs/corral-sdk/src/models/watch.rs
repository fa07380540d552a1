use crate::error::ApiError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-side listen timeout applied when none is configured
pub const DEFAULT_WATCH_TIMEOUT_SECONDS: u64 = 300;

/// Kind of a watch event as sent on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Added,
    Modified,
    Deleted,
    Error,
}

/// A watch event before its object is decoded into a concrete type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWatchEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub object: Value,
}

/// Failure status carried by an `ERROR` event
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WatchStatus {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl WatchStatus {
    /// Convert into the fatal error a wait reports
    #[must_use]
    pub fn into_error(self) -> ApiError {
        let message = self
            .message
            .or(self.reason)
            .unwrap_or_else(|| "watch returned an error event".to_owned());
        ApiError::WatchStream {
            code: self.code,
            message,
        }
    }
}

/// An ordered event on a watch subscription
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
    Error(WatchStatus),
}

impl<T> WatchEvent<T> {
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Added(_) => EventType::Added,
            Self::Modified(_) => EventType::Modified,
            Self::Deleted(_) => EventType::Deleted,
            Self::Error(_) => EventType::Error,
        }
    }

    /// The object carried by a non-error event
    #[must_use]
    pub fn object(&self) -> Option<&T> {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => Some(obj),
            Self::Error(_) => None,
        }
    }
}

impl<T: DeserializeOwned> TryFrom<RawWatchEvent> for WatchEvent<T> {
    type Error = ApiError;

    fn try_from(raw: RawWatchEvent) -> Result<Self, ApiError> {
        let wrap: fn(T) -> Self = match raw.event_type {
            EventType::Added => Self::Added,
            EventType::Modified => Self::Modified,
            EventType::Deleted => Self::Deleted,
            // ERROR events carry a status object, never an entity
            EventType::Error => {
                let status = serde_json::from_value(raw.object).unwrap_or_default();
                return Ok(WatchEvent::Error(status));
            }
        };

        let object =
            serde_json::from_value(raw.object).map_err(|e| ApiError::decode("watch event", e))?;
        Ok(wrap(object))
    }
}

/// Subscription parameters for a watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    /// Server-side field selector, e.g. `metadata.name=c-abc12`
    pub field_selector: Option<String>,
    /// Server closes the stream after this many seconds
    pub timeout_seconds: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            field_selector: None,
            timeout_seconds: DEFAULT_WATCH_TIMEOUT_SECONDS,
        }
    }
}

impl WatchOptions {
    /// Watch exactly one entity by identity
    #[must_use]
    pub fn for_id(id: &str) -> Self {
        Self {
            field_selector: Some(format!("metadata.name={id}")),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}
