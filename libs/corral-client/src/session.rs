//! Cleanup bookkeeping for one test run.

use corral_sdk::ApiError;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ApiError>> + Send>;

struct CleanupEntry {
    label: String,
    run: CleanupFn,
}

/// One failed cleanup step
#[derive(Debug)]
pub struct CleanupFailure {
    pub label: String,
    pub error: ApiError,
}

/// Every cleanup step that failed, in the order they ran
#[derive(Debug, Error)]
#[error("{} cleanup step(s) failed", .failures.len())]
pub struct CleanupError {
    pub failures: Vec<CleanupFailure>,
}

/// A stack of cleanup callbacks shared by every client derived from one login.
///
/// [`Session::cleanup`] runs the most recently registered callback first and
/// keeps going past failures.
#[derive(Clone)]
pub struct Session {
    stack: Arc<Mutex<Vec<CleanupEntry>>>,
    enabled: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("pending", &self.pending())
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stack: Arc::new(Mutex::new(Vec::new())),
            enabled: true,
        }
    }

    /// When disabled, [`Session::cleanup`] leaves everything in place.
    #[must_use]
    pub fn with_cleanup_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Push a callback onto the stack.
    pub fn register<F, Fut>(&self, label: impl Into<String>, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let label = label.into();
        tracing::debug!(label = %label, "registered cleanup");
        self.stack.lock().push(CleanupEntry {
            label,
            run: Box::new(move || Box::pin(callback())),
        });
    }

    /// Take the newest callback; the lock is released before it runs.
    fn pop(&self) -> Option<CleanupEntry> {
        self.stack.lock().pop()
    }

    /// Number of callbacks not yet run
    #[must_use]
    pub fn pending(&self) -> usize {
        self.stack.lock().len()
    }

    /// Run every registered callback, newest first.
    ///
    /// A callback failing with [`ApiError::NotFound`] counts as done: the
    /// entity is already gone.
    ///
    /// # Errors
    ///
    /// [`CleanupError`] listing every other failure, after all callbacks ran.
    pub async fn cleanup(&self) -> Result<(), CleanupError> {
        if !self.enabled {
            tracing::info!(
                pending = self.pending(),
                "cleanup disabled, leaving resources in place"
            );
            return Ok(());
        }

        let mut failures = Vec::new();
        while let Some(entry) = self.pop() {
            match (entry.run)().await {
                Ok(()) => tracing::debug!(label = %entry.label, "cleaned up"),
                Err(err) if err.is_not_found() => {
                    tracing::debug!(label = %entry.label, "already gone");
                }
                Err(error) => {
                    tracing::warn!(label = %entry.label, error = %error, "cleanup step failed");
                    failures.push(CleanupFailure {
                        label: entry.label,
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CleanupError { failures })
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use corral_sdk::RequestError;

    fn status(status: u16) -> ApiError {
        ApiError::from_status(RequestError {
            status,
            status_text: String::new(),
            url: String::new(),
            code: None,
            message: None,
        })
    }

    #[tokio::test]
    async fn test_cleanup_runs_newest_first() {
        let session = Session::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["cluster", "project", "user"] {
            let order = Arc::clone(&order);
            session.register(label, move || async move {
                order.lock().push(label);
                Ok(())
            });
        }

        session.cleanup().await.unwrap();
        assert_eq!(*order.lock(), ["user", "project", "cluster"]);
        assert_eq!(session.pending(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_accumulates_failures() {
        let session = Session::new();
        let ran = Arc::new(Mutex::new(0));
        session.register("first", {
            let ran = Arc::clone(&ran);
            move || async move {
                *ran.lock() += 1;
                Err(status(500))
            }
        });
        session.register("gone", || async { Err(status(404)) });
        session.register("last", {
            let ran = Arc::clone(&ran);
            move || async move {
                *ran.lock() += 1;
                Err(status(403))
            }
        });

        let err = session.cleanup().await.unwrap_err();
        assert_eq!(*ran.lock(), 2);
        let labels: Vec<&str> = err.failures.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, ["last", "first"]);
    }

    #[tokio::test]
    async fn test_disabled_cleanup_keeps_stack() {
        let session = Session::new().with_cleanup_enabled(false);
        session.register("cluster", || async { Err(status(500)) });
        session.cleanup().await.unwrap();
        assert_eq!(session.pending(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_stack() {
        let session = Session::new();
        let derived = session.clone();
        derived.register("token", || async { Ok(()) });
        assert_eq!(session.pending(), 1);
    }
}
