//! Wait primitives for asynchronous state transitions.
//!
//! Two flavours:
//! - polling ([`poll`], [`poll_fetch`], [`poll_resource`]): re-fetch, test a
//!   predicate, sleep, until the predicate holds or the deadline passes;
//! - watching ([`watch_wait`], [`watch_resource`]): consume a server event
//!   stream until a handler is satisfied. An `ERROR` event is always fatal.
//!
//! A fixed-interval poll performs at most `ceil(timeout / interval)` fetches.

use crate::error::ApiError;
use crate::models::{HasResource, TRANSITIONING_NO, WatchEvent, WatchOptions};
use crate::ops::Ops;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Default interval between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Default deadline of a poll
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_mins(2);
/// Default deadline of [`wait_transitioning`]
pub const DEFAULT_TRANSITIONING_TIMEOUT: Duration = Duration::from_secs(45);
/// Slack added on top of a watch's server-side timeout before the client gives up
pub const WATCH_GUARD_SLACK: Duration = Duration::from_secs(5);

/// Capped exponential growth of the poll interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub factor: u32,
}

impl Backoff {
    /// Schedule used while an entity is transitioning: 10ms doubling up to 2s
    pub const TRANSITIONING: Self = Self {
        initial: Duration::from_millis(10),
        max: Duration::from_secs(2),
        factor: 2,
    };

    fn grow(&self, current: Duration) -> Duration {
        current.saturating_mul(self.factor).min(self.max)
    }
}

/// Interval, deadline and optional backoff of a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
    /// When set, `interval` is ignored and sleeps grow per [`Backoff`]
    pub backoff: Option<Backoff>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
            backoff: None,
        }
    }
}

impl PollConfig {
    /// Fixed-interval poll
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            backoff: None,
        }
    }

    /// Backoff-driven poll bounded by `timeout`
    #[must_use]
    pub fn with_backoff(timeout: Duration, backoff: Backoff) -> Self {
        Self {
            interval: backoff.initial,
            timeout,
            backoff: Some(backoff),
        }
    }

    /// Fetch budget of a fixed-interval poll: `ceil(timeout / interval)`, at least 1
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.as_nanos().max(1);
        let attempts = self.timeout.as_nanos().div_ceil(interval);
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    }
}

/// What a poll does when fetching the target fails.
///
/// Each call site picks one explicitly; nothing is retried silently by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchErrorPolicy {
    /// Abort the wait with the fetch error
    #[default]
    Propagate,
    /// Keep polling while the target does not exist yet (404)
    RetryNotFound,
    /// Keep polling through every fetch error
    RetryAll,
}

impl FetchErrorPolicy {
    #[must_use]
    pub fn should_retry(self, err: &ApiError) -> bool {
        match self {
            Self::Propagate => false,
            Self::RetryNotFound => err.is_not_found(),
            Self::RetryAll => true,
        }
    }
}

struct Schedule {
    config: PollConfig,
    started: Instant,
    attempts: u32,
    delay: Duration,
}

impl Schedule {
    fn new(config: PollConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            attempts: 0,
            delay: config.backoff.map_or(config.interval, |b| b.initial),
        }
    }

    /// Account for one finished attempt and sleep until the next one.
    /// Returns `false` once the budget is exhausted.
    async fn next_tick(&mut self) -> bool {
        self.attempts += 1;

        if let Some(backoff) = self.config.backoff {
            let elapsed = self.started.elapsed();
            let Some(remaining) = self
                .config
                .timeout
                .checked_sub(elapsed)
                .filter(|r| !r.is_zero())
            else {
                return false;
            };
            tokio::time::sleep(self.delay.min(remaining)).await;
            self.delay = backoff.grow(self.delay);
        } else {
            if self.attempts >= self.config.max_attempts() {
                return false;
            }
            tokio::time::sleep(self.config.interval).await;
        }

        self.started.elapsed() <= self.config.timeout
    }

    fn timeout_error(&self, what: &str) -> ApiError {
        ApiError::Timeout {
            what: what.to_owned(),
            waited: self.started.elapsed(),
            attempts: self.attempts,
        }
    }
}

/// Poll `condition` until it reports done.
///
/// # Errors
///
/// [`ApiError::Timeout`] when the budget runs out, or the condition's own
/// error, which is fatal.
pub async fn poll<F, Fut>(config: PollConfig, what: &str, mut condition: F) -> Result<(), ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, ApiError>>,
{
    let mut schedule = Schedule::new(config);
    loop {
        if condition().await? {
            tracing::info!(what, attempts = schedule.attempts + 1, "wait condition met");
            return Ok(());
        }
        tracing::debug!(what, attempt = schedule.attempts + 1, "wait condition not met yet");
        if !schedule.next_tick().await {
            return Err(schedule.timeout_error(what));
        }
    }
}

/// Repeatedly `fetch` a state and test it with `predicate`.
///
/// Fetch errors are handled per `policy`; a predicate error is always fatal.
/// Returns the first state satisfying the predicate.
///
/// # Errors
///
/// [`ApiError::Timeout`], a non-retried fetch error, or the predicate's error.
pub async fn poll_fetch<R, F, Fut, P>(
    config: PollConfig,
    policy: FetchErrorPolicy,
    what: &str,
    mut fetch: F,
    mut predicate: P,
) -> Result<R, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, ApiError>>,
    P: FnMut(&R) -> Result<bool, ApiError>,
{
    let mut schedule = Schedule::new(config);
    loop {
        match fetch().await {
            Ok(state) => {
                if predicate(&state)? {
                    tracing::info!(what, attempts = schedule.attempts + 1, "wait condition met");
                    return Ok(state);
                }
                tracing::debug!(
                    what,
                    attempt = schedule.attempts + 1,
                    "wait condition not met yet"
                );
            }
            Err(err) if policy.should_retry(&err) => {
                tracing::debug!(
                    what,
                    attempt = schedule.attempts + 1,
                    error = %err,
                    "fetch failed, polling again"
                );
            }
            Err(err) => return Err(err),
        }

        if !schedule.next_tick().await {
            return Err(schedule.timeout_error(what));
        }
    }
}

/// Poll one entity by identity until `predicate` holds.
///
/// # Errors
///
/// Same as [`poll_fetch`].
pub async fn poll_resource<O, R, P>(
    ops: &O,
    type_name: &str,
    id: &str,
    config: PollConfig,
    policy: FetchErrorPolicy,
    predicate: P,
) -> Result<R, ApiError>
where
    O: Ops + ?Sized,
    R: DeserializeOwned + Send,
    P: FnMut(&R) -> Result<bool, ApiError>,
{
    let what = format!("{type_name}/{id}");
    poll_fetch(config, policy, &what, || ops.by_id::<R>(type_name, id), predicate).await
}

/// Consume `events` until `handler` reports done.
///
/// An `ERROR` event ends the wait with [`ApiError::WatchStream`] before the
/// handler sees it. A stream that closes, or stays silent past `guard`,
/// without a terminal event ends it with [`ApiError::Timeout`].
///
/// # Errors
///
/// As described above, plus stream and handler errors.
pub async fn watch_wait<S, T, H>(events: S, guard: Duration, mut handler: H) -> Result<(), ApiError>
where
    S: Stream<Item = Result<WatchEvent<T>, ApiError>>,
    H: FnMut(&WatchEvent<T>) -> Result<bool, ApiError>,
{
    let mut events = std::pin::pin!(events);
    let started = Instant::now();
    let deadline = started + guard;
    let mut seen = 0u32;

    loop {
        let Ok(next) = tokio::time::timeout_at(deadline, events.next()).await else {
            return Err(ApiError::Timeout {
                what: "watch event".to_owned(),
                waited: started.elapsed(),
                attempts: seen,
            });
        };

        match next {
            None => {
                tracing::debug!(events = seen, "watch stream closed without a terminal event");
                return Err(ApiError::Timeout {
                    what: "terminal watch event".to_owned(),
                    waited: started.elapsed(),
                    attempts: seen,
                });
            }
            Some(Err(err)) => return Err(err),
            Some(Ok(WatchEvent::Error(status))) => return Err(status.into_error()),
            Some(Ok(event)) => {
                seen += 1;
                if handler(&event)? {
                    tracing::info!(events = seen, "watch condition met");
                    return Ok(());
                }
            }
        }
    }
}

/// Watch one entity by identity until `handler` reports done.
///
/// The server closes the stream after `timeout_seconds`; the client stops
/// waiting [`WATCH_GUARD_SLACK`] later regardless.
///
/// # Errors
///
/// Subscription errors and everything [`watch_wait`] reports.
pub async fn watch_resource<O, R, H>(
    ops: &O,
    type_name: &str,
    id: &str,
    timeout_seconds: u64,
    handler: H,
) -> Result<(), ApiError>
where
    O: Ops + ?Sized,
    R: DeserializeOwned + Send + 'static,
    H: FnMut(&WatchEvent<R>) -> Result<bool, ApiError>,
{
    let options = WatchOptions::for_id(id).timeout_seconds(timeout_seconds);
    let events = ops.watch::<R>(type_name, &options).await?;
    watch_wait(
        events,
        Duration::from_secs(timeout_seconds) + WATCH_GUARD_SLACK,
        handler,
    )
    .await
}

/// Reload `current` with growing pauses until it stops transitioning.
///
/// # Errors
///
/// [`ApiError::Timeout`] or any reload error.
pub async fn wait_transitioning<O, R>(ops: &O, current: R, timeout: Duration) -> Result<R, ApiError>
where
    O: Ops + ?Sized,
    R: DeserializeOwned + HasResource + Send + Sync,
{
    if !current.resource().is_transitioning() {
        return Ok(current);
    }

    let what = current.resource().label();
    poll_fetch(
        PollConfig::with_backoff(timeout, Backoff::TRANSITIONING),
        FetchErrorPolicy::Propagate,
        &what,
        || ops.reload(&current),
        |r: &R| Ok(!r.resource().is_transitioning()),
    )
    .await
}

/// [`wait_transitioning`], then require the entity to have settled successfully.
///
/// An entity that does not report `transitioning` at all counts as settled.
///
/// # Errors
///
/// [`ApiError::Condition`] carrying the transitioning message when the entity
/// settled into an error, plus everything [`wait_transitioning`] reports.
pub async fn wait_success<O, R>(ops: &O, current: R, timeout: Duration) -> Result<R, ApiError>
where
    O: Ops + ?Sized,
    R: DeserializeOwned + HasResource + Send + Sync,
{
    let settled = wait_transitioning(ops, current, timeout).await?;
    let resource = settled.resource();
    match resource.transitioning.as_deref() {
        None | Some(TRANSITIONING_NO) => Ok(settled),
        Some(other) => Err(ApiError::Condition(format!(
            "{} settled with transitioning={other}: {}",
            resource.label(),
            resource
                .transitioning_message
                .as_deref()
                .unwrap_or("no message")
        ))),
    }
}
