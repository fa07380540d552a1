#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Cluster provisioning waits driven through a scripted in-memory backend.

use async_trait::async_trait;
use corral_sdk::models::RawWatchEvent;
use corral_sdk::models::cluster::{cluster_active, watch_cluster_ready, watch_deleted};
use corral_sdk::ops::RawEventStream;
use corral_sdk::wait::{self, FetchErrorPolicy, PollConfig};
use corral_sdk::{
    ActionDescriptor, ApiError, Cluster, ListOpts, Ops, RawOps, RequestError, Resource,
    WatchOptions,
};
use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::time::Duration;

/// Answers `by_id` from a script (the last entry sticks) and `watch` from a
/// fixed list of events.
#[derive(Default)]
struct ScriptedCluster {
    states: Mutex<VecDeque<Result<Value, u16>>>,
    events: Mutex<Vec<Value>>,
    fetches: Mutex<u32>,
}

impl ScriptedCluster {
    fn with_states(states: Vec<Result<Value, u16>>) -> Self {
        Self {
            states: Mutex::new(states.into()),
            ..Self::default()
        }
    }

    fn with_events(events: Vec<Value>) -> Self {
        Self {
            events: Mutex::new(events),
            ..Self::default()
        }
    }

    fn fetches(&self) -> u32 {
        *self.fetches.lock()
    }
}

fn cluster(state: &str, ready: &str) -> Value {
    json!({
        "id": "c-abc12",
        "type": "cluster",
        "name": "e2e",
        "state": state,
        "transitioningMessage": format!("cluster is {state}"),
        "conditions": [{"type": "Ready", "status": ready}],
        "links": {"self": "https://rancher.local/v3/clusters/c-abc12"},
    })
}

fn status_error(status: u16) -> ApiError {
    ApiError::from_status(RequestError {
        status,
        status_text: String::new(),
        url: "https://rancher.local/v3/clusters/c-abc12".to_owned(),
        code: None,
        message: None,
    })
}

#[async_trait]
impl RawOps for ScriptedCluster {
    async fn raw_create(&self, _type_name: &str, body: Value) -> Result<Value, ApiError> {
        Ok(body)
    }

    async fn raw_by_id(&self, _type_name: &str, _id: &str) -> Result<Value, ApiError> {
        *self.fetches.lock() += 1;
        let mut states = self.states.lock();
        let next = if states.len() > 1 {
            states.pop_front()
        } else {
            states.front().cloned()
        };
        match next {
            Some(Ok(value)) => Ok(value),
            Some(Err(status)) => Err(status_error(status)),
            None => Err(status_error(404)),
        }
    }

    async fn raw_update(
        &self,
        _type_name: &str,
        _target: &Resource,
        body: Value,
    ) -> Result<Value, ApiError> {
        Ok(body)
    }

    async fn raw_delete(&self, _target: &Resource) -> Result<(), ApiError> {
        Ok(())
    }

    async fn raw_list(&self, _type_name: &str, _opts: &ListOpts) -> Result<Value, ApiError> {
        Ok(json!({"data": []}))
    }

    async fn raw_fetch(&self, _url: &str) -> Result<Value, ApiError> {
        self.raw_by_id("cluster", "c-abc12").await
    }

    async fn raw_action(
        &self,
        _action: &ActionDescriptor,
        _input: Option<Value>,
    ) -> Result<Option<Value>, ApiError> {
        Ok(None)
    }

    async fn raw_watch(
        &self,
        _type_name: &str,
        _opts: &WatchOptions,
    ) -> Result<RawEventStream, ApiError> {
        let events: Vec<Result<RawWatchEvent, ApiError>> = self
            .events
            .lock()
            .drain(..)
            .map(|event| Ok(serde_json::from_value(event).unwrap()))
            .collect();
        Ok(stream::iter(events).boxed())
    }
}

#[tokio::test(start_paused = true)]
async fn test_provisioning_wait_reaches_active() {
    let backend = ScriptedCluster::with_states(vec![
        Err(404),
        Ok(cluster("provisioning", "False")),
        Ok(cluster("updating", "False")),
        Ok(cluster("active", "True")),
    ]);

    let active: Cluster = wait::poll_resource(
        &backend,
        "cluster",
        "c-abc12",
        PollConfig::new(Duration::from_secs(1), Duration::from_secs(30)),
        FetchErrorPolicy::RetryNotFound,
        cluster_active,
    )
    .await
    .unwrap();

    assert_eq!(active.name, "e2e");
    assert_eq!(backend.fetches(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_provisioning_wait_fails_fast_on_error_state() {
    let backend = ScriptedCluster::with_states(vec![
        Ok(cluster("provisioning", "False")),
        Ok(cluster("error", "False")),
    ]);

    let err = wait::poll_resource::<_, Cluster, _>(
        &backend,
        "cluster",
        "c-abc12",
        PollConfig::new(Duration::from_secs(1), Duration::from_secs(30)),
        FetchErrorPolicy::Propagate,
        cluster_active,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ApiError::Condition(ref m) if m.contains("cluster is error")));
    assert_eq!(backend.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_provisioning_wait_times_out_on_stuck_cluster() {
    let backend = ScriptedCluster::with_states(vec![Ok(cluster("provisioning", "False"))]);

    let err = wait::poll_resource::<_, Cluster, _>(
        &backend,
        "cluster",
        "c-abc12",
        PollConfig::new(Duration::from_secs(2), Duration::from_secs(9)),
        FetchErrorPolicy::Propagate,
        cluster_active,
    )
    .await
    .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(backend.fetches(), 5);
}

#[tokio::test]
async fn test_watch_until_ready() {
    let backend = ScriptedCluster::with_events(vec![
        json!({"type": "ADDED", "object": cluster("provisioning", "False")}),
        json!({"type": "MODIFIED", "object": cluster("active", "True")}),
        json!({"type": "MODIFIED", "object": cluster("active", "True")}),
    ]);

    let mut seen = 0;
    wait::watch_resource(&backend, "cluster", "c-abc12", 60, |event| {
        seen += 1;
        watch_cluster_ready(event)
    })
    .await
    .unwrap();
    assert_eq!(seen, 2);
}

#[tokio::test]
async fn test_watch_ready_rejects_deletion() {
    let backend = ScriptedCluster::with_events(vec![
        json!({"type": "DELETED", "object": cluster("removing", "False")}),
    ]);

    let err = wait::watch_resource(&backend, "cluster", "c-abc12", 60, watch_cluster_ready)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Condition(_)));
}

#[tokio::test]
async fn test_watch_deleted_ignores_modifications() {
    let backend = ScriptedCluster::with_events(vec![
        json!({"type": "MODIFIED", "object": cluster("removing", "False")}),
        json!({"type": "DELETED", "object": cluster("removing", "False")}),
    ]);

    wait::watch_resource(&backend, "cluster", "c-abc12", 60, watch_deleted::<Cluster>)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reload_goes_through_by_id() {
    let backend = ScriptedCluster::with_states(vec![Ok(cluster("active", "True"))]);
    let stale: Cluster = serde_json::from_value(cluster("provisioning", "False")).unwrap();

    let fresh = backend.reload(&stale).await.unwrap();
    assert_eq!(fresh.lifecycle(), corral_sdk::models::ClusterState::Active);
}
