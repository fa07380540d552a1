//! Management-plane cluster entity and its lifecycle predicates.

use super::{ApiType, HasResource, Resource, WatchEvent};
use crate::error::ApiError;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a cluster as reported in `state`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterState {
    Provisioning,
    Waiting,
    Active,
    Updating,
    Upgrading,
    Error,
    Removed,
    Other(String),
}

impl ClusterState {
    #[must_use]
    pub fn parse(state: &str) -> Self {
        match state {
            "provisioning" => Self::Provisioning,
            "waiting" | "pending" => Self::Waiting,
            "active" => Self::Active,
            "updating" => Self::Updating,
            "upgrading" => Self::Upgrading,
            "error" => Self::Error,
            "removed" | "removing" => Self::Removed,
            other => Self::Other(other.to_owned()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Updating => "updating",
            Self::Upgrading => "upgrading",
            Self::Error => "error",
            Self::Removed => "removed",
            Self::Other(other) => other,
        }
    }

    /// Whether the cluster can no longer become active on its own
    #[must_use]
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Error | Self::Removed)
    }
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    /// `"True"`, `"False"` or `"Unknown"`
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ClusterCondition {
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    #[serde(flatten)]
    pub resource: Resource,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ClusterCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
}

impl Cluster {
    /// New creation payload with the given name
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            resource: Resource {
                type_name: Self::TYPE_NAME.to_owned(),
                ..Resource::default()
            },
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> ClusterState {
        ClusterState::parse(self.resource.state.as_deref().unwrap_or_default())
    }

    #[must_use]
    pub fn condition(&self, condition_type: &str) -> Option<&ClusterCondition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

impl HasResource for Cluster {
    fn resource(&self) -> &Resource {
        &self.resource
    }
}

impl ApiType for Cluster {
    const TYPE_NAME: &'static str = "cluster";
}

/// Success predicate for provisioning waits.
///
/// `Ok(true)` once the cluster is active with every reported condition true;
/// an error or removed cluster is fatal.
///
/// # Errors
///
/// Returns [`ApiError::Condition`] when the cluster is in a terminal failure state.
pub fn cluster_active(cluster: &Cluster) -> Result<bool, ApiError> {
    let state = cluster.lifecycle();
    if state.is_terminal_failure() {
        let detail = cluster
            .resource
            .transitioning_message
            .as_deref()
            .unwrap_or("no message");
        return Err(ApiError::Condition(format!(
            "cluster {} entered state {state}: {detail}",
            cluster.resource.id
        )));
    }

    Ok(state == ClusterState::Active && cluster.conditions.iter().all(ClusterCondition::is_true))
}

/// Watch handler completing once the cluster reports ready.
///
/// Ready means a `Ready` condition that is true, or an active cluster whose
/// `Updated` condition is true.
///
/// # Errors
///
/// Returns [`ApiError::Condition`] if the cluster is deleted or fails while
/// being watched.
pub fn watch_cluster_ready(event: &WatchEvent<Cluster>) -> Result<bool, ApiError> {
    match event {
        WatchEvent::Added(cluster) | WatchEvent::Modified(cluster) => {
            if cluster.lifecycle().is_terminal_failure() {
                return cluster_active(cluster);
            }
            let ready = cluster.condition("Ready").is_some_and(ClusterCondition::is_true);
            let updated = cluster.lifecycle() == ClusterState::Active
                && cluster
                    .condition("Updated")
                    .is_some_and(ClusterCondition::is_true);
            Ok(ready || updated)
        }
        WatchEvent::Deleted(cluster) => Err(ApiError::Condition(format!(
            "cluster {} was deleted while waiting for it to become ready",
            cluster.resource.id
        ))),
        WatchEvent::Error(status) => Err(status.clone().into_error()),
    }
}

/// Watch handler completing once the watched entity is deleted.
///
/// # Errors
///
/// Returns the stream error for an `ERROR` event.
pub fn watch_deleted<T>(event: &WatchEvent<T>) -> Result<bool, ApiError> {
    match event {
        WatchEvent::Deleted(_) => Ok(true),
        WatchEvent::Error(status) => Err(status.clone().into_error()),
        WatchEvent::Added(_) | WatchEvent::Modified(_) => Ok(false),
    }
}
