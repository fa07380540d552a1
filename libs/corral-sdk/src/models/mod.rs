//! Wire model: the resource and collection envelopes, action descriptors and
//! watch events, plus the cluster entity used by provisioning waits.

mod action;
pub mod cluster;
mod collection;
mod resource;
mod watch;

pub use action::{ActionDescriptor, ActionScope};
pub use cluster::{Cluster, ClusterCondition, ClusterState};
pub use collection::{Collection, ListOpts, Pagination};
pub use resource::{
    ApiType, GenericObject, HasResource, Resource, TRANSITIONING_ERROR, TRANSITIONING_NO,
    TRANSITIONING_YES,
};
pub use watch::{
    DEFAULT_WATCH_TIMEOUT_SECONDS, EventType, RawWatchEvent, WatchEvent, WatchOptions,
    WatchStatus,
};
