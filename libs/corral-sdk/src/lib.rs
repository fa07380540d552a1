#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Corral SDK
//!
//! Transport-independent building blocks of the Corral client:
//! - [`models`]: the resource/collection envelopes, watch events and the
//!   cluster entity;
//! - [`ops`]: [`RawOps`], the seam a transport implements, and [`Ops`], the
//!   typed operations every `RawOps` gets for free;
//! - [`pager`]: lazy cursor pagination;
//! - [`wait`]: polling and watch-based waits with bounded budgets;
//! - [`error`]: the error taxonomy shared by all of the above.

pub mod error;
pub mod models;
pub mod ops;
pub mod pager;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ApiError, PartialListError, RequestError};
pub use models::{
    ActionDescriptor, ActionScope, ApiType, Cluster, Collection, GenericObject, HasResource,
    ListOpts, Resource, WatchEvent, WatchOptions,
};
pub use ops::{NO_INPUT, Ops, RawOps};
pub use pager::CollectionPager;
pub use wait::{Backoff, FetchErrorPolicy, PollConfig};
