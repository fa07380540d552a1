#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Corral client
//!
//! The HTTP-backed side of corral:
//! - [`Client`]: an authenticated, immutable identity with re-login,
//!   impersonation and admin escalation, implementing
//!   [`RawOps`](corral_sdk::RawOps) and therefore every typed
//!   [`Ops`](corral_sdk::Ops) operation;
//! - [`HttpOps`]: the wire mapping of those operations, including schema
//!   discovery, conflict retries and NDJSON watch streams;
//! - [`Session`]: the LIFO cleanup stack shared by derived clients;
//! - [`CorralConfig`]: figment-loaded settings;
//! - [`TypedClient`]: per-type operations.
//!
//! # Example
//!
//! ```rust,ignore
//! use corral_client::{Client, CorralConfig};
//! use corral_sdk::models::{Cluster, cluster::cluster_active};
//! use corral_sdk::wait::FetchErrorPolicy;
//!
//! let client = Client::from_config(CorralConfig::load()?).await?;
//! let cluster: Cluster = client.create_tracked("cluster", &Cluster::named("e2e")).await?;
//! let ready: Cluster = client
//!     .wait_resource(
//!         "cluster",
//!         &cluster.resource.id,
//!         FetchErrorPolicy::RetryNotFound,
//!         cluster_active,
//!     )
//!     .await?;
//! client.session().cleanup().await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod http_ops;
pub mod logging;
pub mod schema;
pub mod secret;
pub mod session;
pub mod typed;

pub use auth::{Credentials, Token};
pub use client::Client;
pub use config::CorralConfig;
pub use http_ops::HttpOps;
pub use schema::{Schema, SchemaRegistry};
pub use secret::SecretString;
pub use session::{CleanupError, CleanupFailure, Session};
pub use typed::TypedClient;
