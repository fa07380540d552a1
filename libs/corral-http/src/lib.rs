#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP transport for corral.
//!
//! A pooled hyper client behind a small tower stack: a bounded dispatch
//! queue, a response-head timeout, a default `User-Agent` and transparent
//! decompression. TLS is rustls with `WebPKI`, native or verification-free
//! roots; control planes under test usually present self-signed certificates.
//!
//! `send()` succeeds for every status. [`HttpResponse::checked_bytes`],
//! [`HttpResponse::json`] and [`HttpResponse::text`] turn non-2xx responses
//! into [`HttpError::HttpStatus`]; [`HttpResponse::into_body`] streams a
//! body without either check, for watches.
//!
//! ```ignore
//! let http = HttpClient::builder()
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//! let cluster: serde_json::Value = http
//!     .get("https://rancher.example.com/v3/clusters/c-abc12")
//!     .bearer_auth(token)
//!     .send()
//!     .await?
//!     .json()
//!     .await?;
//! ```

mod builder;
mod client;
mod config;
mod error;
mod request;
mod response;
mod tls;

pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use config::{DEFAULT_USER_AGENT, HttpClientConfig, TlsRootConfig, TransportSecurity};
pub use error::{HttpError, InvalidUriKind};
pub use request::RequestBuilder;
pub use response::{ERROR_BODY_PREVIEW_LIMIT, HttpResponse, ResponseBody};
