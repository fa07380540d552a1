use crate::client::{HttpClient, Shared};
use crate::config::{HttpClientConfig, TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use crate::response::ResponseBody;
use crate::tls;
use bytes::Bytes;
use http::Response;
use http::header::{HeaderValue, USER_AGENT};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use std::time::Duration;
use tower::buffer::Buffer;
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;
use tower_http::set_header::SetRequestHeaderLayer;

/// Assembles an [`HttpClient`].
///
/// ```ignore
/// let http = HttpClientBuilder::with_config(HttpClientConfig::for_testing())
///     .timeout(Duration::from_secs(2))
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct HttpClientBuilder {
    config: HttpClientConfig,
}

impl HttpClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.config.max_body_size = bytes;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Permit `http://` URLs.
    ///
    /// Release builds need the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Build the client.
    ///
    /// Requests pass, outermost first, through a bounded queue, the
    /// response-head timeout, `User-Agent` defaulting and transparent
    /// decompression before reaching the pooled hyper client.
    ///
    /// # Errors
    ///
    /// [`HttpError::Tls`] for an unusable trust store,
    /// [`HttpError::InvalidHeaderValue`] for an unusable user agent.
    pub fn build(self) -> Result<HttpClient, HttpError> {
        let config = self.config;
        if config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!("plain HTTP enabled; traffic is not encrypted");
        }

        let user_agent = HeaderValue::from_str(&config.user_agent)?;
        let connector = tls::connector(config.tls_roots, config.transport)?;

        let mut pool = Client::builder(TokioExecutor::new());
        pool.pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout);
        let hyper_client = pool.build::<_, Full<Bytes>>(connector);

        let timeout = config.request_timeout;
        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(SetRequestHeaderLayer::if_not_present(USER_AGENT, user_agent))
            .layer(DecompressionLayer::new())
            .service(hyper_client)
            .map_response(|response| {
                let (parts, body) = response.into_parts();
                let body: ResponseBody = body.map_err(Into::into).boxed();
                Response::from_parts(parts, body)
            })
            .map_err(move |err: BoxError| classify(err, timeout))
            .boxed_clone();

        Ok(HttpClient {
            service: Buffer::new(service, config.buffer_capacity.max(1)),
            shared: Arc::new(Shared {
                max_body_size: config.max_body_size,
                transport: config.transport,
            }),
        })
    }
}

fn classify(err: BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }
    match err.downcast::<HttpError>() {
        Ok(err) => *err,
        Err(other) => HttpError::Transport(other),
    }
}
