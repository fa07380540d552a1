use std::time::Duration;

/// `User-Agent` sent when none is configured
pub const DEFAULT_USER_AGENT: &str = concat!("corral/", env!("CARGO_PKG_VERSION"));

/// Which URL schemes a client will dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    /// `https://` only
    #[default]
    TlsOnly,
    /// `http://` as well, for mock servers and plain-HTTP test control planes
    AllowInsecureHttp,
}

/// Trust anchors used to verify the control plane's certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsRootConfig {
    /// Bundled Mozilla roots
    #[default]
    WebPki,
    /// The operating system store
    Native,
    /// No verification at all. Freshly provisioned control planes usually
    /// serve self-signed certificates.
    InsecureSkipVerify,
}

/// Transport settings of one [`HttpClient`](crate::HttpClient).
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Deadline for the response head. Bodies streamed afterwards (watches)
    /// are not covered.
    pub request_timeout: Duration,
    /// Upper bound for buffered body reads, in bytes
    pub max_body_size: usize,
    pub user_agent: String,
    pub transport: TransportSecurity,
    pub tls_roots: TlsRootConfig,
    /// Requests that may queue for the dispatch worker before
    /// [`HttpError::Overloaded`](crate::HttpError::Overloaded)
    pub buffer_capacity: usize,
    /// `None` keeps idle connections forever
    pub pool_idle_timeout: Option<Duration>,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 16 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::WebPki,
            buffer_capacity: 512,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 16,
        }
    }
}

impl HttpClientConfig {
    /// Small limits for short-lived tools
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            buffer_capacity: 64,
            pool_idle_timeout: Some(Duration::from_secs(30)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }

    /// [`minimal`](Self::minimal) plus plain HTTP, for local mock servers
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            transport: TransportSecurity::AllowInsecureHttp,
            ..Self::minimal()
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_tls_only() {
        let config = HttpClientConfig::default();
        assert_eq!(config.transport, TransportSecurity::TlsOnly);
        assert_eq!(config.tls_roots, TlsRootConfig::WebPki);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("corral/"));
    }

    #[test]
    fn test_testing_preset() {
        let config = HttpClientConfig::for_testing();
        assert_eq!(config.transport, TransportSecurity::AllowInsecureHttp);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.max_body_size, 1024 * 1024);
    }
}
