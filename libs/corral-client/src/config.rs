//! Test-run configuration.
//!
//! Layers, later ones winning:
//! 1. built-in defaults;
//! 2. the YAML file named by `CORRAL_TEST_CONFIG` (or an explicit path);
//! 3. `CORRAL_*` environment variables (`CORRAL_HOST`, `CORRAL_POLL_TIMEOUT`, ...).
//!
//! Everything lives under the `corral` key of the merged document:
//!
//! ```yaml
//! corral:
//!   host: rancher.example.com
//!   admin_token: token-abc12:s3cr3t
//!   insecure: true
//!   poll_timeout: 15m
//! ```

use crate::secret::SecretString;
use corral_http::{HttpClientConfig, TlsRootConfig, TransportSecurity};
use corral_sdk::ApiError;
use corral_sdk::models::DEFAULT_WATCH_TIMEOUT_SECONDS;
use corral_sdk::wait::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, PollConfig};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Environment variable naming the YAML configuration file
pub const CONFIG_FILE_ENV: &str = "CORRAL_TEST_CONFIG";
/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "CORRAL_";
/// Key of the configuration section
pub const CONFIG_KEY: &str = "corral";
/// Path of the management API below the host
pub const API_PATH: &str = "v3";
/// Attempts for PUT and action calls answered with 409 Conflict
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorralConfig {
    /// Host name or URL of the control plane (`rancher.example.com`,
    /// `https://10.0.0.5:8443`)
    pub host: String,
    pub admin_token: Option<SecretString>,
    pub admin_user: Option<String>,
    pub admin_password: Option<SecretString>,
    /// Skip server certificate verification
    pub insecure: bool,
    /// Permit `http://` hosts
    pub allow_http: bool,
    /// Whether [`Session::cleanup`](crate::Session::cleanup) deletes anything
    pub cleanup: bool,
    #[serde(deserialize_with = "de_duration")]
    pub request_timeout: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub poll_interval: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub poll_timeout: Duration,
    pub watch_timeout_seconds: u64,
    pub conflict_retries: u32,
    pub user_agent: Option<String>,
}

impl Default for CorralConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            admin_token: None,
            admin_user: None,
            admin_password: None,
            insecure: false,
            allow_http: false,
            cleanup: true,
            request_timeout: Duration::from_secs(30),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            watch_timeout_seconds: DEFAULT_WATCH_TIMEOUT_SECONDS,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            user_agent: None,
        }
    }
}

/// Accepts humantime strings (`"500ms"`, `"2m"`) or a number of seconds.
fn de_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(text) => humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom),
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
    }
}

impl CorralConfig {
    /// Defaults pointed at `host`
    #[must_use]
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Load from the file named by `CORRAL_TEST_CONFIG` (if set) and the environment.
    ///
    /// # Errors
    ///
    /// [`ApiError::Config`] when a layer cannot be read or fails validation.
    pub fn load() -> Result<Self, ApiError> {
        let file = std::env::var_os(CONFIG_FILE_ENV);
        Self::load_from(file.as_deref().map(Path::new))
    }

    /// Load from an explicit YAML file (if any) and the environment.
    ///
    /// # Errors
    ///
    /// [`ApiError::Config`] when a layer cannot be read or fails validation.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ApiError> {
        let mut figment =
            Figment::new().merge(Serialized::default(CONFIG_KEY, serde_json::Map::new()));

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ApiError::Config(format!(
                    "configuration file {} does not exist",
                    path.display()
                )));
            }
            tracing::debug!(path = %path.display(), "loading configuration file");
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(
            Env::prefixed(ENV_PREFIX)
                .ignore(&["test_config"])
                .split("__")
                .map(|key| format!("{CONFIG_KEY}.{key}").into()),
        );

        Self::from_figment(&figment)
    }

    /// Extract and validate the `corral` section of `figment`.
    ///
    /// # Errors
    ///
    /// [`ApiError::Config`] on extraction or validation failure.
    pub fn from_figment(figment: &Figment) -> Result<Self, ApiError> {
        let config: Self = figment
            .extract_inner(CONFIG_KEY)
            .map_err(|e| ApiError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// [`ApiError::Config`] for an empty or unusable host, a zero poll
    /// interval, or an `http://` host without `allow_http`.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.host.trim().is_empty() {
            return Err(ApiError::Config("host must not be empty".to_owned()));
        }
        if self.poll_interval.is_zero() {
            return Err(ApiError::Config(
                "poll_interval must be greater than zero".to_owned(),
            ));
        }
        let root = self.root_url()?;
        if root.scheme() == "http" && !self.allow_http {
            return Err(ApiError::Config(format!(
                "host {root} uses plain HTTP; set allow_http to permit it"
            )));
        }
        Ok(())
    }

    /// Server root, e.g. `https://rancher.example.com/`
    ///
    /// # Errors
    ///
    /// [`ApiError::Config`] when the host does not form a valid URL.
    pub fn root_url(&self) -> Result<Url, ApiError> {
        let host = self.host.trim().trim_end_matches('/');
        let raw = if host.contains("://") {
            format!("{host}/")
        } else {
            format!("https://{host}/")
        };
        let url =
            Url::parse(&raw).map_err(|e| ApiError::Config(format!("invalid host '{host}': {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ApiError::Config(format!(
                "unsupported scheme '{other}' in host '{host}'"
            ))),
        }
    }

    /// Management API base, e.g. `https://rancher.example.com/v3`
    ///
    /// # Errors
    ///
    /// Same as [`CorralConfig::root_url`].
    pub fn api_base(&self) -> Result<Url, ApiError> {
        self.root_url()?
            .join(API_PATH)
            .map_err(|e| ApiError::Config(e.to_string()))
    }

    /// Fixed-interval poll settings
    #[must_use]
    pub fn poll_config(&self) -> PollConfig {
        PollConfig::new(self.poll_interval, self.poll_timeout)
    }

    /// Transport settings derived from this configuration
    #[must_use]
    pub fn http_config(&self) -> HttpClientConfig {
        let mut http = HttpClientConfig {
            request_timeout: self.request_timeout,
            ..HttpClientConfig::default()
        };
        if self.insecure {
            http.tls_roots = TlsRootConfig::InsecureSkipVerify;
        }
        if self.allow_http {
            http.transport = TransportSecurity::AllowInsecureHttp;
        }
        if let Some(user_agent) = &self.user_agent {
            http.user_agent.clone_from(user_agent);
        }
        http
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CorralConfig::default();
        assert!(config.cleanup);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.poll_timeout, Duration::from_mins(2));
        assert_eq!(config.conflict_retries, 3);
        assert_eq!(config.watch_timeout_seconds, 300);
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let err = CorralConfig::default().validate().unwrap_err();
        assert!(matches!(err, ApiError::Config(ref m) if m.contains("host")));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = CorralConfig {
            poll_interval: Duration::ZERO,
            ..CorralConfig::for_host("rancher.local")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_plain_http_needs_opt_in() {
        let config = CorralConfig::for_host("http://127.0.0.1:8080");
        assert!(config.validate().is_err());

        let config = CorralConfig {
            allow_http: true,
            ..config
        };
        config.validate().unwrap();
        assert_eq!(
            config.http_config().transport,
            TransportSecurity::AllowInsecureHttp
        );
    }

    #[test]
    fn test_api_base_from_bare_host() {
        let config = CorralConfig::for_host("rancher.example.com/");
        assert_eq!(
            config.api_base().unwrap().as_str(),
            "https://rancher.example.com/v3"
        );
    }

    #[test]
    fn test_durations_from_figment() {
        let figment = Figment::new().merge(Serialized::defaults(serde_json::json!({
            "corral": {
                "host": "rancher.local",
                "poll_interval": "250ms",
                "poll_timeout": 90,
                "insecure": true,
            }
        })));
        let config = CorralConfig::from_figment(&figment).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.poll_timeout, Duration::from_secs(90));
        assert_eq!(
            config.http_config().tls_roots,
            TlsRootConfig::InsecureSkipVerify
        );
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let figment = Figment::new().merge(Serialized::defaults(serde_json::json!({
            "corral": {"host": "rancher.local", "pol_interval": "1s"}
        })));
        assert!(CorralConfig::from_figment(&figment).is_err());
    }
}
