//! Authenticated client.
//!
//! A [`Client`] is an immutable identity: [`Client::re_login`],
//! [`Client::as_user`] and [`Client::as_admin`] return new clients and leave
//! the receiver untouched. Rebind explicitly after long waits:
//!
//! ```rust,ignore
//! let client = Client::from_config(CorralConfig::load()?).await?;
//! let cluster: Cluster = client.typed::<Cluster>().create(&Cluster::named("e2e")).await?;
//! let client = client.re_login().await?;
//! ```

use crate::auth::{self, Credentials};
use crate::config::CorralConfig;
use crate::http_ops::HttpOps;
use crate::secret::SecretString;
use crate::session::Session;
use crate::typed::TypedClient;
use async_trait::async_trait;
use corral_http::{HttpClient, HttpClientBuilder};
use corral_sdk::ApiError;
use corral_sdk::models::{
    ActionDescriptor, ActionScope, ApiType, HasResource, ListOpts, Resource, WatchEvent,
    WatchOptions,
};
use corral_sdk::ops::{Ops, RawEventStream, RawOps};
use corral_sdk::wait::{self, FetchErrorPolicy};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// A validated identity against one control plane.
#[derive(Clone)]
pub struct Client {
    ops: HttpOps,
    root: Url,
    config: Arc<CorralConfig>,
    credentials: Option<Credentials>,
    user_id: Option<String>,
    session: Session,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("root", &self.root.as_str())
            .field("user_id", &self.user_id)
            .field("ops", &self.ops)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Connect with a bearer token.
    ///
    /// Validates eagerly: the schema listing is fetched with the token before
    /// the client is returned.
    ///
    /// # Errors
    ///
    /// [`ApiError::Config`] for an unusable host, otherwise the request or
    /// transport error of the validation call.
    pub async fn new(token: impl Into<SecretString>, host: &str) -> Result<Self, ApiError> {
        Self::with_token(CorralConfig::for_host(host), token.into()).await
    }

    /// Connect with a bearer token and explicit settings.
    ///
    /// # Errors
    ///
    /// Same as [`Client::new`].
    pub async fn with_token(config: CorralConfig, token: SecretString) -> Result<Self, ApiError> {
        config.validate()?;
        let config = Arc::new(config);
        let http = build_http(&config)?;
        let session = Session::new().with_cleanup_enabled(config.cleanup);
        Self::connect(config, http, token, None, None, session).await
    }

    /// Log in with a local principal's credentials.
    ///
    /// # Errors
    ///
    /// Login failures, plus everything [`Client::new`] reports.
    pub async fn login(config: CorralConfig, credentials: Credentials) -> Result<Self, ApiError> {
        config.validate()?;
        let config = Arc::new(config);
        let http = build_http(&config)?;
        let root = config.root_url()?;
        let token = auth::login(&http, &root, &credentials).await?;
        let session = Session::new().with_cleanup_enabled(config.cleanup);
        Self::connect(config, http, token.token, token.user_id, Some(credentials), session).await
    }

    /// Admin client from configuration: `admin_token` if set, otherwise a
    /// login with `admin_user`/`admin_password`.
    ///
    /// # Errors
    ///
    /// [`ApiError::Config`] when neither is configured, plus login and
    /// validation errors.
    pub async fn from_config(config: CorralConfig) -> Result<Self, ApiError> {
        if let Some(token) = config.admin_token.clone() {
            return Self::with_token(config, token).await;
        }
        let credentials = admin_credentials(&config)?;
        Self::login(config, credentials).await
    }

    async fn connect(
        config: Arc<CorralConfig>,
        http: HttpClient,
        token: SecretString,
        user_id: Option<String>,
        credentials: Option<Credentials>,
        session: Session,
    ) -> Result<Self, ApiError> {
        let root = config.root_url()?;
        let ops = HttpOps::new(http, config.api_base()?, token)
            .with_conflict_retries(config.conflict_retries);
        let schemas = ops.discover().await?;
        tracing::info!(base = %ops.base(), schemas = schemas.len(), "connected");

        Ok(Self {
            ops: ops.with_schemas(Arc::new(schemas)),
            root,
            config,
            credentials,
            user_id,
            session,
        })
    }

    /// A fresh client for the same identity.
    ///
    /// Clients holding credentials log in again and carry the new token.
    /// Token-only clients re-validate their token.
    ///
    /// # Errors
    ///
    /// Login or validation failures.
    pub async fn re_login(&self) -> Result<Self, ApiError> {
        let Some(credentials) = &self.credentials else {
            self.ops.ping().await?;
            tracing::debug!("token re-validated");
            return Ok(self.clone());
        };

        let token = auth::login(self.ops.http(), &self.root, credentials).await?;
        Ok(Self {
            ops: self.ops.with_token(token.token),
            user_id: token.user_id.or_else(|| self.user_id.clone()),
            ..self.clone()
        })
    }

    /// A client authenticated as another local principal, sharing this
    /// client's transport, schemas and cleanup stack.
    ///
    /// # Errors
    ///
    /// Login failures.
    pub async fn as_user(&self, credentials: &Credentials) -> Result<Self, ApiError> {
        let token = auth::login(self.ops.http(), &self.root, credentials).await?;
        Ok(Self {
            ops: self.ops.with_token(token.token),
            user_id: token.user_id,
            credentials: Some(credentials.clone()),
            ..self.clone()
        })
    }

    /// A client for the configured admin identity.
    ///
    /// # Errors
    ///
    /// Same as [`Client::from_config`].
    pub async fn as_admin(&self) -> Result<Self, ApiError> {
        if let Some(token) = self.config.admin_token.clone() {
            let admin = Self {
                ops: self.ops.with_token(token),
                credentials: None,
                user_id: None,
                ..self.clone()
            };
            admin.ops.ping().await?;
            return Ok(admin);
        }
        let credentials = admin_credentials(&self.config)?;
        self.as_user(&credentials).await
    }

    #[must_use]
    pub fn config(&self) -> &CorralConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn token(&self) -> &SecretString {
        self.ops.token()
    }

    /// Principal the token belongs to, when the login reported it
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    #[must_use]
    pub fn ops(&self) -> &HttpOps {
        &self.ops
    }

    /// Operations for one entity type
    #[must_use]
    pub fn typed<T: ApiType>(&self) -> TypedClient<'_, T, Self> {
        TypedClient::new(self)
    }

    /// Delete `target` when the session is cleaned up.
    pub fn track<E: HasResource + ?Sized>(&self, target: &E) {
        let client = self.clone();
        let resource = target.resource().clone();
        self.session.register(resource.label(), move || async move {
            client.delete(&resource).await
        });
    }

    /// Create an entity and register its deletion with the session.
    ///
    /// # Errors
    ///
    /// Same as [`Ops::create`].
    pub async fn create_tracked<P, R>(&self, type_name: &str, payload: &P) -> Result<R, ApiError>
    where
        P: Serialize + Sync + ?Sized,
        R: DeserializeOwned + HasResource + Send,
    {
        let created: R = self.create(type_name, payload).await?;
        self.track(&created);
        Ok(created)
    }

    /// Poll an entity until `predicate` holds, logging in again before every
    /// fetch so the wait survives token expiry.
    ///
    /// Uses the configured interval and deadline.
    ///
    /// # Errors
    ///
    /// Same as [`wait::poll_fetch`], plus re-login failures.
    pub async fn wait_resource<R, P>(
        &self,
        type_name: &str,
        id: &str,
        policy: FetchErrorPolicy,
        predicate: P,
    ) -> Result<R, ApiError>
    where
        R: DeserializeOwned + Send,
        P: FnMut(&R) -> Result<bool, ApiError>,
    {
        let what = format!("{type_name}/{id}");
        wait::poll_fetch(
            self.config.poll_config(),
            policy,
            &what,
            move || async move {
                let fresh = self.re_login().await?;
                fresh.by_id::<R>(type_name, id).await
            },
            predicate,
        )
        .await
    }

    /// Watch an entity until `handler` reports done, bounded by the configured
    /// watch timeout.
    ///
    /// # Errors
    ///
    /// Same as [`wait::watch_resource`].
    pub async fn watch_resource<R, H>(
        &self,
        type_name: &str,
        id: &str,
        handler: H,
    ) -> Result<(), ApiError>
    where
        R: DeserializeOwned + Send + 'static,
        H: FnMut(&WatchEvent<R>) -> Result<bool, ApiError>,
    {
        let timeout_seconds = self.config.watch_timeout_seconds;
        wait::watch_resource(self, type_name, id, timeout_seconds, handler).await
    }
}

fn build_http(config: &CorralConfig) -> Result<HttpClient, ApiError> {
    HttpClientBuilder::with_config(config.http_config())
        .build()
        .map_err(crate::http_ops::into_api_error)
}

fn admin_credentials(config: &CorralConfig) -> Result<Credentials, ApiError> {
    let (Some(user), Some(password)) = (&config.admin_user, &config.admin_password) else {
        return Err(ApiError::Config(
            "no admin_token or admin_user/admin_password configured".to_owned(),
        ));
    };
    Ok(Credentials::new(user.clone(), password.clone()))
}

#[async_trait]
impl RawOps for Client {
    async fn raw_create(&self, type_name: &str, body: Value) -> Result<Value, ApiError> {
        self.ops.raw_create(type_name, body).await
    }

    async fn raw_by_id(&self, type_name: &str, id: &str) -> Result<Value, ApiError> {
        self.ops.raw_by_id(type_name, id).await
    }

    async fn raw_update(
        &self,
        type_name: &str,
        target: &Resource,
        body: Value,
    ) -> Result<Value, ApiError> {
        self.ops.raw_update(type_name, target, body).await
    }

    async fn raw_delete(&self, target: &Resource) -> Result<(), ApiError> {
        self.ops.raw_delete(target).await
    }

    async fn raw_list(&self, type_name: &str, opts: &ListOpts) -> Result<Value, ApiError> {
        self.ops.raw_list(type_name, opts).await
    }

    async fn raw_fetch(&self, url: &str) -> Result<Value, ApiError> {
        self.ops.raw_fetch(url).await
    }

    async fn raw_action(
        &self,
        action: &ActionDescriptor,
        input: Option<Value>,
    ) -> Result<Option<Value>, ApiError> {
        self.ops.raw_action(action, input).await
    }

    async fn raw_watch(
        &self,
        type_name: &str,
        opts: &WatchOptions,
    ) -> Result<RawEventStream, ApiError> {
        self.ops.raw_watch(type_name, opts).await
    }

    fn describe_action(
        &self,
        type_name: &str,
        name: &str,
        url: &str,
        scope: ActionScope,
    ) -> ActionDescriptor {
        self.ops.describe_action(type_name, name, url, scope)
    }
}
