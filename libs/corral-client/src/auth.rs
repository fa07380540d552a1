//! Local-provider login.

use crate::http_ops::{into_api_error, read_json};
use crate::secret::SecretString;
use corral_http::HttpClient;
use corral_sdk::ApiError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Login endpoint of the local authentication provider, relative to the server root
pub const LOGIN_PATH: &str = "v3-public/localProviders/local";

/// Username and password of a local principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Serialize)]
struct LoginInput<'a> {
    username: &'a str,
    password: &'a str,
}

/// Token object returned by a login
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    #[serde(default)]
    pub id: String,
    /// Bearer value, `<name>:<key>`
    pub token: SecretString,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Lifetime in milliseconds; 0 or absent means no expiry
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// `POST <root>/v3-public/localProviders/local?action=login`
///
/// # Errors
///
/// [`ApiError::Request`] when the server rejects the credentials, plus
/// transport and decode errors.
pub async fn login(
    http: &HttpClient,
    root: &Url,
    credentials: &Credentials,
) -> Result<Token, ApiError> {
    let mut url = root
        .join(LOGIN_PATH)
        .map_err(|e| ApiError::Config(e.to_string()))?;
    url.query_pairs_mut().append_pair("action", "login");

    let body = LoginInput {
        username: &credentials.username,
        password: credentials.password.expose(),
    };
    let response = http
        .post(url.as_str())
        .json(&body)
        .map_err(into_api_error)?
        .send()
        .await
        .map_err(into_api_error)?;

    let Some(value) = read_json(response).await? else {
        return Err(ApiError::decode("login token", "empty response body"));
    };
    let token: Token =
        serde_json::from_value(value).map_err(|e| ApiError::decode("login token", e))?;
    if token.token.is_empty() {
        return Err(ApiError::decode("login token", "token value is empty"));
    }

    tracing::info!(username = %credentials.username, token_id = %token.id, "logged in");
    Ok(token)
}
