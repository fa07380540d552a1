use crate::client::HttpClient;
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::HttpResponse;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request, Uri};
use http_body_util::Full;
use serde::Serialize;

const JSON: &str = "application/json";

/// One request under construction.
///
/// Header errors are held back and reported by [`RequestBuilder::send`] so
/// calls can be chained.
///
/// ```ignore
/// let response = http
///     .post("https://rancher.local/v3/clusters")
///     .bearer_auth(token.expose())
///     .json(&payload)?
///     .send()
///     .await?;
/// ```
#[must_use = "nothing is sent until .send() is awaited"]
pub struct RequestBuilder {
    client: HttpClient,
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<(Bytes, &'static str)>,
    deferred: Option<HttpError>,
}

impl RequestBuilder {
    pub(crate) fn new(client: HttpClient, method: Method, url: &str) -> Self {
        Self {
            client,
            method,
            url: url.to_owned(),
            headers: HeaderMap::new(),
            body: None,
            deferred: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.deferred.is_none() {
            match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
                (Ok(name), Ok(value)) => {
                    self.headers.append(name, value);
                }
                (Err(e), _) => self.deferred = Some(e.into()),
                (_, Err(e)) => self.deferred = Some(e.into()),
            }
        }
        self
    }

    /// `Authorization: Bearer <token>`, marked sensitive
    pub fn bearer_auth(mut self, token: &str) -> Self {
        match HeaderValue::try_from(format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.headers.insert(AUTHORIZATION, value);
            }
            Err(e) => {
                self.deferred.get_or_insert(e.into());
            }
        }
        self
    }

    /// Serialize `body` as the JSON payload.
    ///
    /// # Errors
    ///
    /// [`HttpError::Json`], or a header error deferred earlier in the chain.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, HttpError> {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }
        self.body = Some((serde_json::to_vec(body)?.into(), JSON));
        Ok(self)
    }

    /// Send and return the response whatever its status.
    ///
    /// # Errors
    ///
    /// Deferred header errors, a URL the transport refuses, transport
    /// failures, timeouts and a full queue.
    pub async fn send(self) -> Result<HttpResponse, HttpError> {
        if let Some(err) = self.deferred {
            return Err(err);
        }
        let uri = target(&self.url, self.client.transport())?;

        let mut headers = self.headers;
        let payload = match self.body {
            Some((bytes, content_type)) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
                }
                bytes
            }
            None => Bytes::new(),
        };

        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(uri)
            .body(Full::new(payload))?;
        *request.headers_mut() = headers;

        tracing::trace!(method = %self.method, url = %self.url, "sending request");
        let inner = self.client.dispatch(request).await?;
        Ok(HttpResponse {
            inner,
            url: self.url,
            max_body_size: self.client.max_body_size(),
        })
    }
}

/// Parse `url` and check its scheme against `transport`.
fn target(url: &str, transport: TransportSecurity) -> Result<Uri, HttpError> {
    let invalid = |kind, reason: String| HttpError::InvalidUri {
        url: url.to_owned(),
        kind,
        reason,
    };

    let uri: Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| invalid(InvalidUriKind::Malformed, e.to_string()))?;
    if uri.authority().is_none() {
        return Err(invalid(InvalidUriKind::MissingAuthority, "no host".to_owned()));
    }

    match (uri.scheme_str(), transport) {
        (Some("https"), _) | (Some("http"), TransportSecurity::AllowInsecureHttp) => Ok(uri),
        (Some("http"), TransportSecurity::TlsOnly) => Err(HttpError::InvalidScheme {
            scheme: "http".to_owned(),
            reason: "plain HTTP is not enabled".to_owned(),
        }),
        (Some(other), _) => Err(HttpError::InvalidScheme {
            scheme: other.to_owned(),
            reason: "expected http or https".to_owned(),
        }),
        (None, _) => Err(invalid(InvalidUriKind::MissingScheme, "no scheme".to_owned())),
    }
}
