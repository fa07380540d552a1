//! [`RawOps`] over the management API.
//!
//! URL layout, for a type whose schema is unknown:
//! - collection: `<base>/<type>`
//! - entity: `<collection>/<id>` (or the entity's own `self`/`update`/`remove` links)
//! - watch: `<collection>?watch=true&fieldSelector=...&timeoutSeconds=N`
//!
//! Every call carries the bearer token. Status codes of 300 and above are
//! mapped into [`ApiError::Request`]/[`ApiError::NotFound`] with the server's
//! `code`/`message` parsed from the error body.

use crate::schema::{Schema, SchemaRegistry};
use crate::secret::SecretString;
use async_trait::async_trait;
use bytes::Bytes;
use corral_http::{HttpClient, HttpError, HttpResponse, RequestBuilder, ResponseBody};
use corral_sdk::ApiError;
use corral_sdk::error::{RequestError, STATUS_CONFLICT};
use corral_sdk::models::{
    ActionDescriptor, ActionScope, Collection, ListOpts, RawWatchEvent, Resource, WatchOptions,
};
use corral_sdk::ops::{RawEventStream, RawOps};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Pause between attempts of a call answered with 409 Conflict
pub const CONFLICT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Map a transport-level failure into the operation error taxonomy.
pub(crate) fn into_api_error(err: HttpError) -> ApiError {
    match err {
        HttpError::HttpStatus {
            status,
            url,
            body_preview,
            ..
        } => ApiError::from_status(request_error(status, url, &body_preview)),
        HttpError::Json(e) => ApiError::decode("response body", e),
        e @ HttpError::BodyTooLarge { .. } => ApiError::decode("response body", e),
        e @ (HttpError::InvalidUri { .. }
        | HttpError::InvalidScheme { .. }
        | HttpError::InvalidHeaderName(_)
        | HttpError::InvalidHeaderValue(_)
        | HttpError::RequestBuild(_)) => ApiError::Config(e.to_string()),
        other => ApiError::Transport(Box::new(other)),
    }
}

/// Build a [`RequestError`], reading the norman error envelope
/// (`{"type":"error","code":"...","message":"..."}`) when the body has one.
fn request_error(status: http::StatusCode, url: String, body: &str) -> RequestError {
    let (code, message) = match serde_json::from_str::<Value>(body) {
        Ok(envelope) => (
            envelope.get("code").and_then(Value::as_str).map(str::to_owned),
            envelope
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned),
        ),
        Err(_) => {
            let trimmed = body.trim();
            (None, (!trimmed.is_empty()).then(|| trimmed.to_owned()))
        }
    };

    RequestError {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_owned(),
        url,
        code,
        message,
    }
}

/// Read a JSON body after the status check; `None` for an empty body.
pub(crate) async fn read_json(response: HttpResponse) -> Result<Option<Value>, ApiError> {
    let url = response.url().to_owned();
    let body = response.checked_bytes().await.map_err(into_api_error)?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| ApiError::decode(url, e))
}

fn require_body(what: &str, value: Option<Value>) -> Result<Value, ApiError> {
    value.ok_or_else(|| ApiError::decode(what, "empty response body"))
}

/// Operations against one API base with one bearer token.
///
/// Cloning is cheap; the schema registry is shared.
#[derive(Clone)]
pub struct HttpOps {
    http: HttpClient,
    base: Url,
    token: SecretString,
    schemas: Arc<SchemaRegistry>,
    conflict_retries: u32,
}

impl std::fmt::Debug for HttpOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOps")
            .field("base", &self.base.as_str())
            .field("schemas", &self.schemas.len())
            .field("conflict_retries", &self.conflict_retries)
            .finish_non_exhaustive()
    }
}

impl HttpOps {
    /// `base` is the API root, e.g. `https://rancher.example.com/v3`
    #[must_use]
    pub fn new(http: HttpClient, base: Url, token: impl Into<SecretString>) -> Self {
        Self {
            http,
            base,
            token: token.into(),
            schemas: Arc::new(SchemaRegistry::new()),
            conflict_retries: crate::config::DEFAULT_CONFLICT_RETRIES,
        }
    }

    #[must_use]
    pub fn with_schemas(mut self, schemas: Arc<SchemaRegistry>) -> Self {
        self.schemas = schemas;
        self
    }

    /// Total attempts for calls answered with 409; at least 1
    #[must_use]
    pub fn with_conflict_retries(mut self, attempts: u32) -> Self {
        self.conflict_retries = attempts.max(1);
        self
    }

    /// Same base, schemas and transport with a different token
    #[must_use]
    pub fn with_token(&self, token: impl Into<SecretString>) -> Self {
        Self {
            token: token.into(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    #[must_use]
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    #[must_use]
    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    #[must_use]
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Fetch every page of `<base>/schemas`.
    ///
    /// # Errors
    ///
    /// Request/transport errors (an invalid token surfaces here as 401) or a
    /// decode failure.
    pub async fn discover(&self) -> Result<SchemaRegistry, ApiError> {
        let url = self.endpoint("schemas");
        let mut page: Collection<Schema> = self.get_decoded(&url, "schemas").await?;
        let mut schemas = std::mem::take(&mut page.data);
        let mut seen = HashSet::new();

        while let Some(next) = page.next_cursor().map(str::to_owned) {
            if !seen.insert(next.clone()) {
                let detail = format!("pagination cursor repeats: {next}");
                return Err(ApiError::decode("schemas", detail));
            }
            page = self.get_decoded(&next, "schemas").await?;
            schemas.append(&mut page.data);
        }

        tracing::debug!(base = %self.base, count = schemas.len(), "discovered schemas");
        Ok(SchemaRegistry::from_schemas(schemas))
    }

    /// `GET <base>`: proves the server answers and accepts the token.
    ///
    /// # Errors
    ///
    /// Request/transport errors.
    pub async fn ping(&self) -> Result<(), ApiError> {
        let response = self.send(self.http.get(self.base.as_str())).await?;
        response.checked_bytes().await.map_err(into_api_error)?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base.as_str().trim_end_matches('/'))
    }

    fn collection_url(&self, type_name: &str) -> String {
        self.schemas
            .collection_url(type_name)
            .map_or_else(|| self.endpoint(type_name), str::to_owned)
    }

    fn resource_url(&self, type_name: &str, id: &str) -> String {
        format!("{}/{id}", self.collection_url(type_name))
    }

    fn entity_url(&self, target: &Resource, preferred: &str) -> String {
        target
            .link(preferred)
            .or_else(|| target.link("self"))
            .map_or_else(
                || self.resource_url(&target.type_name, &target.id),
                str::to_owned,
            )
    }

    async fn send(&self, request: RequestBuilder) -> Result<HttpResponse, ApiError> {
        request
            .bearer_auth(self.token.expose())
            .send()
            .await
            .map_err(into_api_error)
    }

    async fn call(&self, request: RequestBuilder) -> Result<Option<Value>, ApiError> {
        read_json(self.send(request).await?).await
    }

    async fn get_decoded<T>(&self, url: &str, what: &str) -> Result<T, ApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        let value = require_body(what, self.call(self.http.get(url)).await?)?;
        serde_json::from_value(value).map_err(|e| ApiError::decode(what, e))
    }

    /// POST or PUT with an optional JSON body, retried on 409 Conflict.
    async fn call_with_conflict_retry(
        &self,
        method: http::Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, ApiError> {
        let mut attempt = 1;
        loop {
            let mut request = self.http.request(method.clone(), url);
            if let Some(body) = body {
                request = request.json(body).map_err(into_api_error)?;
            }

            match self.call(request).await {
                Err(err)
                    if err.status() == Some(STATUS_CONFLICT) && attempt < self.conflict_retries =>
                {
                    tracing::warn!(%method, url, attempt, "conflict, retrying");
                    tokio::time::sleep(CONFLICT_RETRY_DELAY).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl RawOps for HttpOps {
    async fn raw_create(&self, type_name: &str, body: Value) -> Result<Value, ApiError> {
        let url = self.collection_url(type_name);
        tracing::debug!(method = "POST", url = %url, "sending request");
        let request = self.http.post(&url).json(&body).map_err(into_api_error)?;
        require_body(type_name, self.call(request).await?)
    }

    async fn raw_by_id(&self, type_name: &str, id: &str) -> Result<Value, ApiError> {
        let url = self.resource_url(type_name, id);
        tracing::debug!(method = "GET", url = %url, "sending request");
        require_body(type_name, self.call(self.http.get(&url)).await?)
    }

    async fn raw_update(
        &self,
        type_name: &str,
        target: &Resource,
        body: Value,
    ) -> Result<Value, ApiError> {
        let url = self.entity_url(target, "update");
        tracing::debug!(method = "PUT", url = %url, "sending request");
        let updated = self
            .call_with_conflict_retry(http::Method::PUT, &url, Some(&body))
            .await?;
        require_body(type_name, updated)
    }

    async fn raw_delete(&self, target: &Resource) -> Result<(), ApiError> {
        let url = self.entity_url(target, "remove");
        tracing::debug!(method = "DELETE", url = %url, "sending request");
        // The body of a successful delete is not needed, JSON or not.
        let response = self.send(self.http.delete(&url)).await?;
        response.checked_bytes().await.map_err(into_api_error)?;
        Ok(())
    }

    async fn raw_list(&self, type_name: &str, opts: &ListOpts) -> Result<Value, ApiError> {
        let mut url = Url::parse(&self.collection_url(type_name))
            .map_err(|e| ApiError::Config(e.to_string()))?;
        let pairs = opts.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        tracing::debug!(method = "GET", url = %url, "sending request");
        require_body(type_name, self.call(self.http.get(url.as_str())).await?)
    }

    async fn raw_fetch(&self, url: &str) -> Result<Value, ApiError> {
        tracing::debug!(method = "GET", url, "sending request");
        require_body(url, self.call(self.http.get(url)).await?)
    }

    async fn raw_action(
        &self,
        action: &ActionDescriptor,
        input: Option<Value>,
    ) -> Result<Option<Value>, ApiError> {
        tracing::debug!(
            method = "POST",
            url = %action.url,
            action = %action.name,
            "invoking action"
        );
        self.call_with_conflict_retry(http::Method::POST, &action.url, input.as_ref())
            .await
    }

    async fn raw_watch(
        &self,
        type_name: &str,
        opts: &WatchOptions,
    ) -> Result<RawEventStream, ApiError> {
        let mut url = Url::parse(&self.collection_url(type_name))
            .map_err(|e| ApiError::Config(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("watch", "true");
            if let Some(selector) = &opts.field_selector {
                query.append_pair("fieldSelector", selector);
            }
            query.append_pair("timeoutSeconds", &opts.timeout_seconds.to_string());
        }
        tracing::debug!(url = %url, "opening watch");

        let response = self.send(self.http.get(url.as_str())).await?;
        if !response.status().is_success() {
            // Consumes the body into the error preview.
            response.checked_bytes().await.map_err(into_api_error)?;
            return Err(ApiError::decode(url.as_str(), "watch answered with a non-success status"));
        }

        let limit = response.max_body_size();
        Ok(ndjson_events(response.into_body(), limit))
    }

    fn describe_action(
        &self,
        type_name: &str,
        name: &str,
        url: &str,
        scope: ActionScope,
    ) -> ActionDescriptor {
        self.schemas.describe(type_name, name, url, scope)
    }
}

/// Splits a byte stream into non-blank lines.
#[derive(Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<Vec<u8>> {
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if !line.iter().all(u8::is_ascii_whitespace) {
                return Some(line);
            }
        }
        None
    }

    fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.buf);
        (!rest.iter().all(u8::is_ascii_whitespace)).then_some(rest)
    }

    fn len(&self) -> usize {
        self.buf.len()
    }
}

struct EventDecoder {
    chunks: BoxStream<'static, Result<Bytes, ApiError>>,
    lines: LineBuffer,
    limit: usize,
    exhausted: bool,
}

fn parse_event(line: &[u8]) -> Result<RawWatchEvent, ApiError> {
    serde_json::from_slice(line).map_err(|e| ApiError::decode("watch event", e))
}

fn oversized_event(limit: usize) -> ApiError {
    ApiError::decode("watch event", format!("event exceeds {limit} bytes"))
}

/// Decode newline-delimited JSON watch events.
///
/// A single event larger than `limit` bytes fails the stream. A transport
/// failure is yielded once and ends the stream.
fn ndjson_events(body: ResponseBody, limit: usize) -> RawEventStream {
    let chunks = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(ApiError::Transport))
        .boxed();
    let decoder = EventDecoder {
        chunks,
        lines: LineBuffer::default(),
        limit,
        exhausted: false,
    };

    stream::unfold(Some(decoder), |state| async move {
        let mut decoder = state?;
        loop {
            if let Some(line) = decoder.lines.next_line() {
                if line.len() > decoder.limit {
                    return Some((Err(oversized_event(decoder.limit)), None));
                }
                return Some((parse_event(&line), Some(decoder)));
            }
            // Only the unterminated tail is left in the buffer here.
            if decoder.lines.len() > decoder.limit {
                return Some((Err(oversized_event(decoder.limit)), None));
            }
            if decoder.exhausted {
                return decoder
                    .lines
                    .finish()
                    .map(|line| (parse_event(&line), None));
            }
            match decoder.chunks.next().await {
                Some(Ok(chunk)) => decoder.lines.push(&chunk),
                Some(Err(err)) => return Some((Err(err), None)),
                None => decoder.exhausted = true,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use corral_sdk::models::EventType;
    use http_body_util::{BodyExt as _, Full};

    fn body(text: &'static str) -> ResponseBody {
        Full::new(Bytes::from_static(text.as_bytes()))
            .map_err(|never| match never {})
            .boxed()
    }

    #[test]
    fn test_request_error_reads_norman_envelope() {
        let err = request_error(
            http::StatusCode::FORBIDDEN,
            "https://rancher.local/v3/clusters".to_owned(),
            concat!(
                r#"{"type":"error","status":"403","code":"PermissionDenied","#,
                r#""message":"clusters.management.cattle.io is forbidden"}"#,
            ),
        );
        assert_eq!(err.status, 403);
        assert_eq!(err.status_text, "Forbidden");
        assert_eq!(err.code.as_deref(), Some("PermissionDenied"));
        assert!(err.message.unwrap().contains("forbidden"));
    }

    #[test]
    fn test_request_error_keeps_plain_body() {
        let err = request_error(http::StatusCode::BAD_GATEWAY, "u".to_owned(), "  upstream down\n");
        assert_eq!(err.code, None);
        assert_eq!(err.message.as_deref(), Some("upstream down"));
    }

    #[test]
    fn test_status_404_maps_to_not_found() {
        let err = into_api_error(HttpError::HttpStatus {
            status: http::StatusCode::NOT_FOUND,
            url: "https://rancher.local/v3/clusters/c-x".to_owned(),
            body_preview: String::new(),
            content_type: None,
        });
        assert!(err.is_not_found());
    }

    #[test]
    fn test_timeout_maps_to_transport() {
        let err = into_api_error(HttpError::Timeout(Duration::from_secs(1)));
        assert!(err.is_transport());
    }

    #[test]
    fn test_line_buffer_skips_blank_lines() {
        let mut lines = LineBuffer::default();
        lines.push(b"{\"a\":1}\n\n  \n{\"b\"");
        assert_eq!(lines.next_line().unwrap(), b"{\"a\":1}");
        assert!(lines.next_line().is_none());
        lines.push(b":2}");
        assert_eq!(lines.finish().unwrap(), b"{\"b\":2}");
    }

    #[tokio::test]
    async fn test_ndjson_events_decode_in_order() {
        let events: Vec<_> = ndjson_events(
            body(
                "{\"type\":\"ADDED\",\"object\":{\"id\":\"c-1\"}}\n\
                 {\"type\":\"MODIFIED\",\"object\":{\"id\":\"c-1\"}}\n\
                 {\"type\":\"DELETED\",\"object\":{\"id\":\"c-1\"}}",
            ),
            1024,
        )
        .collect()
        .await;

        let types: Vec<EventType> = events
            .into_iter()
            .map(|e| e.unwrap().event_type)
            .collect();
        assert_eq!(
            types,
            [EventType::Added, EventType::Modified, EventType::Deleted]
        );
    }

    #[tokio::test]
    async fn test_ndjson_oversized_event_fails() {
        let events: Vec<_> = ndjson_events(body("{\"type\":\"ADDED\",\"object\":{}}"), 8)
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(ApiError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_ndjson_limit_applies_per_event() {
        // One chunk holding two events that together exceed the limit.
        let events: Vec<_> = ndjson_events(
            body(
                "{\"type\":\"ADDED\",\"object\":{}}\n\
                 {\"type\":\"DELETED\",\"object\":{}}\n",
            ),
            40,
        )
        .collect()
        .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().event_type, EventType::Added);
        assert_eq!(events[1].as_ref().unwrap().event_type, EventType::Deleted);
    }

    #[tokio::test]
    async fn test_ndjson_oversized_terminated_event_fails() {
        let events: Vec<_> = ndjson_events(
            body("{\"type\":\"ADDED\",\"object\":{\"id\":\"c-1\"}}\n{\"type\":\"ADDED\"}\n"),
            30,
        )
        .collect()
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(ApiError::Decode { .. })));
    }
}
