use crate::error::HttpError;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

/// Bytes of an error body kept in [`HttpError::HttpStatus`]
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Decompressed, type-erased response body
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// A received response head with its unread body.
///
/// `send()` succeeds for every status. The status is checked by
/// [`checked_bytes`](Self::checked_bytes), [`json`](Self::json),
/// [`text`](Self::text) and [`error_for_status`](Self::error_for_status).
#[derive(Debug)]
pub struct HttpResponse {
    pub(crate) inner: Response<ResponseBody>,
    pub(crate) url: String,
    pub(crate) max_body_size: usize,
}

impl HttpResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// URL the request was sent to
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Fail on a non-2xx status without reading the body.
    ///
    /// # Errors
    ///
    /// [`HttpError::HttpStatus`] with an empty preview.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status().is_success() {
            Ok(self)
        } else {
            Err(self.status_error(String::new()))
        }
    }

    /// The whole body, whatever the status.
    ///
    /// # Errors
    ///
    /// [`HttpError::BodyTooLarge`] or a transport failure mid-body.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        let limit = self.max_body_size;
        collect(self.inner.into_body(), limit).await
    }

    /// The whole body of a 2xx response.
    ///
    /// # Errors
    ///
    /// [`HttpError::HttpStatus`] carrying a body preview for any other
    /// status, plus everything [`bytes`](Self::bytes) reports.
    pub async fn checked_bytes(self) -> Result<Bytes, HttpError> {
        if self.status().is_success() {
            return self.bytes().await;
        }

        let preview_limit = self.max_body_size.min(ERROR_BODY_PREVIEW_LIMIT);
        let (parts, body) = self.inner.into_parts();
        let preview = match collect(body, preview_limit).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(HttpError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
            Err(err) => return Err(err),
        };
        Err(HttpError::HttpStatus {
            status: parts.status,
            url: self.url,
            body_preview: preview,
            content_type: content_type(&parts.headers),
        })
    }

    /// Decode a 2xx JSON body.
    ///
    /// # Errors
    ///
    /// Everything [`checked_bytes`](Self::checked_bytes) reports, plus
    /// [`HttpError::Json`].
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let body = self.checked_bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// A 2xx body as lossy UTF-8.
    ///
    /// # Errors
    ///
    /// Same as [`checked_bytes`](Self::checked_bytes).
    pub async fn text(self) -> Result<String, HttpError> {
        let body = self.checked_bytes().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// The raw body stream, unbounded and unchecked. Watch responses are
    /// read this way; the reader bounds what it buffers.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.inner.into_body()
    }

    fn status_error(&self, body_preview: String) -> HttpError {
        HttpError::HttpStatus {
            status: self.status(),
            url: self.url.clone(),
            body_preview,
            content_type: content_type(self.headers()),
        }
    }
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::CONTENT_TYPE)?
        .to_str()
        .ok()
        .map(str::to_owned)
}

async fn collect(mut body: ResponseBody, limit: usize) -> Result<Bytes, HttpError> {
    let mut collected = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        let Ok(chunk) = frame.into_data() else {
            continue;
        };
        let actual = collected.len() + chunk.len();
        if actual > limit {
            return Err(HttpError::BodyTooLarge { limit, actual });
        }
        collected.extend_from_slice(&chunk);
    }
    Ok(collected.freeze())
}
