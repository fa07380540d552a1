use crate::builder::HttpClientBuilder;
use crate::config::TransportSecurity;
use crate::error::HttpError;
use crate::request::RequestBuilder;
use crate::response::ResponseBody;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{Method, Request, Response};
use http_body_util::Full;
use std::sync::Arc;
use std::task::Poll;
use tower::buffer::Buffer;
use tower::{BoxError, Service};

type Dispatch = Buffer<
    Request<Full<Bytes>>,
    BoxFuture<'static, Result<Response<ResponseBody>, HttpError>>,
>;

#[derive(Debug)]
pub struct Shared {
    pub max_body_size: usize,
    pub transport: TransportSecurity,
}

/// Pooled HTTP client.
///
/// Clones share the connection pool and the dispatch queue.
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: Dispatch,
    pub(crate) shared: Arc<Shared>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("max_body_size", &self.shared.max_body_size)
            .field("transport", &self.shared.transport)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Client with default settings.
    ///
    /// # Errors
    ///
    /// Same as [`HttpClientBuilder::build`].
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Request to an absolute URL. Callers compose query strings themselves.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(self.clone(), method, url)
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Limit applied to buffered reads of this client's responses
    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.shared.max_body_size
    }

    #[must_use]
    pub fn transport(&self) -> TransportSecurity {
        self.shared.transport
    }

    /// Queue `request` without waiting for queue space.
    pub(crate) async fn dispatch(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<ResponseBody>, HttpError> {
        let mut service = self.service.clone();
        let ready = std::future::poll_fn(|cx| match service.poll_ready(cx) {
            Poll::Ready(result) => Poll::Ready(Some(result)),
            Poll::Pending => Poll::Ready(None),
        })
        .await;

        match ready {
            Some(Ok(())) => service.call(request).await.map_err(unwrap_queue_error),
            Some(Err(err)) => Err(unwrap_queue_error(err)),
            None => Err(HttpError::Overloaded),
        }
    }
}

/// The queue forwards the inner [`HttpError`] boxed, or reports its own death.
fn unwrap_queue_error(err: BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(err) => *err,
        Err(err) => {
            tracing::error!(error = %err, "HTTP dispatch worker stopped");
            HttpError::ServiceClosed
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::HttpClientConfig;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client() -> HttpClient {
        HttpClientBuilder::with_config(HttpClientConfig::for_testing())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_verbs_reach_server() {
        let server = MockServer::start();
        let get = server.mock(|when, then| {
            when.method(GET).path("/v3/clusters");
            then.status(200).json_body(json!({"type": "collection", "data": []}));
        });
        let put = server.mock(|when, then| {
            when.method(PUT).path("/v3/clusters/c-1");
            then.status(200).json_body(json!({"id": "c-1"}));
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/v3/clusters/c-1");
            then.status(204);
        });

        let http = client();
        let resp = http.get(&server.url("/v3/clusters")).send().await.unwrap();
        assert_eq!(resp.status(), http::StatusCode::OK);

        let entity = server.url("/v3/clusters/c-1");
        http.put(&entity)
            .json(&json!({"name": "e2e"}))
            .unwrap()
            .send()
            .await
            .unwrap();
        let resp = http.delete(&entity).send().await.unwrap();
        assert_eq!(resp.status(), http::StatusCode::NO_CONTENT);

        get.assert();
        put.assert();
        delete.assert();
    }

    #[tokio::test]
    async fn test_user_agent_defaults_and_can_be_overridden() {
        let server = MockServer::start();
        let defaulted = server.mock(|when, then| {
            when.path("/default").header("user-agent", "corral-tests/1.0");
            then.status(200);
        });
        let explicit = server.mock(|when, then| {
            when.path("/explicit").header("user-agent", "custom");
            then.status(200);
        });

        let http = HttpClientBuilder::with_config(HttpClientConfig::for_testing())
            .user_agent("corral-tests/1.0")
            .build()
            .unwrap();
        http.get(&server.url("/default")).send().await.unwrap();
        http.get(&server.url("/explicit"))
            .header("user-agent", "custom")
            .send()
            .await
            .unwrap();

        defaulted.assert();
        explicit.assert();
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport() {
        let err = client()
            .get("http://127.0.0.1:9/v3")
            .send()
            .await
            .unwrap_err();
        assert!(err.is_transport(), "{err}");
    }
}
