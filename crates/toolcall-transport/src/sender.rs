//! Outbound HTTP request middleware.

use async_trait::async_trait;
use reqwest::header::HeaderMap;

/// Sends one HTTP request.
///
/// Every request the event-stream transport issues goes through this trait:
/// the stream-opening GET, message POSTs, and re-opening GETs.
#[async_trait]
pub trait RequestSender: Send + Sync {
    /// Send a request and return the response head.
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, reqwest::Error>;
}

/// Sends requests with a shared HTTP client.
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: reqwest::Client,
}

impl HttpSender {
    /// Create a sender over an existing client.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RequestSender for HttpSender {
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, reqwest::Error> {
        self.client.execute(request).await
    }
}

/// Decorator that merges a fixed header map into every request.
///
/// Fixed headers replace request headers of the same name.
#[derive(Debug, Clone)]
pub struct HeaderInjector<S> {
    inner: S,
    headers: HeaderMap,
}

impl<S> HeaderInjector<S> {
    /// Wrap `inner` so every request carries `headers`.
    #[must_use]
    pub const fn new(inner: S, headers: HeaderMap) -> Self {
        Self { inner, headers }
    }

    /// The injected headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[async_trait]
impl<S: RequestSender> RequestSender for HeaderInjector<S> {
    async fn send(
        &self,
        mut request: reqwest::Request,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let target = request.headers_mut();
        for name in self.headers.keys() {
            target.remove(name);
        }
        for (name, value) in &self.headers {
            target.append(name.clone(), value.clone());
        }
        self.inner.send(request).await
    }
}
