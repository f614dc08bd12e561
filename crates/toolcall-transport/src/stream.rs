//! Event-stream transport over HTTP.
//!
//! Server-to-client messages arrive on a long-lived `text/event-stream`
//! response. The stream first announces a message endpoint; client-to-server
//! messages are POSTed there. Every outbound request, including re-opening
//! the stream, goes through the same [`HeaderInjector`].

use std::{
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{
    Method, Url,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use serde_json::Value;
use tokio::{sync::oneshot, task::JoinHandle};
use toolcall_core::{ChannelError, ConnectionError, Transport};

use crate::{
    peer::RpcPeer,
    protocol::OutgoingMessage,
    sender::{HeaderInjector, HttpSender, RequestSender},
    sse::{SseDecoder, SseEvent},
};

/// Default remote endpoint.
pub const DEFAULT_STREAM_URL: &str = "https://mcp.vapi.ai/sse";

const LAST_EVENT_ID: HeaderName = HeaderName::from_static("last-event-id");

/// Event-stream transport configuration.
#[derive(Debug, Clone)]
pub struct StreamTransportConfig {
    /// Event-stream URL.
    pub url: String,
    /// Headers merged into every outbound request.
    pub headers: HeaderMap,
    /// How long to wait for the message endpoint announcement.
    pub endpoint_timeout: Duration,
    /// Re-open attempts after the stream drops.
    pub reconnect_attempts: u32,
    /// Delay before each re-open attempt.
    pub reconnect_delay: Duration,
}

impl Default for StreamTransportConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            headers: HeaderMap::new(),
            endpoint_timeout: Duration::from_secs(30),
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

impl StreamTransportConfig {
    /// Configuration for the given URL with defaults elsewhere.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    ///
    /// # Errors
    /// Returns error if the token is not a valid header value.
    pub fn bearer_token(mut self, token: &str) -> Result<Self, ConnectionError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ConnectionError::Config(format!("Invalid bearer token: {e}")))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// Add a fixed header.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

async fn open_stream(
    sender: &dyn RequestSender,
    url: &Url,
    last_event_id: Option<&str>,
) -> Result<reqwest::Response, ConnectionError> {
    let mut request = reqwest::Request::new(Method::GET, url.clone());
    let headers = request.headers_mut();
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    if let Some(value) = last_event_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        headers.insert(LAST_EVENT_ID, value);
    }

    let response = sender
        .send(request)
        .await
        .map_err(|e| ConnectionError::Unreachable {
            endpoint: url.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ConnectionError::Rejected {
            endpoint: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// POSTs messages to the announced endpoint.
struct Poster {
    sender: Arc<dyn RequestSender>,
    endpoint: RwLock<Option<Url>>,
}

impl Poster {
    fn new(sender: Arc<dyn RequestSender>) -> Self {
        Self {
            sender,
            endpoint: RwLock::new(None),
        }
    }

    fn endpoint(&self) -> Option<Url> {
        self.endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_endpoint(&self, url: Url) {
        *self.endpoint.write().unwrap_or_else(PoisonError::into_inner) = Some(url);
    }

    fn clear_endpoint(&self) {
        *self.endpoint.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    async fn post(&self, message: &OutgoingMessage) -> Result<(), ChannelError> {
        let endpoint = self.endpoint().ok_or(ChannelError::NotConnected)?;
        let body = message.to_line()?;

        let mut request = reqwest::Request::new(Method::POST, endpoint.clone());
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        *request.body_mut() = Some(body.into());

        let response = self
            .sender
            .send(request)
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Http {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Background task reading the event stream.
struct EventPump {
    url: Url,
    peer: Arc<RpcPeer>,
    poster: Arc<Poster>,
    closing: Arc<AtomicBool>,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
    ready: Option<oneshot::Sender<()>>,
}

impl EventPump {
    async fn run(mut self, first: reqwest::Response) {
        let mut response = first;
        let mut decoder = SseDecoder::new();

        loop {
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        for event in decoder.push(&bytes) {
                            self.handle_event(event).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Event stream read error: {e}");
                        break;
                    }
                }
            }

            // No endpoint yet means the handshake never completed: let connect fail.
            if self.closing.load(Ordering::Acquire) || self.ready.is_some() {
                break;
            }

            // The remote session went with the stream: nothing sent to it will be answered.
            self.peer.fail_pending();
            self.poster.clear_endpoint();

            let last_event_id = decoder.last_event_id().map(ToOwned::to_owned);
            match self.reopen(last_event_id.as_deref()).await {
                Some(next) => {
                    response = next;
                    decoder = SseDecoder::resume(last_event_id);
                }
                None => break,
            }
        }

        self.peer.fail_all();
        tracing::debug!("Event stream reader stopped");
    }

    async fn handle_event(&mut self, event: SseEvent) {
        match event.event.as_str() {
            "endpoint" => match self.url.join(event.data.trim()) {
                Ok(endpoint) => {
                    tracing::debug!(%endpoint, "Message endpoint announced");
                    self.poster.set_endpoint(endpoint);
                    if let Some(ready) = self.ready.take() {
                        let _ = ready.send(());
                    }
                }
                Err(e) => tracing::warn!("Ignoring unusable endpoint '{}': {e}", event.data),
            },
            "message" => {
                if let Some(reply) = self.peer.handle_line(&event.data) {
                    if let Err(e) = self.poster.post(&reply).await {
                        tracing::warn!("Failed to answer server request: {e}");
                    }
                }
            }
            other => tracing::debug!("Ignoring '{other}' event"),
        }
    }

    async fn reopen(&self, last_event_id: Option<&str>) -> Option<reqwest::Response> {
        for attempt in 1..=self.reconnect_attempts {
            tokio::time::sleep(self.reconnect_delay).await;
            if self.closing.load(Ordering::Acquire) {
                return None;
            }
            match open_stream(self.poster.sender.as_ref(), &self.url, last_event_id).await {
                Ok(response) => {
                    tracing::info!(attempt, "Event stream re-opened");
                    return Some(response);
                }
                Err(e) => tracing::warn!(attempt, "Re-opening event stream failed: {e}"),
            }
        }
        tracing::error!(
            "Event stream lost after {} re-open attempt(s)",
            self.reconnect_attempts
        );
        None
    }
}

struct Connected {
    peer: Arc<RpcPeer>,
    poster: Arc<Poster>,
    closing: Arc<AtomicBool>,
    pump: JoinHandle<()>,
}

/// Transport over an HTTP event stream.
pub struct StreamTransport {
    config: StreamTransportConfig,
    sender: Arc<dyn RequestSender>,
    state: Option<Connected>,
}

impl StreamTransport {
    /// Create a transport using a fresh HTTP client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: StreamTransportConfig) -> Result<Self, ConnectionError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConnectionError::Config(format!("HTTP client: {e}")))?;
        Ok(Self::with_sender(config, HttpSender::new(client)))
    }

    /// Create a transport over a custom request sender.
    ///
    /// The configured headers are injected on top of `sender`.
    #[must_use]
    pub fn with_sender(config: StreamTransportConfig, sender: impl RequestSender + 'static) -> Self {
        let sender = HeaderInjector::new(sender, config.headers.clone());
        Self {
            config,
            sender: Arc::new(sender),
            state: None,
        }
    }

    /// The message endpoint announced by the stream, once connected.
    #[must_use]
    pub fn endpoint(&self) -> Option<Url> {
        self.state.as_ref().and_then(|s| s.poster.endpoint())
    }
}

#[async_trait]
impl Transport for StreamTransport {
    fn kind(&self) -> &'static str {
        "stream"
    }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.state.is_some() {
            return Err(ConnectionError::Config(
                "Transport already connected".to_string(),
            ));
        }

        let url = Url::parse(&self.config.url).map_err(|e| {
            ConnectionError::Config(format!("Invalid URL '{}': {e}", self.config.url))
        })?;
        tracing::info!(%url, "Opening event stream");
        let response = open_stream(self.sender.as_ref(), &url, None).await?;

        let peer = Arc::new(RpcPeer::new());
        let poster = Arc::new(Poster::new(Arc::clone(&self.sender)));
        let closing = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();

        let pump = EventPump {
            url: url.clone(),
            peer: Arc::clone(&peer),
            poster: Arc::clone(&poster),
            closing: Arc::clone(&closing),
            reconnect_attempts: self.config.reconnect_attempts,
            reconnect_delay: self.config.reconnect_delay,
            ready: Some(ready_tx),
        };
        let pump = tokio::spawn(pump.run(response));

        // Kept before the wait so close() also releases a half-open stream.
        self.state = Some(Connected {
            peer,
            poster,
            closing,
            pump,
        });

        match tokio::time::timeout(self.config.endpoint_timeout, ready_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ConnectionError::Handshake(format!(
                "Event stream from {url} ended before announcing a message endpoint"
            ))),
            Err(_) => Err(ConnectionError::Handshake(format!(
                "No message endpoint announced by {url} within {:?}",
                self.config.endpoint_timeout
            ))),
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChannelError> {
        let state = self.state.as_ref().ok_or(ChannelError::NotConnected)?;
        let (id, message, rx) = state.peer.begin(method, params)?;
        tracing::debug!(id, method, "Posting request");

        if let Err(e) = state.poster.post(&message).await {
            state.peer.cancel(id);
            return Err(e);
        }
        RpcPeer::wait(rx).await
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ChannelError> {
        let state = self.state.as_ref().ok_or(ChannelError::NotConnected)?;
        tracing::debug!(method, "Posting notification");
        state
            .poster
            .post(&OutgoingMessage::notification(method, params))
            .await
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        if let Some(state) = self.state.take() {
            state.closing.store(true, Ordering::Release);
            state.pump.abort();
            state.peer.fail_all();
            tracing::info!("Event stream closed");
        }
        Ok(())
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        if let Some(state) = &self.state {
            state.closing.store(true, Ordering::Release);
            state.pump.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;

    type Chunk = Result<Bytes, std::io::Error>;

    #[derive(Default)]
    struct FakeState {
        stream: Option<mpsc::UnboundedSender<Chunk>>,
        opens: usize,
        reject: Option<u16>,
        silent: bool,
        event_ids: bool,
        drop_on: Option<&'static str>,
        requests: Vec<(Method, HeaderMap, Option<Value>)>,
    }

    /// In-memory remote speaking the event-stream protocol.
    #[derive(Clone, Default)]
    struct FakeRemote {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeRemote {
        fn push(&self, event: &str, data: &str) {
            let mut state = self.state.lock().unwrap();
            let id = if state.event_ids {
                format!("id: {}\n", state.requests.len())
            } else {
                String::new()
            };
            if let Some(tx) = &state.stream {
                let _ = tx.send(Ok(Bytes::from(format!("{id}event: {event}\ndata: {data}\n\n"))));
            }
        }

        fn drop_stream(&self) {
            self.state.lock().unwrap().stream = None;
        }

        fn answer(method: &str, params: &Value) -> Result<Value, (i64, &'static str)> {
            match method {
                "initialize" => Ok(json!({ "protocolVersion": "2024-11-05", "serverInfo": { "name": "fake" } })),
                "tools/list" => Ok(json!({ "tools": [{ "name": "list_calls" }] })),
                "tools/call" if params["name"] == "list_calls" => {
                    Ok(json!({ "content": [{ "type": "text", "text": "[]" }] }))
                }
                _ => Err((-32601, "Method not found")),
            }
        }
    }

    fn response(status: u16, body: reqwest::Body) -> reqwest::Response {
        http::Response::builder()
            .status(status)
            .body(body)
            .unwrap()
            .into()
    }

    #[async_trait]
    impl RequestSender for FakeRemote {
        async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, reqwest::Error> {
            let body = request
                .body()
                .and_then(reqwest::Body::as_bytes)
                .and_then(|b| serde_json::from_slice::<Value>(b).ok());
            let method = request.method().clone();

            let mut state = self.state.lock().unwrap();
            state
                .requests
                .push((method.clone(), request.headers().clone(), body.clone()));

            if method == Method::GET {
                state.opens += 1;
                if let Some(status) = state.reject {
                    return Ok(response(status, "invalid token".into()));
                }
                let (tx, rx) = mpsc::unbounded_channel::<Chunk>();
                if !state.silent {
                    let _ = tx.send(Ok(Bytes::from_static(
                        b"event: endpoint\ndata: /message?sessionId=s1\n\n",
                    )));
                }
                state.stream = Some(tx);
                return Ok(response(
                    200,
                    reqwest::Body::wrap_stream(UnboundedReceiverStream::new(rx)),
                ));
            }
            drop(state);

            let Some(message) = body else {
                return Ok(response(400, "".into()));
            };
            {
                let mut state = self.state.lock().unwrap();
                if state.drop_on.is_some() && message["method"].as_str() == state.drop_on {
                    state.drop_on = None;
                    state.stream = None;
                    return Ok(response(202, "Accepted".into()));
                }
            }
            if let (Some(id), Some(method)) = (message.get("id"), message["method"].as_str()) {
                let reply = match Self::answer(method, &message["params"]) {
                    Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                    Err((code, text)) => json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": code, "message": text }
                    }),
                };
                self.push("message", &reply.to_string());
            }
            Ok(response(202, "Accepted".into()))
        }
    }

    fn config() -> StreamTransportConfig {
        let mut config = StreamTransportConfig::new("https://mcp.example.test/sse")
            .bearer_token("test-token")
            .unwrap();
        config.endpoint_timeout = Duration::from_millis(200);
        config.reconnect_delay = Duration::from_millis(10);
        config
    }

    #[tokio::test]
    async fn test_connect_request_and_headers() {
        let remote = FakeRemote::default();
        let mut transport = StreamTransport::with_sender(config(), remote.clone());

        transport.connect().await.unwrap();
        assert_eq!(
            transport.endpoint().unwrap().as_str(),
            "https://mcp.example.test/message?sessionId=s1"
        );

        let result = transport.request("tools/list", json!({})).await.unwrap();
        assert_eq!(result["tools"][0]["name"], "list_calls");
        transport
            .notify("notifications/initialized", json!({}))
            .await
            .unwrap();
        transport.close().await.unwrap();

        let state = remote.state.lock().unwrap();
        assert_eq!(state.requests.len(), 3);
        for (_, headers, _) in &state.requests {
            assert_eq!(headers[AUTHORIZATION], "Bearer test-token");
        }
        assert_eq!(state.requests[0].1[ACCEPT], "text/event-stream");
        assert_eq!(state.requests[1].1[CONTENT_TYPE], "application/json");
        assert_eq!(
            state.requests[2].2.as_ref().unwrap()["method"],
            "notifications/initialized"
        );
    }

    #[tokio::test]
    async fn test_remote_error_response() {
        let remote = FakeRemote::default();
        let mut transport = StreamTransport::with_sender(config(), remote);
        transport.connect().await.unwrap();

        let err = transport
            .request("resources/list", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Remote { code: -32601, .. }));
    }

    #[tokio::test]
    async fn test_rejected_credential() {
        let remote = FakeRemote::default();
        remote.state.lock().unwrap().reject = Some(401);
        let mut transport = StreamTransport::with_sender(config(), remote);

        match transport.connect().await {
            Err(ConnectionError::Rejected { status, body, .. }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid token");
            }
            other => panic!("unexpected connect result: {other:?}"),
        }
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_endpoint_announcement() {
        let remote = FakeRemote::default();
        remote.state.lock().unwrap().silent = true;
        let mut transport = StreamTransport::with_sender(config(), remote);

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Handshake(_)));
        // A half-open transport can still be closed, twice.
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_reopened_with_headers() {
        let remote = FakeRemote::default();
        remote.state.lock().unwrap().event_ids = true;
        let mut transport = StreamTransport::with_sender(config(), remote.clone());
        transport.connect().await.unwrap();
        transport.request("tools/list", json!({})).await.unwrap();

        remote.drop_stream();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let result = transport.request("tools/list", json!({})).await.unwrap();
        assert!(result["tools"].is_array());

        let state = remote.state.lock().unwrap();
        assert_eq!(state.opens, 2);
        let reopen = state
            .requests
            .iter()
            .filter(|(m, _, _)| *m == Method::GET)
            .nth(1)
            .unwrap();
        assert_eq!(reopen.1[AUTHORIZATION], "Bearer test-token");
        assert!(reopen.1.contains_key(LAST_EVENT_ID));
    }

    #[tokio::test]
    async fn test_stream_drop_fails_waiting_request() {
        let remote = FakeRemote::default();
        remote.state.lock().unwrap().drop_on = Some("tools/call");
        let mut transport = StreamTransport::with_sender(config(), remote.clone());
        transport.connect().await.unwrap();

        let waiting = tokio::time::timeout(
            Duration::from_secs(2),
            transport.request("tools/call", json!({ "name": "list_calls" })),
        )
        .await
        .unwrap();
        assert!(matches!(waiting, Err(ChannelError::Closed)));

        // The re-opened stream serves new requests.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let result = transport
            .request("tools/call", json!({ "name": "list_calls" }))
            .await
            .unwrap();
        assert_eq!(result["content"][0]["text"], "[]");
        assert_eq!(remote.state.lock().unwrap().opens, 2);
    }

    #[tokio::test]
    async fn test_exhausted_reopen_closes_channel() {
        let remote = FakeRemote::default();
        let mut transport = StreamTransport::with_sender(config(), remote.clone());
        transport.connect().await.unwrap();

        remote.state.lock().unwrap().reject = Some(503);
        remote.drop_stream();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(matches!(
            transport.request("tools/list", json!({})).await,
            Err(ChannelError::Closed)
        ));
        assert_eq!(remote.state.lock().unwrap().opens, 4);
        assert!(transport.endpoint().is_none());
        transport.close().await.unwrap();
    }

    /// Sender whose every request fails before reaching the network.
    struct Offline;

    #[async_trait]
    impl RequestSender for Offline {
        async fn send(&self, _: reqwest::Request) -> Result<reqwest::Response, reqwest::Error> {
            match reqwest::Client::new().get("not a url").build() {
                Err(e) => Err(e),
                Ok(_) => panic!("request unexpectedly built"),
            }
        }
    }

    #[tokio::test]
    async fn test_unreachable_remote() {
        let mut transport = StreamTransport::with_sender(config(), Offline);

        match transport.connect().await {
            Err(ConnectionError::Unreachable { endpoint, .. }) => {
                assert_eq!(endpoint, "https://mcp.example.test/sse");
            }
            other => panic!("unexpected connect result: {other:?}"),
        }
        assert!(transport.endpoint().is_none());
    }

    #[tokio::test]
    async fn test_request_before_connect() {
        let transport = StreamTransport::with_sender(config(), FakeRemote::default());
        assert!(matches!(
            transport.request("tools/list", json!({})).await,
            Err(ChannelError::NotConnected)
        ));
    }
}
