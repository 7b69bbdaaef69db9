//! DNS over HTTPS (RFC 8484), `POST` flavor.

use crate::base::addr::join_host_port;
use crate::base::neterror::NetError;
use crate::dns::transport::{DnsTransport, RoundTrip};
use crate::socket::dialer::Dialer;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use http::{HeaderValue, Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::{future::Future, pin::Pin, sync::Arc};
use url::Url;

const DNS_MESSAGE: &str = "application/dns-message";

/// Alias for the `Future` type returned by an HTTP client.
pub type Responding<'a> =
    Pin<Box<dyn Future<Output = Result<Response<Bytes>, NetError>> + Send + 'a>>;

/// The HTTP capability the DoH transport needs.
pub trait HttpClient: Send + Sync {
    /// Sends `request` and returns the response with its full body.
    fn round_trip(&self, request: Request<Bytes>) -> Responding<'_>;

    fn close_idle_connections(&self);
}

impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    fn round_trip(&self, request: Request<Bytes>) -> Responding<'_> {
        (**self).round_trip(request)
    }

    fn close_idle_connections(&self) {
        (**self).close_idle_connections()
    }
}

/// One-shot HTTP/1.1 client over a TLS dialer.
///
/// Every request gets its own connection; the connection driver exits once
/// the response is read and the sender is dropped.
#[derive(Debug)]
pub struct HyperClient<D> {
    dialer: D,
}

impl<D: Dialer> HyperClient<D> {
    pub fn new(dialer: D) -> Self {
        Self { dialer }
    }

    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, NetError> {
        let url = Url::parse(&request.uri().to_string())
            .map_err(|e| NetError::InvalidUrl(e.to_string()))?;
        if url.scheme() != "https" {
            return Err(NetError::InvalidUrl(url.to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| NetError::InvalidUrl(url.to_string()))?
            .trim_start_matches('[')
            .trim_end_matches(']');
        let port = url.port_or_known_default().unwrap_or(443);
        let address = join_host_port(host, &port.to_string());

        let socket = self.dialer.dial_context("tcp", &address).await?;
        let (mut sender, conn) = http1::handshake(TokioIo::new(socket)).await?;
        tokio::spawn(async move {
            if let Err(error) = conn.await {
                tracing::debug!(%error, "doh connection closed with error");
            }
        });

        let (mut parts, body) = request.into_parts();
        let authority = parts
            .uri
            .authority()
            .map(|a| a.as_str().to_string())
            .ok_or_else(|| NetError::InvalidUrl(url.to_string()))?;
        let origin: Uri = parts
            .uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/")
            .parse()
            .map_err(http::Error::from)?;
        parts.uri = origin;
        parts
            .headers
            .insert(HOST, HeaderValue::from_str(&authority).map_err(http::Error::from)?);

        let response = sender
            .send_request(Request::from_parts(parts, Full::new(body)))
            .await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();
        Ok(Response::from_parts(parts, body))
    }
}

impl<D: Dialer> HttpClient for HyperClient<D> {
    fn round_trip(&self, request: Request<Bytes>) -> Responding<'_> {
        Box::pin(self.send(request))
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections();
    }
}

/// DNS over HTTPS.
///
/// A client handed over by value belongs to the transport, which closes its
/// idle connections. A shared client is left alone.
pub struct HttpsTransport {
    url: String,
    client: Arc<dyn HttpClient>,
    owns_client: bool,
    user_agent: Option<String>,
}

impl std::fmt::Debug for HttpsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpsTransport")
            .field("url", &self.url)
            .field("owns_client", &self.owns_client)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl HttpsTransport {
    pub fn new<C: HttpClient + 'static>(client: C, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Arc::new(client),
            owns_client: true,
            user_agent: None,
        }
    }

    pub fn with_http_client<C: HttpClient + 'static>(mut self, client: C) -> Self {
        self.client = Arc::new(client);
        self.owns_client = true;
        self
    }

    /// Uses a client that others keep using; `close_idle_connections` does
    /// not reach it.
    pub fn with_shared_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = client;
        self.owns_client = false;
        self
    }

    /// Sets the `user-agent` header of every query.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    async fn exchange(&self, query: &[u8]) -> Result<Vec<u8>, NetError> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(&self.url)
            .header(CONTENT_TYPE, DNS_MESSAGE);
        if let Some(user_agent) = &self.user_agent {
            builder = builder.header(USER_AGENT, user_agent);
        }
        let request = builder.body(Bytes::copy_from_slice(query))?;

        let response = self.client.round_trip(request).await?;
        if response.status() != StatusCode::OK {
            return Err(NetError::DnsServerTemporarilyMisbehaving);
        }
        let content_type = response.headers().get(CONTENT_TYPE);
        if content_type.map(HeaderValue::as_bytes) != Some(DNS_MESSAGE.as_bytes()) {
            tracing::warn!(url = %self.url, ?content_type, "doh: the server did not set the right content type");
        }
        Ok(response.into_body().to_vec())
    }
}

impl DnsTransport for HttpsTransport {
    fn round_trip<'a>(&'a self, query: &'a [u8]) -> RoundTrip<'a> {
        Box::pin(self.exchange(query))
    }

    fn requires_padding(&self) -> bool {
        true
    }

    fn network(&self) -> &str {
        "doh"
    }

    fn address(&self) -> &str {
        &self.url
    }

    fn close_idle_connections(&self) {
        if self.owns_client {
            self.client.close_idle_connections();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::dialer::tests::DuplexDialer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records requests and replies with a fixed response.
    struct MockClient {
        status: StatusCode,
        content_type: &'static str,
        body: &'static [u8],
        requests: Mutex<Vec<Request<Bytes>>>,
        closed: AtomicUsize,
    }

    impl MockClient {
        fn new(status: StatusCode, content_type: &'static str, body: &'static [u8]) -> Self {
            Self {
                status,
                content_type,
                body,
                requests: Mutex::new(Vec::new()),
                closed: AtomicUsize::new(0),
            }
        }
    }

    impl HttpClient for MockClient {
        fn round_trip(&self, request: Request<Bytes>) -> Responding<'_> {
            self.requests.lock().unwrap().push(request);
            let response = Response::builder()
                .status(self.status)
                .header(CONTENT_TYPE, self.content_type)
                .body(Bytes::from_static(self.body))
                .map_err(NetError::from);
            Box::pin(async move { response })
        }

        fn close_idle_connections(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_post_query() {
        let client = Arc::new(MockClient::new(StatusCode::OK, DNS_MESSAGE, b"reply"));
        let transport = HttpsTransport::new(client.clone(), "https://dns.google/dns-query")
            .with_user_agent("probe/1.0");

        let reply = transport.round_trip(b"query").await.unwrap();
        assert_eq!(reply, b"reply");

        let requests = client.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri(), "https://dns.google/dns-query");
        assert_eq!(request.headers()[CONTENT_TYPE], DNS_MESSAGE);
        assert_eq!(request.headers()[USER_AGENT], "probe/1.0");
        assert_eq!(request.body().as_ref(), b"query");
    }

    #[tokio::test]
    async fn test_no_user_agent_by_default() {
        let client = Arc::new(MockClient::new(StatusCode::OK, DNS_MESSAGE, b"reply"));
        let transport = HttpsTransport::new(client.clone(), "https://dns.google/dns-query");
        transport.round_trip(b"query").await.unwrap();
        assert!(client.requests.lock().unwrap()[0].headers().get(USER_AGENT).is_none());
    }

    #[tokio::test]
    async fn test_non_200_status() {
        let client = MockClient::new(StatusCode::BAD_GATEWAY, DNS_MESSAGE, b"");
        let transport = HttpsTransport::new(client, "https://dns.google/dns-query");
        let err = transport.round_trip(b"query").await.unwrap_err();
        assert!(matches!(err, NetError::DnsServerTemporarilyMisbehaving));
    }

    #[tokio::test]
    async fn test_wrong_content_type_still_returns_body() {
        let client = MockClient::new(StatusCode::OK, "text/html", b"reply");
        let transport = HttpsTransport::new(client, "https://dns.google/dns-query");
        assert_eq!(transport.round_trip(b"query").await.unwrap(), b"reply");
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let client = MockClient::new(StatusCode::OK, DNS_MESSAGE, b"");
        let transport = HttpsTransport::new(client, "not a url");
        let err = transport.round_trip(b"query").await.unwrap_err();
        assert!(matches!(err, NetError::HttpRequest(_)));
    }

    #[test]
    fn test_tags_and_close() {
        let client = Arc::new(MockClient::new(StatusCode::OK, DNS_MESSAGE, b""));
        let transport = HttpsTransport::new(client.clone(), "https://1.1.1.1/dns-query");
        assert_eq!(transport.network(), "doh");
        assert_eq!(transport.address(), "https://1.1.1.1/dns-query");
        assert!(transport.requires_padding());
        transport.close_idle_connections();
        assert_eq!(client.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shared_client_not_closed() {
        let client = Arc::new(MockClient::new(StatusCode::OK, DNS_MESSAGE, b""));
        let owned = MockClient::new(StatusCode::OK, DNS_MESSAGE, b"");
        let transport = HttpsTransport::new(owned, "https://1.1.1.1/dns-query")
            .with_shared_client(client.clone());
        transport.close_idle_connections();
        assert_eq!(client.closed.load(Ordering::SeqCst), 0);

        let transport = transport.with_http_client(client.clone());
        transport.close_idle_connections();
        assert_eq!(client.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shared_client_round_trip() {
        let client = Arc::new(MockClient::new(StatusCode::OK, DNS_MESSAGE, b"reply"));
        let shared: Arc<dyn HttpClient> = client.clone();
        let owned = MockClient::new(StatusCode::BAD_GATEWAY, DNS_MESSAGE, b"");
        let transport = HttpsTransport::new(owned, "https://1.1.1.1/dns-query")
            .with_shared_client(shared);
        assert_eq!(transport.round_trip(b"query").await.unwrap(), b"reply");
        assert_eq!(client.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hyper_client_speaks_http1() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let dialer = DuplexDialer::new(|mut server| async move {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(5).any(|w| w == b"query") {
                let n = server.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = String::from_utf8_lossy(&request).to_string();
            assert!(head.starts_with("POST /dns-query HTTP/1.1\r\n"), "{head}");
            assert!(head.to_ascii_lowercase().contains("host: dns.example:8443\r\n"), "{head}");
            server
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/dns-message\r\ncontent-length: 5\r\n\r\nreply",
                )
                .await
                .unwrap();
        });
        let client = Arc::new(HyperClient::new(dialer));
        let transport = HttpsTransport::new(client.clone(), "https://dns.example:8443/dns-query");

        assert_eq!(transport.round_trip(b"query").await.unwrap(), b"reply");
        assert_eq!(
            *client.dialer.addresses.lock().unwrap(),
            vec!["dns.example:8443"]
        );
    }

    #[tokio::test]
    async fn test_hyper_client_rejects_plain_http() {
        let client = HyperClient::new(DuplexDialer::hanging_up());
        let request = Request::post("http://dns.example/dns-query")
            .body(Bytes::new())
            .unwrap();
        let err = client.round_trip(request).await.unwrap_err();
        assert!(matches!(err, NetError::InvalidUrl(_)));
        assert_eq!(client.dialer.dials(), 0);
    }
}
