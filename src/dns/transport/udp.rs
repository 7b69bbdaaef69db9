use crate::base::addr::{parse_port, split_host_port};
use crate::base::neterror::NetError;
use crate::dns::resolve::Resolver;
use crate::dns::transport::{DnsTransport, RoundTrip};
use futures::future::BoxFuture;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Max size for the UDP receive buffer as recommended by
/// [RFC6891](https://datatracker.ietf.org/doc/html/rfc6891#section-6.2.5).
const MAX_RECEIVE_BUFFER_SIZE: usize = 4_096;

/// Opens the connected socket of one round trip, given the server address.
pub type UdpDialFn =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<UdpSocket, NetError>> + Send + Sync>;

/// DNS over UDP.
///
/// Each round trip uses a fresh connected socket: one send, one receive, no
/// retransmission.
#[derive(Clone)]
pub struct UdpTransport {
    address: String,
    dial: UdpDialFn,
    io_timeout: Duration,
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("address", &self.address)
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}

impl UdpTransport {
    /// Creates a transport for `address` (`ip:port` or `host:port`).
    ///
    /// Server names are resolved with the system resolver.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            dial: resolving_dial_fn(Arc::new(crate::dns::new_resolver_system())),
            io_timeout: Duration::from_secs(10),
        }
    }

    /// Resolves the server name with `resolver` instead.
    pub fn with_resolver<R: Resolver + 'static>(mut self, resolver: R) -> Self {
        self.dial = resolving_dial_fn(Arc::new(resolver));
        self
    }

    /// Replaces the whole dial step.
    pub fn with_dial_fn<F>(mut self, dial: F) -> Self
    where
        F: Fn(String) -> BoxFuture<'static, Result<UdpSocket, NetError>> + Send + Sync + 'static,
    {
        self.dial = Arc::new(dial);
        self
    }

    /// Bounds the send and receive of one round trip.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    async fn exchange(&self, query: &[u8]) -> Result<Vec<u8>, NetError> {
        let socket = (self.dial)(self.address.clone()).await?;

        tokio::time::timeout(self.io_timeout, async {
            socket.send(query).await?;
            let mut buf = vec![0u8; MAX_RECEIVE_BUFFER_SIZE];
            let n = socket.recv(&mut buf).await?;
            buf.truncate(n);
            Ok::<_, NetError>(buf)
        })
        .await?
    }
}

fn resolving_dial_fn(resolver: Arc<dyn Resolver>) -> UdpDialFn {
    Arc::new(move |address: String| -> BoxFuture<'static, Result<UdpSocket, NetError>> {
        let resolver = resolver.clone();
        Box::pin(async move { dial_udp(resolver.as_ref(), &address).await })
    })
}

/// Connects a UDP socket to the first usable address of `address`.
///
/// IP hosts skip the resolver. A lookup without any IP address fails with
/// [`NetError::NoAddress`].
async fn dial_udp(resolver: &dyn Resolver, address: &str) -> Result<UdpSocket, NetError> {
    let (host, port) = split_host_port(address)?;
    let port = parse_port(port)?;
    let ip = match host.parse::<IpAddr>() {
        Ok(ip) => ip,
        Err(_) => resolver
            .lookup_host(host)
            .await?
            .iter()
            .find_map(|a| a.parse::<IpAddr>().ok())
            .ok_or_else(|| NetError::NoAddress(host.to_string()))?,
    };
    let peer = SocketAddr::new(ip, port);
    let bind = if peer.is_ipv4() {
        SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0)
    } else {
        SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0)
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(peer).await?;
    tracing::debug!(address, %peer, "udp socket connected");
    Ok(socket)
}

impl DnsTransport for UdpTransport {
    fn round_trip<'a>(&'a self, query: &'a [u8]) -> RoundTrip<'a> {
        Box::pin(self.exchange(query))
    }

    fn requires_padding(&self) -> bool {
        false
    }

    fn network(&self) -> &str {
        "udp"
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn close_idle_connections(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::failure::{classify, Failure};
    use crate::dns::resolve::tests::MockResolver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers one datagram with its payload reversed.
    async fn spawn_reverser() -> SocketAddr {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (n, peer) = server.recv_from(&mut buf).await.unwrap();
            let mut reply = buf[..n].to_vec();
            reply.reverse();
            server.send_to(&reply, peer).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_udp_round_trip() {
        let address = spawn_reverser().await.to_string();

        let transport = UdpTransport::new(address.clone());
        let reply = transport.round_trip(b"\x01\x02\x03").await.unwrap();
        assert_eq!(reply, b"\x03\x02\x01");
        assert_eq!(transport.network(), "udp");
        assert_eq!(transport.address(), address);
        assert!(!transport.requires_padding());
    }

    #[tokio::test]
    async fn test_udp_timeout() {
        // Bound but never answering.
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = server.local_addr().unwrap().to_string();

        let transport = UdpTransport::new(address).with_timeout(Duration::from_millis(50));
        let err = transport.round_trip(b"query").await.unwrap_err();
        assert!(matches!(err, NetError::DeadlineExceeded));
        drop(server);
    }

    #[tokio::test]
    async fn test_server_name_resolved_with_resolver() {
        let server = spawn_reverser().await;
        let resolver = Arc::new(MockResolver::answering(&["127.0.0.1"]));

        let transport = UdpTransport::new(format!("dns.test:{}", server.port()))
            .with_resolver(resolver.clone());
        assert_eq!(transport.round_trip(b"ab").await.unwrap(), b"ba");
        assert_eq!(resolver.lookups(), 1);
        assert_eq!(resolver.last_hostname.lock().unwrap().as_deref(), Some("dns.test"));
    }

    #[tokio::test]
    async fn test_ip_endpoint_skips_resolver() {
        let server = spawn_reverser().await;
        let resolver = Arc::new(MockResolver::answering(&[]));

        let transport = UdpTransport::new(server.to_string()).with_resolver(resolver.clone());
        assert_eq!(transport.round_trip(b"xy").await.unwrap(), b"yx");
        assert_eq!(resolver.lookups(), 0);
    }

    #[tokio::test]
    async fn test_empty_lookup_is_address_error() {
        let transport =
            UdpTransport::new("dns.test:53").with_resolver(MockResolver::answering(&[]));
        let err = transport.round_trip(b"query").await.unwrap_err();
        assert!(matches!(err, NetError::NoAddress(ref host) if host == "dns.test"));
        assert_eq!(classify(&err), Failure::InvalidAddress);
    }

    #[tokio::test]
    async fn test_lookup_failure_surfaces() {
        let transport = UdpTransport::new("dns.test:53")
            .with_resolver(MockResolver::failing(NetError::DnsNoSuchHost));
        let err = transport.round_trip(b"query").await.unwrap_err();
        assert!(matches!(err, NetError::DnsNoSuchHost));
    }

    #[tokio::test]
    async fn test_missing_port() {
        let transport = UdpTransport::new("dns.test").with_resolver(MockResolver::answering(&[]));
        let err = transport.round_trip(b"query").await.unwrap_err();
        assert!(matches!(err, NetError::MissingPort(_)));
    }

    #[tokio::test]
    async fn test_custom_dial_fn() {
        let server = spawn_reverser().await;
        let dials = Arc::new(AtomicUsize::new(0));
        let counter = dials.clone();

        let transport = UdpTransport::new("ignored.test:53").with_dial_fn(move |address| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                assert_eq!(address, "ignored.test:53");
                let socket = UdpSocket::bind("127.0.0.1:0").await?;
                socket.connect(server).await?;
                Ok::<_, NetError>(socket)
            })
        });
        assert_eq!(transport.round_trip(b"123").await.unwrap(), b"321");
        assert_eq!(dials.load(Ordering::SeqCst), 1);
        assert_eq!(transport.address(), "ignored.test:53");
    }
}
