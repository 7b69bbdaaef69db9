//! QUIC dialing with quinn.

use crate::base::addr::{parse_port, split_host_port};
use crate::base::neterror::NetError;
use crate::quic::config::QuicConfig;
use crate::quic::listener::QuicListener;
use crate::quic::tls::{apply_tls_defaults, QuicTlsConfig};
use quinn::crypto::rustls::QuicClientConfig;
use quinn::{Connection, Endpoint, TokioRuntime};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;

/// Alias for the `Future` type returned by a QUIC dialer.
pub type QuicDialing<'a, S> = Pin<Box<dyn Future<Output = Result<S, NetError>> + Send + 'a>>;

/// Trait for establishing QUIC sessions.
pub trait QuicDialer: Send + Sync {
    /// The established session.
    type Session: Send + 'static;

    /// Dials `address` (`host:port`) over `network` (`udp`, `udp4` or `udp6`).
    ///
    /// `tls` and `quic` are read, never modified.
    fn dial_context<'a>(
        &'a self,
        network: &'a str,
        address: &'a str,
        tls: &'a QuicTlsConfig,
        quic: &'a QuicConfig,
    ) -> QuicDialing<'a, Self::Session>;

    /// Closes idle connections held by this dialer or the layers below it.
    fn close_idle_connections(&self);
}

impl<D: QuicDialer + ?Sized> QuicDialer for Arc<D> {
    type Session = D::Session;

    fn dial_context<'a>(
        &'a self,
        network: &'a str,
        address: &'a str,
        tls: &'a QuicTlsConfig,
        quic: &'a QuicConfig,
    ) -> QuicDialing<'a, Self::Session> {
        (**self).dial_context(network, address, tls, quic)
    }

    fn close_idle_connections(&self) {
        (**self).close_idle_connections()
    }
}

/// Dials IP endpoints with a fresh quinn endpoint per session.
///
/// The host must be an IP literal; names are resolved by
/// [`QuicDialerResolver`](crate::quic::QuicDialerResolver).
#[derive(Debug)]
pub struct QuinnDialer<L> {
    listener: L,
}

impl<L: QuicListener> QuinnDialer<L> {
    pub fn new(listener: L) -> Self {
        Self { listener }
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    async fn dial(
        &self,
        network: &str,
        address: &str,
        tls: &QuicTlsConfig,
        quic: &QuicConfig,
    ) -> Result<Connection, NetError> {
        if !matches!(network, "udp" | "udp4" | "udp6") {
            return Err(NetError::UnsupportedNetwork(network.to_string()));
        }
        let (host, port) = split_host_port(address)?;
        let port_num = parse_port(port)?;
        let ip: IpAddr = host.parse().map_err(|_| NetError::InvalidIp)?;
        let remote = SocketAddr::new(ip, port_num);

        let local = match ip {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let socket = self.listener.listen(SocketAddr::new(local, 0))?;

        let tls = apply_tls_defaults(tls, port);
        let crypto = QuicClientConfig::try_from(tls.client_config()?)
            .map_err(|e| NetError::QuicConfig(e.to_string()))?;
        let mut client = quinn::ClientConfig::new(Arc::new(crypto));
        client.transport_config(Arc::new(quic.transport_config()?));

        let endpoint = Endpoint::new_with_abstract_socket(
            quic.endpoint_config()?,
            None,
            socket,
            Arc::new(TokioRuntime),
        )?;
        let server_name = tls.server_name.as_deref().unwrap_or(host);
        let connecting = endpoint.connect_with(client, remote, server_name)?;

        if quic.enable_0rtt {
            match connecting.into_0rtt() {
                Ok((conn, _accepted)) => return Ok(conn),
                Err(connecting) => {
                    tracing::debug!(address, "0-RTT unavailable, full handshake");
                    return Ok(connecting.await?);
                }
            }
        }
        Ok(connecting.await?)
    }
}

impl<L: QuicListener> QuicDialer for QuinnDialer<L> {
    type Session = Connection;

    fn dial_context<'a>(
        &'a self,
        network: &'a str,
        address: &'a str,
        tls: &'a QuicTlsConfig,
        quic: &'a QuicConfig,
    ) -> QuicDialing<'a, Connection> {
        Box::pin(self.dial(network, address, tls, quic))
    }

    fn close_idle_connections(&self) {}
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::base::failure::{classify, Failure};
    use crate::quic::listener::tests::FailingListener;
    use crate::quic::listener::UdpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// What a [`MockQuicDialer`] saw on each call.
    #[derive(Debug, Clone)]
    pub(crate) struct DialRecord {
        pub(crate) address: String,
        pub(crate) server_name: Option<String>,
    }

    /// Dialer whose sessions are the dialed addresses.
    #[derive(Default)]
    pub(crate) struct MockQuicDialer {
        refuse: Vec<String>,
        pub(crate) records: Mutex<Vec<DialRecord>>,
        pub(crate) closed: AtomicUsize,
    }

    impl MockQuicDialer {
        pub(crate) fn refusing(mut self, address: &str) -> Self {
            self.refuse.push(address.to_string());
            self
        }

        pub(crate) fn dials(&self) -> usize {
            self.records.lock().unwrap().len()
        }
    }

    impl QuicDialer for MockQuicDialer {
        type Session = String;

        fn dial_context<'a>(
            &'a self,
            _network: &'a str,
            address: &'a str,
            tls: &'a QuicTlsConfig,
            _quic: &'a QuicConfig,
        ) -> QuicDialing<'a, String> {
            self.records.lock().unwrap().push(DialRecord {
                address: address.to_string(),
                server_name: tls.server_name.clone(),
            });
            let refused = self.refuse.iter().any(|a| a == address);
            Box::pin(async move {
                if refused {
                    return Err(NetError::QuicConnection(quinn::ConnectionError::TimedOut));
                }
                Ok(address.to_string())
            })
        }

        fn close_idle_connections(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn dial_err(address: &str) -> NetError {
        let dialer = QuinnDialer::new(UdpListener);
        let tls = QuicTlsConfig::new().with_server_name("www.google.com");
        dialer
            .dial_context("udp", address, &tls, &QuicConfig::default())
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_cannot_split_host_port() {
        assert!(matches!(dial_err("a.b.c.d").await, NetError::MissingPort(_)));
    }

    #[tokio::test]
    async fn test_invalid_port() {
        assert!(matches!(dial_err("8.8.4.4:xyz").await, NetError::InvalidPort(_)));
    }

    #[tokio::test]
    async fn test_invalid_ip() {
        assert!(matches!(dial_err("a.b.c.d:0").await, NetError::InvalidIp));
    }

    #[tokio::test]
    async fn test_unsupported_network() {
        let dialer = QuinnDialer::new(UdpListener);
        let err = dialer
            .dial_context("tcp", "8.8.8.8:443", &QuicTlsConfig::new(), &QuicConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::UnsupportedNetwork(n) if n == "tcp"));
    }

    #[tokio::test]
    async fn test_cannot_listen() {
        let dialer = QuinnDialer::new(FailingListener(std::io::ErrorKind::AddrInUse));
        let err = dialer
            .dial_context("udp", "8.8.8.8:443", &QuicTlsConfig::new(), &QuicConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::Io(ref e) if e.kind() == std::io::ErrorKind::AddrInUse));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        // Bound but never read: the handshake gets no reply.
        let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let address = silent.local_addr().unwrap().to_string();

        let dialer = QuinnDialer::new(UdpListener);
        let tls = QuicTlsConfig::new().with_server_name("localhost");
        let quic = QuicConfig::new().idle_timeout(Duration::from_millis(500));
        let err = dialer
            .dial_context("udp", &address, &tls, &quic)
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::QuicConnection(quinn::ConnectionError::TimedOut)));
        assert_eq!(classify(&err), Failure::GenericTimeoutError);
    }
}
