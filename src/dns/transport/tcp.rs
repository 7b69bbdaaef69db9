//! DNS over a persistent TCP or TLS stream.
//!
//! One stream per transport, dialed lazily. Round trips are serialized by a
//! fair mutex; the locked part runs on its own task so that a caller giving
//! up never interrupts a half-written frame. The I/O deadline bounds how long
//! an abandoned round trip keeps the lock.

use crate::base::neterror::NetError;
use crate::dns::resolve::Resolver;
use crate::dns::transport::{DnsTransport, RoundTrip};
use crate::socket::dialer::Dialer;
use crate::socket::stream::BoxedSocket;
use crate::socket::tls::{TlsDialer, TlsOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{timeout_at, Instant};

const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// State of the persistent stream.
#[derive(Debug)]
enum ConnState {
    Unconnected,
    Connected(BoxedSocket),
    /// The previous stream broke on write and a new one is being dialed.
    Redialing,
}

/// Outcome of one attempt on the current stream.
enum Attempt {
    Reply(Vec<u8>),
    /// The write failed; the server probably closed the idle stream.
    Redial(NetError),
    Failed(NetError),
}

/// DNS over TCP (`tcp`) or DNS over TLS (`dot`).
pub struct TcpTransport {
    network: &'static str,
    address: String,
    dialer: Arc<dyn Dialer>,
    conn: Arc<Mutex<ConnState>>,
    waiters: AtomicUsize,
    io_timeout: Duration,
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("network", &self.network)
            .field("address", &self.address)
            .field("waiters", &self.waiters.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Counts a caller as waiting for the lock until dropped.
struct WaiterGuard<'a>(&'a AtomicUsize);

impl<'a> WaiterGuard<'a> {
    fn register(waiters: &'a AtomicUsize) -> Self {
        waiters.fetch_add(1, Ordering::SeqCst);
        Self(waiters)
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TcpTransport {
    /// DNS over plain TCP, dialing with `dialer`.
    pub fn new_tcp<D: Dialer + 'static>(dialer: D, address: impl Into<String>) -> Self {
        Self::with_network("tcp", Arc::new(dialer), address.into())
    }

    /// DNS over TLS with ALPN `dot`, dialing TCP with `dialer`.
    pub fn new_tls<D: Dialer + 'static>(dialer: D, address: impl Into<String>) -> Self {
        let tls = TlsDialer::new(dialer, TlsOptions::dot());
        Self::with_network("dot", Arc::new(tls), address.into())
    }

    /// DNS over TLS, resolving the server name with `resolver`.
    pub fn new_tls_with_resolver<R: Resolver + 'static>(
        resolver: R,
        address: impl Into<String>,
    ) -> Self {
        Self::new_tls(crate::socket::dialer::new_dialer_with_resolver(resolver), address)
    }

    fn with_network(network: &'static str, dialer: Arc<dyn Dialer>, address: String) -> Self {
        Self {
            network,
            address,
            dialer,
            conn: Arc::new(Mutex::new(ConnState::Unconnected)),
            waiters: AtomicUsize::new(0),
            io_timeout: IO_TIMEOUT,
        }
    }

    /// Replaces the dial function, keeping the network tag.
    pub fn with_dialer<D: Dialer + 'static>(mut self, dialer: D) -> Self {
        self.dialer = Arc::new(dialer);
        self
    }

    /// Deadline covering the write and the read of one attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Number of callers currently waiting for the stream.
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    async fn exchange(&self, query: &[u8]) -> Result<Vec<u8>, NetError> {
        if query.len() > u16::MAX as usize {
            return Err(NetError::QueryTooLong);
        }

        let guard = {
            let _waiter = WaiterGuard::register(&self.waiters);
            self.conn.clone().lock_owned().await
        };

        let locked = Locked {
            guard,
            dialer: self.dialer.clone(),
            address: self.address.clone(),
            io_timeout: self.io_timeout,
        };
        let query = query.to_vec();
        tokio::spawn(async move { locked.run(&query).await }).await?
    }
}

/// The locked section of a round trip. Owns the guard so that it survives
/// its caller.
struct Locked {
    guard: OwnedMutexGuard<ConnState>,
    dialer: Arc<dyn Dialer>,
    address: String,
    io_timeout: Duration,
}

impl Locked {
    async fn run(mut self, query: &[u8]) -> Result<Vec<u8>, NetError> {
        let conn = match std::mem::replace(&mut *self.guard, ConnState::Unconnected) {
            ConnState::Connected(conn) => conn,
            _ => self.dial().await?,
        };
        match self.attempt(conn, query).await {
            Attempt::Reply(reply) => return Ok(reply),
            Attempt::Failed(e) => return Err(e),
            Attempt::Redial(e) => {
                tracing::debug!(address = %self.address, error = %e, "dns stream broken, redialing")
            }
        }

        *self.guard = ConnState::Redialing;
        let conn = match self.dial().await {
            Ok(conn) => conn,
            Err(e) => {
                *self.guard = ConnState::Unconnected;
                return Err(e);
            }
        };
        match self.attempt(conn, query).await {
            Attempt::Reply(reply) => Ok(reply),
            Attempt::Redial(e) | Attempt::Failed(e) => Err(e),
        }
    }

    async fn dial(&self) -> Result<BoxedSocket, NetError> {
        self.dialer.dial_context("tcp", &self.address).await
    }

    /// Writes the length-prefixed query and reads the length-prefixed reply.
    ///
    /// The stream is put back only after a complete exchange.
    async fn attempt(&mut self, mut conn: BoxedSocket, query: &[u8]) -> Attempt {
        let deadline = Instant::now() + self.io_timeout;

        let mut frame = Vec::with_capacity(query.len() + 2);
        frame.extend_from_slice(&(query.len() as u16).to_be_bytes());
        frame.extend_from_slice(query);
        let write = async {
            conn.write_all(&frame).await?;
            conn.flush().await
        };
        match timeout_at(deadline, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Attempt::Redial(e.into()),
            Err(e) => return Attempt::Redial(e.into()),
        }

        let read = async {
            let mut header = [0u8; 2];
            conn.read_exact(&mut header).await?;
            let mut reply = vec![0u8; u16::from_be_bytes(header) as usize];
            conn.read_exact(&mut reply).await?;
            Ok::<_, std::io::Error>(reply)
        };
        match timeout_at(deadline, read).await {
            Ok(Ok(reply)) => {
                *self.guard = ConnState::Connected(conn);
                Attempt::Reply(reply)
            }
            Ok(Err(e)) => Attempt::Failed(e.into()),
            Err(e) => Attempt::Failed(e.into()),
        }
    }
}

impl DnsTransport for TcpTransport {
    fn round_trip<'a>(&'a self, query: &'a [u8]) -> RoundTrip<'a> {
        Box::pin(self.exchange(query))
    }

    /// Both `tcp` and `dot` pad their queries.
    fn requires_padding(&self) -> bool {
        true
    }

    fn network(&self) -> &str {
        self.network
    }

    fn address(&self) -> &str {
        &self.address
    }

    /// Closes the stream if nobody is using it or waiting for it.
    fn close_idle_connections(&self) {
        if self.waiters() != 0 {
            return;
        }
        let Ok(mut state) = self.conn.try_lock() else {
            return;
        };
        if matches!(*state, ConnState::Connected(_)) {
            *state = ConnState::Unconnected;
            tracing::debug!(network = self.network, address = %self.address, "closed idle dns stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::dialer::tests::DuplexDialer;
    use crate::socket::dialer::Dialing;
    use std::sync::atomic::AtomicBool;
    use tokio::io::DuplexStream;

    /// Reads framed queries and answers each with the query reversed.
    async fn serve_reversed(mut server: DuplexStream) {
        loop {
            let mut header = [0u8; 2];
            if server.read_exact(&mut header).await.is_err() {
                return;
            }
            let mut query = vec![0u8; u16::from_be_bytes(header) as usize];
            if server.read_exact(&mut query).await.is_err() {
                return;
            }
            query.reverse();
            let mut frame = (query.len() as u16).to_be_bytes().to_vec();
            frame.extend_from_slice(&query);
            if server.write_all(&frame).await.is_err() {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_framing_and_reuse() {
        let transport = TcpTransport::new_tcp(DuplexDialer::new(serve_reversed), "127.0.0.1:53");
        assert_eq!(transport.round_trip(b"abc").await.unwrap(), b"cba");
        assert_eq!(transport.round_trip(b"xyz").await.unwrap(), b"zyx");
        assert_eq!(transport.network(), "tcp");
        assert!(transport.requires_padding());
    }

    #[tokio::test]
    async fn test_lazy_dial() {
        let dialer = Arc::new(DuplexDialer::new(serve_reversed));
        let transport = TcpTransport::new_tcp(dialer.clone(), "127.0.0.1:53");
        assert_eq!(dialer.dials(), 0);
        transport.round_trip(b"q").await.unwrap();
        transport.round_trip(b"q").await.unwrap();
        assert_eq!(dialer.dials(), 1);
    }

    #[tokio::test]
    async fn test_query_too_long() {
        let dialer = Arc::new(DuplexDialer::new(serve_reversed));
        let transport = TcpTransport::new_tcp(dialer.clone(), "127.0.0.1:53");
        let query = vec![0u8; 65536];
        let err = transport.round_trip(&query).await.unwrap_err();
        assert!(matches!(err, NetError::QueryTooLong));
        assert_eq!(dialer.dials(), 0);
    }

    /// First stream refuses writes, later ones work.
    struct BrokenFirstDialer {
        broke: AtomicBool,
        inner: DuplexDialer,
    }

    impl Dialer for BrokenFirstDialer {
        fn dial_context<'a>(&'a self, network: &'a str, address: &'a str) -> Dialing<'a> {
            Box::pin(async move {
                if !self.broke.swap(true, Ordering::SeqCst) {
                    let (client, server) = tokio::io::duplex(16);
                    drop(server);
                    return Ok(BoxedSocket::new(client));
                }
                self.inner.dial_context(network, address).await
            })
        }

        fn close_idle_connections(&self) {}
    }

    #[tokio::test]
    async fn test_redial_after_write_failure() {
        let dialer = Arc::new(BrokenFirstDialer {
            broke: AtomicBool::new(false),
            inner: DuplexDialer::new(serve_reversed),
        });
        let transport = TcpTransport::new_tcp(dialer.clone(), "127.0.0.1:53");
        assert_eq!(transport.round_trip(b"abc").await.unwrap(), b"cba");
        assert_eq!(dialer.inner.dials(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_is_not_retried() {
        // Accepts the query and hangs up without answering.
        let dialer = Arc::new(DuplexDialer::new(|mut server| async move {
            let mut header = [0u8; 2];
            let _ = server.read_exact(&mut header).await;
        }));
        let transport = TcpTransport::new_tcp(dialer.clone(), "127.0.0.1:53");
        let err = transport.round_trip(b"abc").await.unwrap_err();
        assert!(matches!(err, NetError::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
        assert_eq!(dialer.dials(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_io_deadline() {
        // Reads forever, never answers.
        let dialer = DuplexDialer::new(|mut server| async move {
            let mut buf = [0u8; 64];
            while let Ok(n) = server.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        });
        let transport = TcpTransport::new_tcp(dialer, "127.0.0.1:53");
        let err = transport.round_trip(b"abc").await.unwrap_err();
        assert!(matches!(err, NetError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_dial_failure_propagates() {
        let dialer = DuplexDialer::new(serve_reversed).refusing("127.0.0.1:53");
        let transport = TcpTransport::new_tcp(dialer, "127.0.0.1:53");
        let err = transport.round_trip(b"abc").await.unwrap_err();
        assert!(matches!(err, NetError::Io(ref e) if e.kind() == std::io::ErrorKind::ConnectionRefused));
    }

    #[tokio::test]
    async fn test_close_idle_connections() {
        let dialer = Arc::new(DuplexDialer::new(serve_reversed));
        let transport = TcpTransport::new_tcp(dialer.clone(), "127.0.0.1:53");

        // Nothing to close yet.
        transport.close_idle_connections();

        transport.round_trip(b"q").await.unwrap();
        transport.close_idle_connections();
        transport.close_idle_connections();
        transport.round_trip(b"q").await.unwrap();
        assert_eq!(dialer.dials(), 2);
    }

    #[tokio::test]
    async fn test_close_idle_skips_busy_stream() {
        let dialer = Arc::new(DuplexDialer::new(serve_reversed));
        let transport = TcpTransport::new_tcp(dialer.clone(), "127.0.0.1:53");
        transport.round_trip(b"q").await.unwrap();

        // Someone holds the lock.
        let held = transport.conn.clone().lock_owned().await;
        transport.close_idle_connections();
        drop(held);

        // Someone is queued for it.
        transport.waiters.fetch_add(1, Ordering::SeqCst);
        transport.close_idle_connections();
        transport.waiters.fetch_sub(1, Ordering::SeqCst);

        transport.round_trip(b"q").await.unwrap();
        assert_eq!(dialer.dials(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_round_trips_share_stream() {
        let dialer = Arc::new(DuplexDialer::new(serve_reversed));
        let transport = Arc::new(TcpTransport::new_tcp(dialer.clone(), "127.0.0.1:53"));
        let tasks: Vec<_> = (0u8..16)
            .map(|i| {
                let transport = transport.clone();
                tokio::spawn(async move {
                    let reply = transport.round_trip(&[i, i + 1]).await.unwrap();
                    assert_eq!(reply, vec![i + 1, i]);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(dialer.dials(), 1);
        assert_eq!(transport.waiters(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_round_trip_completes() {
        let dialer = Arc::new(DuplexDialer::new(serve_reversed));
        let transport = TcpTransport::new_tcp(dialer.clone(), "127.0.0.1:53");

        // Poll once so the locked section starts, then drop the caller.
        {
            let fut = transport.round_trip(b"first");
            tokio::pin!(fut);
            let _ = futures::poll!(fut.as_mut());
        }
        // The next caller still gets its own answer on the same stream.
        assert_eq!(transport.round_trip(b"second").await.unwrap(), b"dnoces");
        assert_eq!(transport.waiters(), 0);
    }

    #[test]
    fn test_tls_transport_tags() {
        let transport = TcpTransport::new_tls(DuplexDialer::hanging_up(), "1.1.1.1:853");
        assert_eq!(transport.network(), "dot");
        assert_eq!(transport.address(), "1.1.1.1:853");
        assert!(transport.requires_padding());
    }
}
