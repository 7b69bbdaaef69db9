//! Stream dialers and the decorators composed on top of them.
//!
//! [`new_dialer_with_resolver`] builds the standard chain:
//! logging, then resolver-backed iteration over the addresses, then per-attempt
//! logging and error classification around the system TCP dialer.

use crate::base::addr::{is_ip_addr, join_host_port, split_host_port};
use crate::base::context::NetResultExt;
use crate::base::errwrap::Operation;
use crate::base::neterror::NetError;
use crate::dns::resolve::{NullResolver, Resolver};
use crate::socket::stream::BoxedSocket;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Alias for the `Future` type returned by a stream dialer.
pub type Dialing<'a> = Pin<Box<dyn Future<Output = Result<BoxedSocket, NetError>> + Send + 'a>>;

/// Trait for establishing stream connections.
pub trait Dialer: Send + Sync {
    /// Dials `address` (`host:port`) over `network` (`tcp`, `tcp4` or `tcp6`).
    fn dial_context<'a>(&'a self, network: &'a str, address: &'a str) -> Dialing<'a>;

    /// Closes idle connections held by this dialer or the layers below it.
    fn close_idle_connections(&self);
}

impl<D: Dialer + ?Sized> Dialer for Arc<D> {
    fn dial_context<'a>(&'a self, network: &'a str, address: &'a str) -> Dialing<'a> {
        (**self).dial_context(network, address)
    }

    fn close_idle_connections(&self) {
        (**self).close_idle_connections()
    }
}

impl<D: Dialer + ?Sized> Dialer for Box<D> {
    fn dial_context<'a>(&'a self, network: &'a str, address: &'a str) -> Dialing<'a> {
        (**self).dial_context(network, address)
    }

    fn close_idle_connections(&self) {
        (**self).close_idle_connections()
    }
}

/// Connects TCP sockets using the operating system.
///
/// The address must already be an IP endpoint; names are resolved by
/// [`DialerResolver`].
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl TcpDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Dialer for TcpDialer {
    fn dial_context<'a>(&'a self, network: &'a str, address: &'a str) -> Dialing<'a> {
        Box::pin(async move {
            if !matches!(network, "tcp" | "tcp4" | "tcp6") {
                return Err(NetError::UnsupportedNetwork(network.to_string()));
            }
            let stream =
                tokio::time::timeout(self.connect_timeout, TcpStream::connect(address)).await??;
            stream.set_nodelay(true)?;
            Ok(BoxedSocket::new(stream))
        })
    }

    fn close_idle_connections(&self) {}
}

/// Resolves the host part of the address, then tries each address in order.
///
/// IP literals are dialed directly. A resolver error is returned unchanged
/// without any dial attempt; if every attempt fails the last error wins.
#[derive(Debug)]
pub struct DialerResolver<D, R> {
    dialer: D,
    resolver: R,
}

impl<D: Dialer, R: Resolver> DialerResolver<D, R> {
    pub fn new(dialer: D, resolver: R) -> Self {
        Self { dialer, resolver }
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    async fn lookup_host(&self, host: &str) -> Result<Vec<String>, NetError> {
        if is_ip_addr(host) {
            return Ok(vec![host.to_string()]);
        }
        self.resolver.lookup_host(host).await
    }
}

impl<D: Dialer, R: Resolver> Dialer for DialerResolver<D, R> {
    fn dial_context<'a>(&'a self, network: &'a str, address: &'a str) -> Dialing<'a> {
        Box::pin(async move {
            let (host, port) = split_host_port(address)?;
            let addrs = self.lookup_host(host).await?;
            let Some((first, rest)) = addrs.split_first() else {
                return Err(NetError::DnsNoAnswer);
            };
            let mut result = self.dialer.dial_context(network, &join_host_port(first, port)).await;
            for ip in rest {
                if result.is_ok() {
                    break;
                }
                result = self.dialer.dial_context(network, &join_host_port(ip, port)).await;
            }
            result
        })
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections();
        self.resolver.close_idle_connections();
    }
}

/// Logs every dial attempt and its outcome.
#[derive(Debug)]
pub struct DialerLogger<D> {
    dialer: D,
}

impl<D: Dialer> DialerLogger<D> {
    pub fn new(dialer: D) -> Self {
        Self { dialer }
    }

    pub fn inner(&self) -> &D {
        &self.dialer
    }
}

impl<D: Dialer> Dialer for DialerLogger<D> {
    fn dial_context<'a>(&'a self, network: &'a str, address: &'a str) -> Dialing<'a> {
        Box::pin(async move {
            tracing::debug!(network, address, "dial...");
            let start = Instant::now();
            let result = self.dialer.dial_context(network, address).await;
            let elapsed = start.elapsed();
            match &result {
                Ok(_) => tracing::debug!(network, address, ?elapsed, "dial... ok"),
                Err(error) => tracing::debug!(network, address, ?elapsed, %error, "dial... failed"),
            }
            result
        })
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections();
    }
}

/// Classifies dial errors with operation `connect`.
#[derive(Debug)]
pub struct DialerErrWrapper<D> {
    dialer: D,
}

impl<D: Dialer> DialerErrWrapper<D> {
    pub fn new(dialer: D) -> Self {
        Self { dialer }
    }

    pub fn inner(&self) -> &D {
        &self.dialer
    }
}

impl<D: Dialer> Dialer for DialerErrWrapper<D> {
    fn dial_context<'a>(&'a self, network: &'a str, address: &'a str) -> Dialing<'a> {
        Box::pin(async move {
            self.dialer
                .dial_context(network, address)
                .await
                .wrap_err(Operation::Connect)
        })
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections();
    }
}

/// Hands out one pre-established connection exactly once.
///
/// Every later call, concurrent ones included, fails with
/// [`NetError::NoConnReuse`].
#[derive(Debug)]
pub struct SingleUseDialer {
    conn: Mutex<Option<BoxedSocket>>,
}

impl SingleUseDialer {
    pub fn new(conn: BoxedSocket) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }
}

impl Dialer for SingleUseDialer {
    fn dial_context<'a>(&'a self, _network: &'a str, _address: &'a str) -> Dialing<'a> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        Box::pin(std::future::ready(conn.ok_or(NetError::NoConnReuse)))
    }

    fn close_idle_connections(&self) {}
}

/// The dialer chain built by [`new_dialer_with_resolver`].
pub type StdDialer<R> = DialerLogger<DialerResolver<DialerLogger<DialerErrWrapper<TcpDialer>>, R>>;

/// Builds the standard stream dialer that resolves names with `resolver`.
pub fn new_dialer_with_resolver<R: Resolver>(resolver: R) -> StdDialer<R> {
    DialerLogger::new(DialerResolver::new(
        DialerLogger::new(DialerErrWrapper::new(TcpDialer::new())),
        resolver,
    ))
}

/// Builds the standard stream dialer for IP endpoints only.
///
/// Dialing a domain name fails with [`NetError::NoResolver`].
pub fn new_dialer_without_resolver() -> StdDialer<NullResolver> {
    new_dialer_with_resolver(NullResolver)
}
