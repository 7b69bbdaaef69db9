//! QUIC dialer decorators and the factories that compose them.
//!
//! These mirror the stream dialer chain in [`crate::socket::dialer`]:
//! logging, resolver-backed iteration over the addresses, then per-attempt
//! logging and error classification around [`QuinnDialer`].

use crate::base::addr::{is_ip_addr, join_host_port, split_host_port};
use crate::base::context::NetResultExt;
use crate::base::errwrap::Operation;
use crate::base::neterror::NetError;
use crate::dns::resolve::{NullResolver, Resolver};
use crate::quic::config::QuicConfig;
use crate::quic::dialer::{QuicDialer, QuicDialing, QuinnDialer};
use crate::quic::listener::{QuicListener, QuicListenerErrWrapper};
use crate::quic::tls::QuicTlsConfig;
use std::sync::Mutex;
use std::time::Instant;

/// Resolves the host part of the address, then tries each address in order.
///
/// The hostname becomes the TLS server name unless one is set already; the
/// caller's configuration is left untouched.
#[derive(Debug)]
pub struct QuicDialerResolver<D, R> {
    dialer: D,
    resolver: R,
}

impl<D: QuicDialer, R: Resolver> QuicDialerResolver<D, R> {
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

impl<D: QuicDialer, R: Resolver> QuicDialer for QuicDialerResolver<D, R> {
    type Session = D::Session;

    fn dial_context<'a>(
        &'a self,
        network: &'a str,
        address: &'a str,
        tls: &'a QuicTlsConfig,
        quic: &'a QuicConfig,
    ) -> QuicDialing<'a, D::Session> {
        Box::pin(async move {
            let (host, port) = split_host_port(address)?;
            let addrs = self.lookup_host(host).await?;
            let mut tls = tls.clone();
            if tls.server_name.is_none() {
                tls.server_name = Some(host.to_string());
            }
            let Some((first, rest)) = addrs.split_first() else {
                return Err(NetError::DnsNoAnswer);
            };
            let mut result = self
                .dialer
                .dial_context(network, &join_host_port(first, port), &tls, quic)
                .await;
            for ip in rest {
                if result.is_ok() {
                    break;
                }
                result = self
                    .dialer
                    .dial_context(network, &join_host_port(ip, port), &tls, quic)
                    .await;
            }
            result
        })
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections();
        self.resolver.close_idle_connections();
    }
}

/// Logs every QUIC dial and its outcome.
#[derive(Debug)]
pub struct QuicDialerLogger<D> {
    dialer: D,
}

impl<D: QuicDialer> QuicDialerLogger<D> {
    pub fn new(dialer: D) -> Self {
        Self { dialer }
    }

    pub fn inner(&self) -> &D {
        &self.dialer
    }
}

impl<D: QuicDialer> QuicDialer for QuicDialerLogger<D> {
    type Session = D::Session;

    fn dial_context<'a>(
        &'a self,
        network: &'a str,
        address: &'a str,
        tls: &'a QuicTlsConfig,
        quic: &'a QuicConfig,
    ) -> QuicDialing<'a, D::Session> {
        Box::pin(async move {
            let server_name = tls.server_name.as_deref().unwrap_or_default();
            tracing::debug!(network, address, server_name, "quic_dial...");
            let start = Instant::now();
            let result = self.dialer.dial_context(network, address, tls, quic).await;
            let elapsed = start.elapsed();
            match &result {
                Ok(_) => tracing::debug!(network, address, server_name, ?elapsed, "quic_dial... ok"),
                Err(error) => {
                    tracing::debug!(network, address, server_name, ?elapsed, %error, "quic_dial... failed")
                }
            }
            result
        })
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections();
    }
}

/// Classifies dial errors with operation `quic_handshake`.
#[derive(Debug)]
pub struct QuicDialerErrWrapper<D> {
    dialer: D,
}

impl<D: QuicDialer> QuicDialerErrWrapper<D> {
    pub fn new(dialer: D) -> Self {
        Self { dialer }
    }

    pub fn inner(&self) -> &D {
        &self.dialer
    }
}

impl<D: QuicDialer> QuicDialer for QuicDialerErrWrapper<D> {
    type Session = D::Session;

    fn dial_context<'a>(
        &'a self,
        network: &'a str,
        address: &'a str,
        tls: &'a QuicTlsConfig,
        quic: &'a QuicConfig,
    ) -> QuicDialing<'a, D::Session> {
        Box::pin(async move {
            self.dialer
                .dial_context(network, address, tls, quic)
                .await
                .wrap_err(Operation::QuicHandshake)
        })
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections();
    }
}

/// Hands out one pre-established session exactly once.
///
/// Every later call fails with [`NetError::NoConnReuse`].
#[derive(Debug)]
pub struct QuicSingleUseDialer<S> {
    session: Mutex<Option<S>>,
}

impl<S: Send + 'static> QuicSingleUseDialer<S> {
    pub fn new(session: S) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

impl<S: Send + 'static> QuicDialer for QuicSingleUseDialer<S> {
    type Session = S;

    fn dial_context<'a>(
        &'a self,
        _network: &'a str,
        _address: &'a str,
        _tls: &'a QuicTlsConfig,
        _quic: &'a QuicConfig,
    ) -> QuicDialing<'a, S> {
        let session = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        Box::pin(std::future::ready(session.ok_or(NetError::NoConnReuse)))
    }

    fn close_idle_connections(&self) {}
}

/// The QUIC dialer chain built by [`new_quic_dialer_with_resolver`].
pub type StdQuicDialer<L, R> = QuicDialerLogger<
    QuicDialerResolver<QuicDialerLogger<QuicDialerErrWrapper<QuinnDialer<QuicListenerErrWrapper<L>>>>, R>,
>;

/// Builds the standard QUIC dialer that resolves names with `resolver`.
pub fn new_quic_dialer_with_resolver<L: QuicListener, R: Resolver>(
    listener: L,
    resolver: R,
) -> StdQuicDialer<L, R> {
    QuicDialerLogger::new(QuicDialerResolver::new(
        QuicDialerLogger::new(QuicDialerErrWrapper::new(QuinnDialer::new(
            QuicListenerErrWrapper::new(listener),
        ))),
        resolver,
    ))
}

/// Builds the standard QUIC dialer for IP endpoints only.
///
/// Dialing a domain name fails with [`NetError::NoResolver`].
pub fn new_quic_dialer_without_resolver<L: QuicListener>(
    listener: L,
) -> StdQuicDialer<L, NullResolver> {
    new_quic_dialer_with_resolver(listener, NullResolver)
}
