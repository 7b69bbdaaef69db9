//! Resolver decorators and the factories that compose them.
//!
//! [`wrap_resolver`] puts any resolver behind the standard chain: IDNA
//! conversion, logging, IP short-circuit and error classification, outermost
//! first.

use crate::base::addr::is_ip_addr;
use crate::base::context::NetResultExt;
use crate::base::errwrap::Operation;
use crate::base::neterror::NetError;
use crate::dns::generic::GenericResolver;
use crate::dns::resolve::{Resolver, Resolving};
use crate::dns::system::SystemResolver;
use crate::dns::transport::{DnsTransport, HttpsTransport, HyperClient, TcpTransport, UdpTransport};
use crate::socket::dialer::{new_dialer_with_resolver, Dialer};
use crate::socket::tls::{TlsDialer, TlsOptions};
use std::time::Instant;

macro_rules! forward_resolver_info {
    () => {
        fn network(&self) -> &str {
            self.resolver.network()
        }

        fn address(&self) -> &str {
            self.resolver.address()
        }

        fn close_idle_connections(&self) {
            self.resolver.close_idle_connections();
        }
    };
}

/// Converts internationalized names to their ASCII (punycode) form.
///
/// A name IDNA rejects fails with [`NetError::Idna`] before the inner
/// resolver sees it.
#[derive(Debug)]
pub struct ResolverIdna<R> {
    resolver: R,
}

impl<R: Resolver> ResolverIdna<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    pub fn inner(&self) -> &R {
        &self.resolver
    }
}

impl<R: Resolver> Resolver for ResolverIdna<R> {
    fn lookup_host<'a>(&'a self, hostname: &'a str) -> Resolving<'a> {
        Box::pin(async move {
            if is_ip_addr(hostname) {
                return self.resolver.lookup_host(hostname).await;
            }
            let ascii =
                idna::domain_to_ascii(hostname).map_err(|e| NetError::Idna(e.to_string()))?;
            self.resolver.lookup_host(&ascii).await
        })
    }

    forward_resolver_info!();
}

/// Logs every lookup and its outcome.
#[derive(Debug)]
pub struct ResolverLogger<R> {
    resolver: R,
}

impl<R: Resolver> ResolverLogger<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    pub fn inner(&self) -> &R {
        &self.resolver
    }
}

impl<R: Resolver> Resolver for ResolverLogger<R> {
    fn lookup_host<'a>(&'a self, hostname: &'a str) -> Resolving<'a> {
        Box::pin(async move {
            let network = self.resolver.network();
            let address = self.resolver.address();
            tracing::debug!(hostname, network, address, "resolve...");
            let start = Instant::now();
            let result = self.resolver.lookup_host(hostname).await;
            let elapsed = start.elapsed();
            match &result {
                Ok(addrs) => tracing::debug!(hostname, network, address, ?addrs, ?elapsed, "resolve... ok"),
                Err(error) => {
                    tracing::debug!(hostname, network, address, %error, ?elapsed, "resolve... failed")
                }
            }
            result
        })
    }

    forward_resolver_info!();
}

/// Answers IP literals with themselves without touching the network.
#[derive(Debug)]
pub struct ResolverShortCircuitIp<R> {
    resolver: R,
}

impl<R: Resolver> ResolverShortCircuitIp<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    pub fn inner(&self) -> &R {
        &self.resolver
    }
}

impl<R: Resolver> Resolver for ResolverShortCircuitIp<R> {
    fn lookup_host<'a>(&'a self, hostname: &'a str) -> Resolving<'a> {
        if is_ip_addr(hostname) {
            return Box::pin(std::future::ready(Ok(vec![hostname.to_string()])));
        }
        self.resolver.lookup_host(hostname)
    }

    forward_resolver_info!();
}

/// Classifies lookup errors with operation `resolve`.
#[derive(Debug)]
pub struct ResolverErrWrapper<R> {
    resolver: R,
}

impl<R: Resolver> ResolverErrWrapper<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    pub fn inner(&self) -> &R {
        &self.resolver
    }
}

impl<R: Resolver> Resolver for ResolverErrWrapper<R> {
    fn lookup_host<'a>(&'a self, hostname: &'a str) -> Resolving<'a> {
        Box::pin(async move {
            self.resolver
                .lookup_host(hostname)
                .await
                .wrap_err(Operation::Resolve)
        })
    }

    forward_resolver_info!();
}

/// A resolver behind the standard decorator chain.
pub type WrappedResolver<R> =
    ResolverIdna<ResolverLogger<ResolverShortCircuitIp<ResolverErrWrapper<R>>>>;

/// Puts `resolver` behind IDNA, logging, IP short-circuit and error wrapping.
pub fn wrap_resolver<R: Resolver>(resolver: R) -> WrappedResolver<R> {
    ResolverIdna::new(ResolverLogger::new(ResolverShortCircuitIp::new(
        ResolverErrWrapper::new(resolver),
    )))
}

/// The host's own resolver.
pub fn new_resolver_system() -> WrappedResolver<SystemResolver> {
    wrap_resolver(SystemResolver::new())
}

/// DNS over UDP to `address` (`ip:port` or `host:port`). Server names are
/// resolved with the system resolver.
pub fn new_resolver_udp(address: impl Into<String>) -> WrappedResolver<GenericResolver<UdpTransport>> {
    new_resolver_with_transport(UdpTransport::new(address))
}

/// DNS over TCP to `address`, dialing with `dialer`.
pub fn new_resolver_tcp<D: Dialer + 'static>(
    dialer: D,
    address: impl Into<String>,
) -> WrappedResolver<GenericResolver<TcpTransport>> {
    new_resolver_with_transport(TcpTransport::new_tcp(dialer, address))
}

/// DNS over TLS to `address` (`host:853`). Server names are resolved with
/// the system resolver.
pub fn new_resolver_tls(address: impl Into<String>) -> WrappedResolver<GenericResolver<TcpTransport>> {
    new_resolver_with_transport(TcpTransport::new_tls_with_resolver(
        new_resolver_system(),
        address,
    ))
}

/// DNS over HTTPS to `url`, one HTTP/1.1 connection per query.
pub fn new_resolver_https(url: impl Into<String>) -> WrappedResolver<GenericResolver<HttpsTransport>> {
    let dialer = TlsDialer::new(
        new_dialer_with_resolver(new_resolver_system()),
        TlsOptions::https(),
    );
    new_resolver_with_transport(HttpsTransport::new(HyperClient::new(dialer), url))
}

/// Any transport behind the dual-query resolver and the standard chain.
pub fn new_resolver_with_transport<T: DnsTransport>(
    transport: T,
) -> WrappedResolver<GenericResolver<T>> {
    wrap_resolver(GenericResolver::new(transport))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::failure::Failure;
    use crate::dns::resolve::tests::MockResolver;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_idna_converts_to_punycode() {
        let resolver = ResolverIdna::new(MockResolver::answering(&["192.0.2.1"]));
        resolver.lookup_host("яндекс.рф").await.unwrap();
        assert_eq!(
            resolver.inner().last_hostname.lock().unwrap().as_deref(),
            Some("xn--d1acpjx3f.xn--p1ai")
        );
    }

    #[tokio::test]
    async fn test_idna_rejects_invalid_names() {
        let resolver = ResolverIdna::new(MockResolver::answering(&["192.0.2.1"]));
        let err = resolver.lookup_host("xn--a.xn--nxa").await.unwrap_err();
        assert!(matches!(err, NetError::Idna(_)));
        assert_eq!(resolver.inner().lookups(), 0);
    }

    #[tokio::test]
    async fn test_short_circuit_ip() {
        let resolver = ResolverShortCircuitIp::new(MockResolver::answering(&["192.0.2.1"]));
        assert_eq!(resolver.lookup_host("8.8.8.8").await.unwrap(), vec!["8.8.8.8"]);
        assert_eq!(resolver.lookup_host("::1").await.unwrap(), vec!["::1"]);
        assert_eq!(resolver.inner().lookups(), 0);

        assert_eq!(resolver.lookup_host("dns.google").await.unwrap(), vec!["192.0.2.1"]);
        assert_eq!(resolver.inner().lookups(), 1);
    }

    #[tokio::test]
    async fn test_err_wrapper_classifies() {
        let resolver = ResolverErrWrapper::new(MockResolver::failing(NetError::DnsNoSuchHost));
        let err = resolver.lookup_host("nx.example").await.unwrap_err();
        assert_eq!(err.failure(), Some(Failure::DnsNxdomainError));
        assert_eq!(err.to_string(), "dns_nxdomain_error");
    }

    #[tokio::test]
    async fn test_logger_leaves_result_untouched() {
        let resolver = ResolverLogger::new(MockResolver::failing(NetError::DnsNoAnswer));
        assert!(matches!(
            resolver.lookup_host("example.com").await,
            Err(NetError::DnsNoAnswer)
        ));
    }

    #[tokio::test]
    async fn test_wrapped_chain() {
        let resolver = wrap_resolver(MockResolver::failing(NetError::DnsNoSuchHost));
        let err = resolver.lookup_host("nx.example").await.unwrap_err();
        assert_eq!(err.failure(), Some(Failure::DnsNxdomainError));

        // IP literals never reach the inner resolver.
        assert_eq!(resolver.lookup_host("1.1.1.1").await.unwrap(), vec!["1.1.1.1"]);
        let mock = resolver.inner().inner().inner().inner();
        assert_eq!(mock.lookups(), 1);

        assert_eq!(resolver.network(), "mock");
        assert_eq!(resolver.address(), "mock.example:53");
        resolver.close_idle_connections();
        assert_eq!(mock.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factory_tags() {
        let udp = new_resolver_udp("8.8.8.8:53");
        assert_eq!((udp.network(), udp.address()), ("udp", "8.8.8.8:53"));

        let tls = new_resolver_tls("1.1.1.1:853");
        assert_eq!((tls.network(), tls.address()), ("dot", "1.1.1.1:853"));

        let https = new_resolver_https("https://dns.google/dns-query");
        assert_eq!(
            (https.network(), https.address()),
            ("doh", "https://dns.google/dns-query")
        );

        let system = new_resolver_system();
        assert_eq!((system.network(), system.address()), ("system", ""));
    }
}
