//! DNS transports.
//!
//! A transport moves one encoded query to an upstream server and returns the
//! raw reply. Transports never classify their errors.
//!
//! - [`UdpTransport`]: one datagram out, one datagram back
//! - [`TcpTransport`]: a persistent, serialized TCP or TLS stream
//! - [`HttpsTransport`]: DNS-over-HTTPS `POST` requests

mod https;
mod tcp;
mod udp;

pub use https::{HttpClient, HttpsTransport, HyperClient, Responding};
pub use tcp::TcpTransport;
pub use udp::{UdpDialFn, UdpTransport};

use crate::base::neterror::NetError;
use std::{future::Future, pin::Pin, sync::Arc};

/// Alias for the `Future` type returned by a transport round trip.
pub type RoundTrip<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, NetError>> + Send + 'a>>;

/// Trait for DNS transports.
pub trait DnsTransport: Send + Sync {
    /// Sends `query` and returns the reply bytes.
    fn round_trip<'a>(&'a self, query: &'a [u8]) -> RoundTrip<'a>;

    /// Whether queries over this transport should be padded.
    fn requires_padding(&self) -> bool;

    /// Kind tag: `udp`, `tcp`, `dot` or `doh`.
    fn network(&self) -> &str;

    /// Upstream endpoint or URL.
    fn address(&self) -> &str;

    fn close_idle_connections(&self);
}

impl<T: DnsTransport + ?Sized> DnsTransport for Arc<T> {
    fn round_trip<'a>(&'a self, query: &'a [u8]) -> RoundTrip<'a> {
        (**self).round_trip(query)
    }

    fn requires_padding(&self) -> bool {
        (**self).requires_padding()
    }

    fn network(&self) -> &str {
        (**self).network()
    }

    fn address(&self) -> &str {
        (**self).address()
    }

    fn close_idle_connections(&self) {
        (**self).close_idle_connections()
    }
}

impl<T: DnsTransport + ?Sized> DnsTransport for Box<T> {
    fn round_trip<'a>(&'a self, query: &'a [u8]) -> RoundTrip<'a> {
        (**self).round_trip(query)
    }

    fn requires_padding(&self) -> bool {
        (**self).requires_padding()
    }

    fn network(&self) -> &str {
        (**self).network()
    }

    fn address(&self) -> &str {
        (**self).address()
    }

    fn close_idle_connections(&self) {
        (**self).close_idle_connections()
    }
}
