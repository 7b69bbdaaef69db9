//! DNS resolution.
//!
//! Provides composable resolvers that turn a hostname into IP addresses:
//! - System resolver (getaddrinfo on the blocking pool, bounded by a timeout)
//! - Dual-query A/AAAA resolver over UDP, TCP, TLS or HTTPS transports
//! - Decorators for IDNA, logging, IP short-circuit and error classification
//!
//! # Example
//!
//! ```rust,ignore
//! use probenet::dns::{new_resolver_udp, Resolver};
//!
//! let resolver = new_resolver_udp("8.8.8.8:53");
//! let addrs = resolver.lookup_host("example.com").await?;
//! for addr in addrs {
//!     println!("Resolved: {}", addr);
//! }
//! ```

pub mod codec;
mod generic;
pub(crate) mod resolve;
mod system;
pub mod transport;
mod wrap;

pub use codec::{DnsCodec, HickoryCodec, QueryType};
pub use generic::GenericResolver;
pub use resolve::{NullResolver, Resolver, Resolving};
pub use system::{LookupFn, SystemResolver};
pub use transport::DnsTransport;
pub use wrap::{
    new_resolver_https, new_resolver_system, new_resolver_tcp, new_resolver_tls,
    new_resolver_udp, new_resolver_with_transport, wrap_resolver, ResolverErrWrapper,
    ResolverIdna, ResolverLogger, ResolverShortCircuitIp, WrappedResolver,
};
