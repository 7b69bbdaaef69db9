//! # probenet
//!
//! DNS resolution and connection dialing for network measurement probes.
//!
//! Every failure is classified into a stable, serializable [`Failure`]
//! string tagged with the [`Operation`] that produced it, so measurements
//! from different hosts and transports can be compared.
//!
//! ## Features
//!
//! - **Resolvers**: system (`getaddrinfo`), DNS over UDP, TCP, TLS and HTTPS
//! - **Dual-stack lookups**: A and AAAA queries in parallel
//! - **EDNS0 padding** on encrypted transports
//! - **Decorator chains**: IDNA, logging, IP short-circuit, error wrapping
//! - **Dialers**: TCP, TLS (BoringSSL) and QUIC (quinn), resolver-backed
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use probenet::dns::{new_resolver_https, Resolver};
//!
//! #[tokio::main]
//! async fn main() {
//!     let resolver = new_resolver_https("https://dns.google/dns-query");
//!     match resolver.lookup_host("example.com").await {
//!         Ok(addrs) => println!("{addrs:?}"),
//!         Err(err) => println!("failure: {err}"),
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error types, failure classification and address helpers
//! - [`dns`] - Resolvers, codecs and DNS transports
//! - [`socket`] - Stream dialers and TLS
//! - [`quic`] - QUIC dialers

pub mod base;
pub mod dns;
pub mod quic;
pub mod socket;

pub use base::{classify, ErrWrapper, Failure, NetError, Operation};
