//! QUIC dialing.
//!
//! Provides a quinn-based dialer for IP endpoints and the decorators that
//! add name resolution, logging and error classification on top of it.
//! TLS defaults (webpki roots, ALPN by port) are applied per dial on a copy
//! of the caller's configuration.
//!
//! # Example
//! ```ignore
//! use probenet::dns::new_resolver_system;
//! use probenet::quic::{new_quic_dialer_with_resolver, QuicConfig, QuicDialer, QuicTlsConfig, UdpListener};
//!
//! let dialer = new_quic_dialer_with_resolver(UdpListener, new_resolver_system());
//! let session = dialer
//!     .dial_context("udp", "dns.adguard.com:853", &QuicTlsConfig::new(), &QuicConfig::new())
//!     .await?;
//! ```

mod config;
mod dialer;
mod listener;
mod tls;
mod wrap;

pub use config::QuicConfig;
pub use dialer::{QuicDialer, QuicDialing, QuinnDialer};
pub use listener::{QuicListener, QuicListenerErrWrapper, UdpListener, UdpSocketErrWrapper};
pub use tls::{apply_tls_defaults, default_root_store, QuicTlsConfig};
pub use wrap::{
    new_quic_dialer_with_resolver, new_quic_dialer_without_resolver, QuicDialerErrWrapper,
    QuicDialerLogger, QuicDialerResolver, QuicSingleUseDialer, StdQuicDialer,
};
