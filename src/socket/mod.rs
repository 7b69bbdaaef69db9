//! Stream sockets and dialers.
//!
//! - [`dialer`]: TCP dialing plus the resolver, logging and error decorators
//! - [`stream`]: the type-erased stream handed out by dialers
//! - [`tls`]: TLS over any dialer with BoringSSL

pub mod dialer;
pub mod stream;
pub mod tls;

pub use dialer::{
    new_dialer_with_resolver, new_dialer_without_resolver, Dialer, DialerErrWrapper,
    DialerLogger, DialerResolver, Dialing, SingleUseDialer, StdDialer, TcpDialer,
};
pub use stream::{BoxedSocket, StreamSocket};
pub use tls::{TlsDialer, TlsOptions};
