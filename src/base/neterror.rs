use crate::base::errwrap::ErrWrapper;
use crate::base::failure::Failure;
use std::io;
use thiserror::Error;

/// Errors produced anywhere in the resolver and dialer stacks.
///
/// Transports, codecs and concrete dialers return the untranslated variants.
/// Only the error-wrapping decorators produce [`NetError::Wrapped`], which
/// carries the classified [`Failure`] and the logical operation.
#[derive(Debug, Error)]
pub enum NetError {
    // DNS Errors
    #[error("no such host")]
    DnsNoSuchHost,
    #[error("server misbehaving")]
    DnsServerTemporarilyMisbehaving,
    #[error("server misbehaving")]
    DnsServerMisbehaving,
    #[error("no answer from DNS server")]
    DnsNoAnswer,
    #[error("query too long")]
    QueryTooLong,

    // Composition Errors
    #[error("no configured resolver")]
    NoResolver,
    #[error("dialer: connection reuse not allowed")]
    NoConnReuse,

    // Address Errors
    #[error("invalid IP address")]
    InvalidIp,
    #[error("address {0}: missing port in address")]
    MissingPort(String),
    #[error("address {0}: no suitable address found")]
    NoAddress(String),
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("unsupported network {0:?}")]
    UnsupportedNetwork(String),
    #[error("idna: {0}")]
    Idna(String),
    #[error("invalid URL {0:?}")]
    InvalidUrl(String),

    // Deadline Errors
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    #[error("context canceled")]
    Canceled,

    // Library Errors
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("dns: {0}")]
    Proto(#[from] hickory_proto::ProtoError),
    #[error("http: {0}")]
    Http(#[from] hyper::Error),
    #[error("http request: {0}")]
    HttpRequest(#[from] http::Error),
    #[error("tls: {0}")]
    Tls(String),
    #[error("quic: {0}")]
    QuicConnect(#[from] quinn::ConnectError),
    #[error("quic: {0}")]
    QuicConnection(#[from] quinn::ConnectionError),
    #[error("quic config: {0}")]
    QuicConfig(String),

    #[error(transparent)]
    Wrapped(#[from] ErrWrapper),
}

impl NetError {
    /// The classified failure, if this error went through an error-wrapping layer.
    pub fn failure(&self) -> Option<Failure> {
        match self {
            NetError::Wrapped(w) => Some(w.failure()),
            _ => None,
        }
    }

    /// Returns true for errors caused by the caller's deadline or cancellation.
    pub fn is_deadline(&self) -> bool {
        match self {
            NetError::DeadlineExceeded | NetError::Canceled => true,
            NetError::Wrapped(w) => w.source_error().is_deadline(),
            _ => false,
        }
    }
}

impl From<tokio::time::error::Elapsed> for NetError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        NetError::DeadlineExceeded
    }
}

impl From<tokio::task::JoinError> for NetError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            NetError::Canceled
        } else {
            NetError::Io(io::Error::other(e.to_string()))
        }
    }
}

impl From<rustls::Error> for NetError {
    fn from(e: rustls::Error) -> Self {
        NetError::Tls(e.to_string())
    }
}
