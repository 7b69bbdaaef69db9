//! Failure taxonomy and the classifier that maps raw errors onto it.
//!
//! The strings returned by [`Failure::as_str`] are stable: they end up in
//! measurement results and are compared by consumers.

use crate::base::neterror::NetError;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Closed set of failure kinds a classified error can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Failure {
    // DNS
    DnsNxdomainError,
    DnsServerMisbehaving,
    DnsServerTemporarilyMisbehaving,
    DnsNoAnswer,

    // Composition
    NoResolverConfigured,
    NoConnReuse,

    // Connection
    ConnectionRefused,
    ConnectionReset,
    ConnectionAborted,
    HostUnreachable,
    NetworkUnreachable,
    EofError,

    // Deadlines
    GenericTimeoutError,
    Interrupted,

    // Arguments
    InvalidAddress,
    InvalidArgument,

    // Handshakes
    SslFailedHandshake,
    QuicHandshakeFailed,

    UnknownFailure,
}

impl Failure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Failure::DnsNxdomainError => "dns_nxdomain_error",
            Failure::DnsServerMisbehaving => "dns_server_misbehaving",
            Failure::DnsServerTemporarilyMisbehaving => "dns_server_temporarily_misbehaving",
            Failure::DnsNoAnswer => "dns_no_answer",
            Failure::NoResolverConfigured => "no_resolver_configured",
            Failure::NoConnReuse => "no_conn_reuse",
            Failure::ConnectionRefused => "connection_refused",
            Failure::ConnectionReset => "connection_reset",
            Failure::ConnectionAborted => "connection_aborted",
            Failure::HostUnreachable => "host_unreachable",
            Failure::NetworkUnreachable => "network_unreachable",
            Failure::EofError => "eof_error",
            Failure::GenericTimeoutError => "generic_timeout_error",
            Failure::Interrupted => "interrupted",
            Failure::InvalidAddress => "invalid_address",
            Failure::InvalidArgument => "invalid_argument",
            Failure::SslFailedHandshake => "ssl_failed_handshake",
            Failure::QuicHandshakeFailed => "quic_handshake_failed",
            Failure::UnknownFailure => "unknown_failure",
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a raw error onto the failure taxonomy.
///
/// Errors that already went through an error-wrapping layer keep the failure
/// they were first classified with.
pub fn classify(err: &NetError) -> Failure {
    match err {
        NetError::Wrapped(w) => w.failure(),
        NetError::DnsNoSuchHost => Failure::DnsNxdomainError,
        NetError::DnsServerTemporarilyMisbehaving => Failure::DnsServerTemporarilyMisbehaving,
        NetError::DnsServerMisbehaving => Failure::DnsServerMisbehaving,
        NetError::DnsNoAnswer => Failure::DnsNoAnswer,
        NetError::NoResolver => Failure::NoResolverConfigured,
        NetError::NoConnReuse => Failure::NoConnReuse,
        NetError::InvalidIp
        | NetError::MissingPort(_)
        | NetError::InvalidPort(_)
        | NetError::NoAddress(_) => Failure::InvalidAddress,
        NetError::UnsupportedNetwork(_)
        | NetError::QueryTooLong
        | NetError::Idna(_)
        | NetError::InvalidUrl(_)
        | NetError::HttpRequest(_)
        | NetError::QuicConfig(_) => Failure::InvalidArgument,
        NetError::DeadlineExceeded => Failure::GenericTimeoutError,
        NetError::Canceled => Failure::Interrupted,
        NetError::Io(e) => classify_io(e),
        NetError::Proto(e) => classify_message(&e.to_string()).unwrap_or(Failure::UnknownFailure),
        NetError::Http(e) => classify_hyper(e),
        NetError::Tls(_) => Failure::SslFailedHandshake,
        NetError::QuicConnect(e) => classify_quic_connect(e),
        NetError::QuicConnection(e) => classify_quic_connection(e),
    }
}

fn classify_io(e: &io::Error) -> Failure {
    if let Some(inner) = e.get_ref().and_then(|i| i.downcast_ref::<NetError>()) {
        return classify(inner);
    }
    match e.kind() {
        io::ErrorKind::ConnectionRefused => Failure::ConnectionRefused,
        io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => Failure::ConnectionReset,
        io::ErrorKind::ConnectionAborted => Failure::ConnectionAborted,
        io::ErrorKind::HostUnreachable => Failure::HostUnreachable,
        io::ErrorKind::NetworkUnreachable => Failure::NetworkUnreachable,
        io::ErrorKind::TimedOut => Failure::GenericTimeoutError,
        io::ErrorKind::Interrupted => Failure::Interrupted,
        io::ErrorKind::UnexpectedEof => Failure::EofError,
        io::ErrorKind::InvalidInput => Failure::InvalidArgument,
        io::ErrorKind::AddrNotAvailable => Failure::InvalidAddress,
        _ => classify_message(&e.to_string()).unwrap_or(Failure::UnknownFailure),
    }
}

fn classify_hyper(e: &hyper::Error) -> Failure {
    if e.is_timeout() {
        return Failure::GenericTimeoutError;
    }
    if e.is_canceled() {
        return Failure::Interrupted;
    }
    if e.is_incomplete_message() {
        return Failure::EofError;
    }
    let mut source = e.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return classify_io(io_err);
        }
        source = cause.source();
    }
    Failure::UnknownFailure
}

fn classify_quic_connect(e: &quinn::ConnectError) -> Failure {
    match e {
        quinn::ConnectError::InvalidServerName(_) | quinn::ConnectError::InvalidRemoteAddress(_) => {
            Failure::InvalidAddress
        }
        _ => Failure::QuicHandshakeFailed,
    }
}

fn classify_quic_connection(e: &quinn::ConnectionError) -> Failure {
    match e {
        quinn::ConnectionError::TimedOut => Failure::GenericTimeoutError,
        quinn::ConnectionError::Reset => Failure::ConnectionReset,
        quinn::ConnectionError::LocallyClosed => Failure::Interrupted,
        _ => Failure::QuicHandshakeFailed,
    }
}

/// Matches the messages produced by the host resolver and by errors that
/// only carry text (e.g. `getaddrinfo` failures).
fn classify_message(msg: &str) -> Option<Failure> {
    let msg = msg.to_ascii_lowercase();
    let table: &[(&[&str], Failure)] = &[
        (
            &[
                "name or service not known",
                "nodename nor servname provided",
                "no address associated with hostname",
                "no such host",
                "no such host is known",
            ],
            Failure::DnsNxdomainError,
        ),
        (
            &["temporary failure in name resolution"],
            Failure::DnsServerTemporarilyMisbehaving,
        ),
        (&["server misbehaving"], Failure::DnsServerMisbehaving),
        (&["connection refused"], Failure::ConnectionRefused),
        (&["connection reset"], Failure::ConnectionReset),
        (&["network is unreachable"], Failure::NetworkUnreachable),
        (&["no route to host"], Failure::HostUnreachable),
        (
            &["timed out", "deadline exceeded", "timeout"],
            Failure::GenericTimeoutError,
        ),
        (
            &["operation was canceled", "context canceled"],
            Failure::Interrupted,
        ),
        (&["unexpected eof", "end of file"], Failure::EofError),
        (&["invalid argument"], Failure::InvalidArgument),
    ];
    table
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| msg.contains(n)))
        .map(|(_, failure)| *failure)
}
