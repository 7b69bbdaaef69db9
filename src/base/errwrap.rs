//! Classified errors.
//!
//! An [`ErrWrapper`] pairs the [`Failure`] computed by [`classify`] with the
//! logical [`Operation`] that failed and keeps the raw error as its source.

use crate::base::failure::{classify, Failure};
use crate::base::neterror::NetError;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;

/// The logical operation during which a classified error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Resolve,
    Connect,
    TlsHandshake,
    QuicListen,
    QuicHandshake,
    ReadFrom,
    WriteTo,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Resolve => "resolve",
            Operation::Connect => "connect",
            Operation::TlsHandshake => "tls_handshake",
            Operation::QuicListen => "quic_listen",
            Operation::QuicHandshake => "quic_handshake",
            Operation::ReadFrom => "read_from",
            Operation::WriteTo => "write_to",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw error together with its classification.
///
/// Displays as the failure string. Unknown failures also carry the raw
/// message so they stay debuggable.
#[derive(Debug)]
pub struct ErrWrapper {
    failure: Failure,
    operation: Operation,
    source: Box<NetError>,
}

impl ErrWrapper {
    /// Classifies `err` and records the operation it belongs to.
    pub fn new(operation: Operation, err: NetError) -> Self {
        Self {
            failure: classify(&err),
            operation,
            source: Box::new(err),
        }
    }

    pub fn failure(&self) -> Failure {
        self.failure
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The untranslated error.
    pub fn source_error(&self) -> &NetError {
        &self.source
    }

    pub fn into_source(self) -> NetError {
        *self.source
    }
}

impl fmt::Display for ErrWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failure {
            Failure::UnknownFailure => write!(f, "{}: {}", self.failure, self.source),
            failure => f.write_str(failure.as_str()),
        }
    }
}

impl StdError for ErrWrapper {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Wraps `err` for `operation` unless it is already wrapped.
///
/// An error that was classified deeper in a chain keeps its original failure
/// and operation.
pub fn wrap(operation: Operation, err: NetError) -> NetError {
    match err {
        NetError::Wrapped(w) => NetError::Wrapped(w),
        other => NetError::Wrapped(ErrWrapper::new(operation, other)),
    }
}
