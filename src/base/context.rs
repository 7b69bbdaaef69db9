//! Ergonomic error classification helpers.
//!
//! Provides an extension trait for `Result` types that classifies the error
//! and tags it with the failed operation.

use crate::base::errwrap::{wrap, Operation};
use crate::base::neterror::NetError;

/// Extension trait for classifying the error side of a `Result`.
pub trait NetResultExt<T> {
    /// Classify the error and record `operation` on it.
    ///
    /// # Example
    /// ```ignore
    /// use probenet::base::context::NetResultExt;
    /// use probenet::base::errwrap::Operation;
    ///
    /// let stream = TcpStream::connect(addr).await.wrap_err(Operation::Connect)?;
    /// // Error: "connection_refused"
    /// ```
    fn wrap_err(self, operation: Operation) -> Result<T, NetError>;
}

impl<T, E> NetResultExt<T> for Result<T, E>
where
    E: Into<NetError>,
{
    fn wrap_err(self, operation: Operation) -> Result<T, NetError> {
        self.map_err(|e| wrap(operation, e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::failure::Failure;
    use std::io::{self, Error, ErrorKind};

    #[test]
    fn test_wrap_io_error() {
        let result: Result<(), io::Error> =
            Err(Error::new(ErrorKind::ConnectionRefused, "refused"));
        let err = result.wrap_err(Operation::Connect).unwrap_err();

        match err {
            NetError::Wrapped(w) => {
                assert_eq!(w.failure(), Failure::ConnectionRefused);
                assert_eq!(w.operation(), Operation::Connect);
            }
            _ => panic!("Expected Wrapped"),
        }
    }

    #[test]
    fn test_wrap_keeps_first_operation() {
        let result: Result<(), NetError> = Err(NetError::DnsNoSuchHost);
        let err = result
            .wrap_err(Operation::Resolve)
            .wrap_err(Operation::Connect)
            .unwrap_err();

        assert_eq!(err.to_string(), "dns_nxdomain_error");
        match err {
            NetError::Wrapped(w) => assert_eq!(w.operation(), Operation::Resolve),
            _ => panic!("Expected Wrapped"),
        }
    }

    #[test]
    fn test_ok_passes_through() {
        let result: Result<u8, NetError> = Ok(7);
        assert_eq!(result.wrap_err(Operation::Resolve).unwrap(), 7);
    }
}
