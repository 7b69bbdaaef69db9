//! Core DNS resolution types and traits.
//!
//! This module defines the `Resolver` trait that every concrete resolver and
//! every resolver decorator implements, plus the null resolver.

use crate::base::neterror::NetError;
use std::{future::Future, pin::Pin, sync::Arc};

/// Alias for the `Future` type returned by a DNS resolver.
pub type Resolving<'a> = Pin<Box<dyn Future<Output = Result<Vec<String>, NetError>> + Send + 'a>>;

/// Trait for hostname resolution.
///
/// Implementations must be thread-safe. A successful lookup never returns an
/// empty list; "nothing found" is an error. Dropping the returned future
/// cancels the lookup.
pub trait Resolver: Send + Sync {
    /// Resolves `hostname` into IP address strings.
    fn lookup_host<'a>(&'a self, hostname: &'a str) -> Resolving<'a>;

    /// Kind tag: `system`, `null`, `udp`, `tcp`, `dot` or `doh`.
    fn network(&self) -> &str;

    /// Upstream endpoint, empty for `system` and `null`.
    fn address(&self) -> &str;

    /// Closes persistent connections that are not in use. Never blocks.
    fn close_idle_connections(&self);
}

/// Blanket implementation for Arc-wrapped resolvers.
impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    fn lookup_host<'a>(&'a self, hostname: &'a str) -> Resolving<'a> {
        (**self).lookup_host(hostname)
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

impl<R: Resolver + ?Sized> Resolver for Box<R> {
    fn lookup_host<'a>(&'a self, hostname: &'a str) -> Resolving<'a> {
        (**self).lookup_host(hostname)
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

/// A resolver that fails every lookup with [`NetError::NoResolver`].
///
/// Plugged into dialers that must only ever dial IP endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl Resolver for NullResolver {
    fn lookup_host<'a>(&'a self, _hostname: &'a str) -> Resolving<'a> {
        Box::pin(std::future::ready(Err(NetError::NoResolver)))
    }

    fn network(&self) -> &str {
        "null"
    }

    fn address(&self) -> &str {
        ""
    }

    fn close_idle_connections(&self) {}
}
