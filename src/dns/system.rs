//! System DNS resolver using getaddrinfo.
//!
//! The lookup runs on its own task, raced against a timeout. `getaddrinfo`
//! cannot be interrupted, so a lookup that outlives the timeout (or whose
//! caller goes away) is abandoned and finishes in the background.

use crate::base::neterror::NetError;
use crate::dns::resolve::{Resolver, Resolving};
use futures::future::BoxFuture;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

/// The function performing the actual host lookup.
pub type LookupFn =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<Vec<String>, NetError>> + Send + Sync>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Resolver backed by the operating system.
#[derive(Clone)]
pub struct SystemResolver {
    timeout: Duration,
    lookup: LookupFn,
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            lookup: Arc::new(getaddrinfo),
        }
    }
}

impl std::fmt::Debug for SystemResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SystemResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces `getaddrinfo` with another lookup function.
    pub fn with_lookup_fn<F>(mut self, lookup: F) -> Self
    where
        F: Fn(String) -> BoxFuture<'static, Result<Vec<String>, NetError>> + Send + Sync + 'static,
    {
        self.lookup = Arc::new(lookup);
        self
    }
}

/// `getaddrinfo` on the blocking pool, de-duplicating the addresses.
fn getaddrinfo(hostname: String) -> BoxFuture<'static, Result<Vec<String>, NetError>> {
    Box::pin(async move {
        let addrs = tokio::task::spawn_blocking(move || {
            tracing::debug!(hostname = %hostname, "resolving via getaddrinfo");
            (hostname.as_str(), 0u16)
                .to_socket_addrs()
                .map(|iter| iter.collect::<Vec<_>>())
        })
        .await??;

        let mut ips: Vec<String> = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let ip = addr.ip().to_string();
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }
        if ips.is_empty() {
            return Err(NetError::DnsNoAnswer);
        }
        Ok(ips)
    })
}

impl Resolver for SystemResolver {
    fn lookup_host<'a>(&'a self, hostname: &'a str) -> Resolving<'a> {
        Box::pin(async move {
            let task = tokio::spawn((self.lookup)(hostname.to_string()));
            match tokio::time::timeout(self.timeout, task).await {
                Ok(joined) => joined?,
                Err(_) => {
                    tracing::debug!(hostname, timeout = ?self.timeout, "system lookup abandoned");
                    Err(NetError::DeadlineExceeded)
                }
            }
        })
    }

    fn network(&self) -> &str {
        "system"
    }

    fn address(&self) -> &str {
        ""
    }

    fn close_idle_connections(&self) {}
}
