use crate::base::neterror::NetError;
use crate::dns::codec::{DnsCodec, HickoryCodec, QueryType};
use crate::dns::resolve::{Resolver, Resolving};
use crate::dns::transport::DnsTransport;
use std::sync::Arc;

/// Resolves hostnames over any [`DnsTransport`] by asking for A and AAAA in
/// parallel.
///
/// If both queries fail the A error is returned. Otherwise the addresses are
/// A first, then AAAA; an empty union is [`NetError::DnsNoAnswer`].
pub struct GenericResolver<T> {
    transport: T,
    codec: Arc<dyn DnsCodec>,
    padding: Option<bool>,
}

impl<T: DnsTransport> GenericResolver<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            codec: Arc::new(HickoryCodec),
            padding: None,
        }
    }

    pub fn with_codec<C: DnsCodec + 'static>(mut self, codec: C) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Forces padding on or off instead of following the transport.
    pub fn with_padding(mut self, padding: bool) -> Self {
        self.padding = Some(padding);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn padding(&self) -> bool {
        self.padding
            .unwrap_or_else(|| self.transport.requires_padding())
    }

    async fn query(&self, hostname: &str, qtype: QueryType) -> Result<Vec<String>, NetError> {
        let query = self.codec.encode(hostname, qtype, self.padding())?;
        tracing::debug!(
            hostname,
            %qtype,
            network = self.transport.network(),
            size = query.len(),
            "dns query sent"
        );
        let reply = self.transport.round_trip(&query).await?;
        tracing::debug!(hostname, %qtype, size = reply.len(), "dns reply received");
        self.codec.decode(qtype, &reply)
    }

    async fn lookup(&self, hostname: &str) -> Result<Vec<String>, NetError> {
        let (a, aaaa) = tokio::join!(
            self.query(hostname, QueryType::A),
            self.query(hostname, QueryType::Aaaa)
        );
        let addrs = match (a, aaaa) {
            (Err(a_err), Err(_)) => return Err(a_err),
            (Ok(mut a), Ok(aaaa)) => {
                a.extend(aaaa);
                a
            }
            (Ok(a), Err(_)) => a,
            (Err(_), Ok(aaaa)) => aaaa,
        };
        if addrs.is_empty() {
            return Err(NetError::DnsNoAnswer);
        }
        Ok(addrs)
    }
}

impl<T> std::fmt::Debug for GenericResolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericResolver")
            .field("padding", &self.padding)
            .finish_non_exhaustive()
    }
}

impl<T: DnsTransport> Resolver for GenericResolver<T> {
    fn lookup_host<'a>(&'a self, hostname: &'a str) -> Resolving<'a> {
        Box::pin(self.lookup(hostname))
    }

    fn network(&self) -> &str {
        self.transport.network()
    }

    fn address(&self) -> &str {
        self.transport.address()
    }

    fn close_idle_connections(&self) {
        self.transport.close_idle_connections();
    }
}
