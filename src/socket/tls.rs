//! TLS over any stream dialer, backed by BoringSSL.
//!
//! Used as the default dial function of the DNS-over-TLS transport and of the
//! DNS-over-HTTPS client.

use crate::base::addr::split_host_port;
use crate::base::context::NetResultExt;
use crate::base::errwrap::Operation;
use crate::base::neterror::NetError;
use crate::socket::dialer::{Dialer, Dialing};
use crate::socket::stream::BoxedSocket;
use boring::ssl::{SslConnector, SslConnectorBuilder, SslMethod, SslVerifyMode, SslVersion};

/// Client-side TLS options.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    pub min_version: Option<SslVersion>,
    pub max_version: Option<SslVersion>,
    pub alpn_protos: Vec<String>,
    /// Overrides the SNI and verification name, which otherwise is the host
    /// part of the dialed address.
    pub server_name: Option<String>,
    pub verify_peer: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            min_version: Some(SslVersion::TLS1_2),
            max_version: Some(SslVersion::TLS1_3),
            alpn_protos: Vec::new(),
            server_name: None,
            verify_peer: true,
        }
    }
}

impl TlsOptions {
    /// Options for DNS-over-TLS (RFC 7858).
    pub fn dot() -> Self {
        Self::default().with_alpn(["dot"])
    }

    /// Options for DNS-over-HTTPS through an HTTP/1.1 client.
    pub fn https() -> Self {
        Self::default().with_alpn(["http/1.1"])
    }

    pub fn with_alpn<I, S>(mut self, protos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alpn_protos = protos.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    pub fn with_verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Apply these options to an SSL connector builder.
    pub fn apply_to_builder(&self, builder: &mut SslConnectorBuilder) -> Result<(), NetError> {
        builder.set_min_proto_version(self.min_version).map_err(tls_error)?;
        builder.set_max_proto_version(self.max_version).map_err(tls_error)?;

        if !self.alpn_protos.is_empty() {
            builder
                .set_alpn_protos(&self.alpn_wire()?)
                .map_err(tls_error)?;
        }

        if self.verify_peer {
            builder.set_verify(SslVerifyMode::PEER);
        } else {
            builder.set_verify(SslVerifyMode::NONE);
        }
        Ok(())
    }

    /// ALPN protocol list in wire format (length-prefixed names).
    pub fn alpn_wire(&self) -> Result<Vec<u8>, NetError> {
        let mut wire = Vec::new();
        for proto in &self.alpn_protos {
            if proto.is_empty() || proto.len() > 255 {
                return Err(NetError::Tls(format!("invalid ALPN protocol {:?}", proto)));
            }
            wire.push(proto.len() as u8);
            wire.extend_from_slice(proto.as_bytes());
        }
        Ok(wire)
    }

    /// Check if SNI (Server Name Indication) should be set for this host.
    /// Per RFC 6066, SNI MUST NOT be set for raw IP addresses.
    pub fn should_set_sni(host: &str) -> bool {
        host.parse::<std::net::IpAddr>().is_err()
    }
}

fn tls_error(e: boring::error::ErrorStack) -> NetError {
    NetError::Tls(e.to_string())
}

/// Dials a stream with the inner dialer and performs a TLS handshake on it.
///
/// Handshake errors are classified with operation `tls_handshake`; errors of
/// the inner dialer are returned as they are.
#[derive(Debug)]
pub struct TlsDialer<D> {
    dialer: D,
    options: TlsOptions,
}

impl<D: Dialer> TlsDialer<D> {
    pub fn new(dialer: D, options: TlsOptions) -> Self {
        Self { dialer, options }
    }

    pub fn options(&self) -> &TlsOptions {
        &self.options
    }

    async fn handshake(&self, host: &str, stream: BoxedSocket) -> Result<BoxedSocket, NetError> {
        let mut builder = SslConnector::builder(SslMethod::tls()).map_err(tls_error)?;
        self.options.apply_to_builder(&mut builder)?;
        let mut config = builder.build().configure().map_err(tls_error)?;

        let server_name = self.options.server_name.as_deref().unwrap_or(host);
        config.set_use_server_name_indication(TlsOptions::should_set_sni(server_name));
        config.set_verify_hostname(self.options.verify_peer);

        let tls_stream = tokio_boring::connect(config, server_name, stream)
            .await
            .map_err(|e| NetError::Tls(e.to_string()))?;
        tracing::debug!(
            server_name,
            alpn = ?tls_stream.ssl().selected_alpn_protocol().map(String::from_utf8_lossy),
            "tls handshake done"
        );
        Ok(BoxedSocket::new(tls_stream))
    }
}

impl<D: Dialer> Dialer for TlsDialer<D> {
    fn dial_context<'a>(&'a self, network: &'a str, address: &'a str) -> Dialing<'a> {
        Box::pin(async move {
            let (host, _) = split_host_port(address)?;
            let stream = self.dialer.dial_context(network, address).await?;
            self.handshake(host, stream)
                .await
                .wrap_err(Operation::TlsHandshake)
        })
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections();
    }
}
