//! TLS settings for QUIC handshakes.
//!
//! QUIC always negotiates TLS 1.3. Unset fields are filled per destination
//! port by [`apply_tls_defaults`], which works on a copy so the caller's
//! configuration is never touched.

use crate::base::neterror::NetError;
use rustls::RootCertStore;
use std::sync::Arc;

/// TLS settings for a QUIC dial.
#[derive(Debug, Clone, Default)]
pub struct QuicTlsConfig {
    /// SNI and certificate name; the dialed host when unset
    pub server_name: Option<String>,
    /// Trust anchors; the webpki roots when unset
    pub root_store: Option<Arc<RootCertStore>>,
    /// ALPN protocols in preference order
    pub alpn_protocols: Vec<Vec<u8>>,
}

impl QuicTlsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn with_root_store(mut self, roots: Arc<RootCertStore>) -> Self {
        self.root_store = Some(roots);
        self
    }

    pub fn with_alpn(mut self, protocols: &[&str]) -> Self {
        self.alpn_protocols = protocols.iter().map(|p| p.as_bytes().to_vec()).collect();
        self
    }

    /// Builds the rustls client configuration (TLS 1.3 only, ring provider).
    ///
    /// Fails when no root store is set; run [`apply_tls_defaults`] first.
    pub fn client_config(&self) -> Result<rustls::ClientConfig, NetError> {
        let roots = self
            .root_store
            .clone()
            .ok_or_else(|| NetError::QuicConfig("no root certificate store".to_string()))?;
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = rustls::ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = self.alpn_protocols.clone();
        config.enable_early_data = true;
        Ok(config)
    }
}

/// The webpki (Mozilla) trust anchors.
pub fn default_root_store() -> Arc<RootCertStore> {
    Arc::new(RootCertStore::from_iter(
        webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
    ))
}

/// ALPN implied by the destination port: HTTP/3 on 443, DNS over QUIC on
/// 853 (`doq`, RFC 9250) and 8853 (draft `dq`).
fn default_alpn(port: &str) -> Option<&'static [u8]> {
    match port {
        "443" => Some(b"h3"),
        "853" => Some(b"doq"),
        "8853" => Some(b"dq"),
        _ => None,
    }
}

/// Returns a copy of `config` with the root store and ALPN filled in when
/// unset. Explicit values are kept as they are.
pub fn apply_tls_defaults(config: &QuicTlsConfig, port: &str) -> QuicTlsConfig {
    let mut config = config.clone();
    if config.root_store.is_none() {
        config.root_store = Some(default_root_store());
    }
    if config.alpn_protocols.is_empty() {
        if let Some(alpn) = default_alpn(port) {
            config.alpn_protocols = vec![alpn.to_vec()];
        }
    }
    config
}
