//! QUIC connection configuration.

use crate::base::neterror::NetError;
use quinn::{EndpointConfig, IdleTimeout, TransportConfig, VarInt};
use std::time::Duration;

/// QUIC transport parameters used when dialing.
#[derive(Debug, Clone)]
pub struct QuicConfig {
    /// Maximum idle timeout
    pub idle_timeout: Duration,
    /// Initial RTT estimate
    pub initial_rtt: Duration,
    /// Maximum UDP payload size
    pub max_udp_payload_size: u16,
    /// Connection-level receive window
    pub initial_max_data: u64,
    /// Stream-level receive window
    pub initial_max_stream_data: u64,
    /// Bidirectional streams the peer may open
    pub initial_max_streams_bidi: u64,
    /// Unidirectional streams the peer may open
    pub initial_max_streams_uni: u64,
    /// Keep-alive interval, `None` disables keep-alives
    pub keep_alive_interval: Option<Duration>,
    /// Try 0-RTT before falling back to a full handshake
    pub enable_0rtt: bool,
}

impl Default for QuicConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            initial_rtt: Duration::from_millis(100),
            max_udp_payload_size: 1200,
            initial_max_data: 10 * 1024 * 1024,   // 10 MB
            initial_max_stream_data: 1024 * 1024, // 1 MB
            initial_max_streams_bidi: 100,
            initial_max_streams_uni: 100,
            keep_alive_interval: None,
            enable_0rtt: false,
        }
    }
}

fn varint(value: u64) -> Result<VarInt, NetError> {
    VarInt::from_u64(value).map_err(|e| NetError::QuicConfig(e.to_string()))
}

impl QuicConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn initial_rtt(mut self, rtt: Duration) -> Self {
        self.initial_rtt = rtt;
        self
    }

    pub fn max_udp_payload_size(mut self, size: u16) -> Self {
        self.max_udp_payload_size = size;
        self
    }

    pub fn initial_max_data(mut self, max: u64) -> Self {
        self.initial_max_data = max;
        self
    }

    pub fn initial_max_stream_data(mut self, max: u64) -> Self {
        self.initial_max_stream_data = max;
        self
    }

    pub fn initial_max_streams(mut self, bidi: u64, uni: u64) -> Self {
        self.initial_max_streams_bidi = bidi;
        self.initial_max_streams_uni = uni;
        self
    }

    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = Some(interval);
        self
    }

    /// Enable or disable 0-RTT.
    pub fn enable_0rtt(mut self, enable: bool) -> Self {
        self.enable_0rtt = enable;
        self
    }

    /// Builds the quinn transport parameters.
    ///
    /// Values quinn cannot encode fail with [`NetError::QuicConfig`].
    pub fn transport_config(&self) -> Result<TransportConfig, NetError> {
        let idle = IdleTimeout::try_from(self.idle_timeout)
            .map_err(|e| NetError::QuicConfig(e.to_string()))?;
        let mut config = TransportConfig::default();
        config
            .max_idle_timeout(Some(idle))
            .initial_rtt(self.initial_rtt)
            .initial_mtu(self.max_udp_payload_size)
            .receive_window(varint(self.initial_max_data)?)
            .stream_receive_window(varint(self.initial_max_stream_data)?)
            .max_concurrent_bidi_streams(varint(self.initial_max_streams_bidi)?)
            .max_concurrent_uni_streams(varint(self.initial_max_streams_uni)?)
            .keep_alive_interval(self.keep_alive_interval);
        Ok(config)
    }

    /// Builds the endpoint configuration carrying the UDP payload limit.
    pub fn endpoint_config(&self) -> Result<EndpointConfig, NetError> {
        let mut config = EndpointConfig::default();
        config
            .max_udp_payload_size(self.max_udp_payload_size)
            .map_err(|e| NetError::QuicConfig(e.to_string()))?;
        Ok(config)
    }
}
