// Shared transport configuration for building reqwest::Client instances.
//
// Every consumer (discovery probes, pairing, command dispatch) shares one
// pooled client so consecutive requests to the same panel reuse the
// underlying connection instead of paying a fresh handshake each time.

use std::time::Duration;

/// Shared transport configuration for building HTTP clients.
///
/// Panels speak plain HTTP on a fixed well-known port, so there is no TLS
/// knob here -- only timeouts and pool behavior.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Overall per-request timeout. Callers that need tighter bounds
    /// (pairing races, dispatch) layer `tokio::time::timeout` on top.
    pub timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// How long idle pooled connections are kept alive.
    pub pool_idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(3),
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(self.pool_idle_timeout)
            .user_agent(concat!("panelkit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(crate::error::Error::Transport)
    }
}
