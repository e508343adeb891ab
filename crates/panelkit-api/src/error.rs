use thiserror::Error;

/// Top-level error type for the `panelkit-api` crate.
///
/// Covers every failure mode of the device-facing surfaces: transport,
/// the unauthenticated pairing endpoints, the token-authenticated command
/// endpoints, and mDNS browsing. `panelkit-core` maps these into its
/// per-device failure taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Pairing surface ─────────────────────────────────────────────
    /// The device answered the token request but is not in pairing mode
    /// (401: pairing never opened; 403: on-device window already closed).
    #[error("Device is not in pairing mode (HTTP {status})")]
    NotInPairingMode { status: u16 },

    // ── Command surface ─────────────────────────────────────────────
    /// The auth token was rejected (expired, revoked, or never valid).
    #[error("Auth token rejected by device")]
    Unauthorized,

    /// Unexpected status from the device API.
    #[error("Device API error (HTTP {status})")]
    Api { status: u16 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Discovery ───────────────────────────────────────────────────
    /// mDNS daemon or browse failure.
    #[error("Service discovery error: {0}")]
    ServiceDiscovery(String),
}

impl Error {
    /// Returns `true` if the underlying transport timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// Returns `true` if the connection could not be established.
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_connect())
    }

    /// Returns `true` if the device never produced a response --
    /// timeout or connection failure, as opposed to a protocol-level reply.
    pub fn is_unreachable(&self) -> bool {
        self.is_timeout() || self.is_connect()
    }
}
