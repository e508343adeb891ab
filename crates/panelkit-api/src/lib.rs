// panelkit-api: Device-facing protocol layer for smart-lighting panels.
//
// Raw building blocks only -- mDNS announcement browsing, the per-panel
// JSON-over-HTTP wire client, and the transport-level error type.
// Policy (dedup, pairing windows, throttling) lives in panelkit-core.

pub mod client;
pub mod discovery;
pub mod error;
pub mod models;
pub mod transport;

pub use client::{PanelClient, PanelEndpoint, DEFAULT_API_PORT};
pub use discovery::{Announcement, ServiceBrowser, SERVICE_TYPE};
pub use error::Error;
pub use models::{PanelInfo, StateWrite};
pub use transport::TransportConfig;
