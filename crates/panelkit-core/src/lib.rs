// panelkit-core: Domain layer between panelkit-api and host consumers.
//
// Owns the device registry, the discovery engine, the simultaneous
// pairing orchestrator, the rate-limited dispatcher, and the layout
// generator. Host-facing surfaces (remote-entity protocol, persistence
// file formats, button mapping) live outside this workspace.

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod layout;
pub mod model;
pub mod pairing;
pub mod registry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DiscoveryConfig, DispatchConfig, PairingConfig, Tunables};
pub use discovery::DiscoveryEngine;
pub use dispatch::{presets, Command, DispatchReport, Dispatcher};
pub use error::{CoreError, DispatchFailure, PairingFailure};
pub use layout::{generate, Control, ControlAction, Page};
pub use pairing::{BatchState, PairingBatch, PairingOrchestrator, PairingOutcome, PairingReport, ProceedSignal};
pub use registry::{DeviceRegistry, Snapshot};

// Re-export model types at the crate root for ergonomics.
pub use model::{AuthToken, Capabilities, DeviceRecord, ModelCode, ModelFamily, PairingState, PanelId};

// Endpoint type comes straight from the wire layer.
pub use panelkit_api::PanelEndpoint;
