// ── Domain model ──
//
// Canonical representations of a panel device as the registry, pairing
// orchestrator, dispatcher, and layout generator see it. Records are
// serializable so the host's persistence collaborator can round-trip
// them as opaque documents.

pub mod device;
pub mod identity;

pub use device::{AuthToken, Capabilities, DeviceRecord, ModelCode, ModelFamily, PairingState};
pub use identity::PanelId;
