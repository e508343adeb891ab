// ── Device records ──

use std::fmt;

use chrono::{DateTime, Utc};
use panelkit_api::models::PanelInfo;
use panelkit_api::PanelEndpoint;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::model::PanelId;

// ── Model codes ─────────────────────────────────────────────────────

/// Product family a model code resolves to. Drives both layout grouping
/// labels and the color-temperature capability gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    LightPanels,
    Canvas,
    Shapes,
    Elements,
    Lines,
    Other,
}

impl ModelFamily {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::LightPanels => "Light Panels",
            Self::Canvas => "Canvas",
            Self::Shapes => "Shapes",
            Self::Elements => "Elements",
            Self::Lines => "Lines",
            Self::Other => "Panels",
        }
    }
}

/// Device-reported model SKU, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCode {
    sku: String,
}

impl ModelCode {
    pub fn from_sku(sku: impl AsRef<str>) -> Self {
        Self {
            sku: sku.as_ref().trim().to_uppercase(),
        }
    }

    /// Placeholder for candidates whose self-description has not been
    /// fetched yet.
    pub fn unknown() -> Self {
        Self { sku: String::new() }
    }

    pub fn is_unknown(&self) -> bool {
        self.sku.is_empty()
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn family(&self) -> ModelFamily {
        match self.sku.as_str() {
            "NL22" | "NL42" => ModelFamily::LightPanels,
            "NL29" => ModelFamily::Canvas,
            "NL52" | "NL59" => ModelFamily::Shapes,
            "NL64" => ModelFamily::Elements,
            "NL69" => ModelFamily::Lines,
            _ => ModelFamily::Other,
        }
    }
}

impl fmt::Display for ModelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sku.is_empty() {
            write!(f, "unknown")
        } else {
            write!(f, "{}", self.sku)
        }
    }
}

// ── Auth tokens ─────────────────────────────────────────────────────

/// Per-device auth token obtained through pairing.
///
/// Wrapped in `SecretString` so accidental `Debug` output never leaks it;
/// serialization exposes the value on purpose so the host can persist
/// records.
#[derive(Clone)]
pub struct AuthToken(SecretString);

impl AuthToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(SecretString::from(raw.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

impl PartialEq for AuthToken {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for AuthToken {}

impl Serialize for AuthToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.expose())
    }
}

impl<'de> Deserialize<'de> for AuthToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::new(String::deserialize(deserializer)?))
    }
}

// ── Capabilities ────────────────────────────────────────────────────

/// Feature capabilities derived from a device's self-description.
///
/// Only ever constructed from a fetched [`PanelInfo`]; candidates carry
/// `None` until hydrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    pub color: bool,
    pub brightness: bool,
    pub effects: bool,
    pub color_temp: bool,
    pub layout: bool,
}

impl Capabilities {
    pub fn from_info(info: &PanelInfo) -> Self {
        let family = ModelCode::from_sku(&info.model).family();
        Self {
            color: true,
            brightness: true,
            effects: !info.effects.effects_list.is_empty(),
            // Elements hardware has no tunable-white channel.
            color_temp: family != ModelFamily::Elements,
            layout: !info.panel_layout.layout.position_data.is_empty(),
        }
    }
}

// ── Pairing lifecycle ───────────────────────────────────────────────

/// Pairing lifecycle of a device record.
///
/// The auth token lives inside the `Paired` variant, so a record holds a
/// token exactly when it is paired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PairingState {
    Discovered,
    PairingRequested,
    Paired { token: AuthToken },
    Failed { reason: String },
}

impl PairingState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::PairingRequested => "pairing_requested",
            Self::Paired { .. } => "paired",
            Self::Failed { .. } => "failed",
        }
    }

    /// Whether `self -> next` is a legal lifecycle transition.
    ///
    /// `Failed` and `Paired` both step back to `Discovered` so a device
    /// can be re-paired after a failure or an expired token.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Discovered, Self::PairingRequested)
                | (Self::PairingRequested, Self::Paired { .. })
                | (Self::PairingRequested, Self::Failed { .. })
                | (Self::Failed { .. }, Self::Discovered)
                | (Self::Paired { .. }, Self::Discovered)
        )
    }
}

// ── Device record ───────────────────────────────────────────────────

/// Everything the controller knows about one panel device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: PanelId,
    pub endpoint: PanelEndpoint,
    pub name: String,
    pub model: ModelCode,
    pub capabilities: Option<Capabilities>,
    pub effects: Vec<String>,
    pub panel_count: u32,
    pub pairing: PairingState,
    pub last_seen: DateTime<Utc>,
}

impl DeviceRecord {
    /// A freshly discovered, unpaired candidate.
    pub fn candidate(id: PanelId, endpoint: PanelEndpoint, name: impl Into<String>) -> Self {
        Self {
            id,
            endpoint,
            name: name.into(),
            model: ModelCode::unknown(),
            capabilities: None,
            effects: Vec::new(),
            panel_count: 0,
            pairing: PairingState::Discovered,
            last_seen: Utc::now(),
        }
    }

    pub fn is_paired(&self) -> bool {
        matches!(self.pairing, PairingState::Paired { .. })
    }

    pub fn auth_token(&self) -> Option<&AuthToken> {
        match &self.pairing {
            PairingState::Paired { token } => Some(token),
            _ => None,
        }
    }

    /// Fold a fetched self-description into the record. Capabilities are
    /// set once and never overwritten by later fetches.
    pub fn hydrate_from_info(&mut self, info: &PanelInfo) {
        if !info.name.is_empty() {
            self.name = info.name.clone();
        }
        if !info.model.is_empty() {
            self.model = ModelCode::from_sku(&info.model);
        }
        if self.capabilities.is_none() {
            self.capabilities = Some(Capabilities::from_info(info));
        }
        self.effects = info.effects.effects_list.clone();
        self.panel_count = info.panel_layout.layout.num_panels;
        self.last_seen = Utc::now();
    }
}
