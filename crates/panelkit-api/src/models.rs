// Wire models for the panel HTTP API.
//
// Read types are deliberately tolerant: every field defaults, because a
// half-populated self-description from one device must not abort anything.

use serde::{Deserialize, Serialize};

// ── Read types ──────────────────────────────────────────────────────

/// Response body of the token request (`POST /api/v1/new`).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub auth_token: String,
}

/// A boolean state attribute, wrapped the way the device reports it
/// (`{"value": true}`).
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct BoolValue {
    #[serde(default)]
    pub value: bool,
}

/// An integer state attribute with optional device-reported bounds.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct IntValue {
    #[serde(default)]
    pub value: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// Live state block of the self-description.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PanelState {
    #[serde(default)]
    pub on: BoolValue,
    #[serde(default)]
    pub brightness: IntValue,
    #[serde(default)]
    pub hue: IntValue,
    #[serde(default)]
    pub sat: IntValue,
    #[serde(default)]
    pub ct: IntValue,
    #[serde(default, rename = "colorMode")]
    pub color_mode: String,
}

/// Effects block of the self-description.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EffectsInfo {
    #[serde(default)]
    pub select: String,
    #[serde(default, rename = "effectsList")]
    pub effects_list: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LayoutData {
    #[serde(default, rename = "numPanels")]
    pub num_panels: u32,
    #[serde(default, rename = "positionData")]
    pub position_data: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PanelLayoutInfo {
    #[serde(default)]
    pub layout: LayoutData,
}

/// Full authenticated self-description (`GET /api/v1/{token}`).
///
/// This is the only place capability data comes from; nothing upstream is
/// allowed to guess capabilities before this document has been seen.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PanelInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, rename = "serialNo")]
    pub serial_no: String,
    #[serde(default, rename = "firmwareVersion")]
    pub firmware_version: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub state: PanelState,
    #[serde(default)]
    pub effects: EffectsInfo,
    #[serde(default, rename = "panelLayout")]
    pub panel_layout: PanelLayoutInfo,
}

// ── Write types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize)]
pub struct WriteBool {
    pub value: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct WriteInt {
    pub value: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u16>,
}

/// Partial state write (`PUT /api/v1/{token}/state`).
///
/// Only the populated attributes are serialized. Constructors clamp to the
/// ranges the device accepts, matching its documented limits.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<WriteBool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<WriteInt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<WriteInt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat: Option<WriteInt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct: Option<WriteInt>,
}

impl StateWrite {
    /// Power on/off.
    pub fn power(on: bool) -> Self {
        Self {
            on: Some(WriteBool { value: on }),
            ..Self::default()
        }
    }

    /// Brightness, clamped to 1..=100 percent.
    pub fn brightness(percent: u8, duration_secs: Option<u16>) -> Self {
        Self {
            brightness: Some(WriteInt {
                value: u16::from(percent.clamp(1, 100)),
                duration: duration_secs,
            }),
            ..Self::default()
        }
    }

    /// Hue (0..=360 degrees) and saturation (0..=100 percent) together.
    pub fn color(hue: u16, sat: u8) -> Self {
        Self {
            hue: Some(WriteInt {
                value: hue.min(360),
                duration: None,
            }),
            sat: Some(WriteInt {
                value: u16::from(sat.min(100)),
                duration: None,
            }),
            ..Self::default()
        }
    }

    /// Color temperature, clamped to 1200..=6500 Kelvin.
    pub fn color_temperature(kelvin: u16) -> Self {
        Self {
            ct: Some(WriteInt {
                value: kelvin.clamp(1200, 6500),
                duration: None,
            }),
            ..Self::default()
        }
    }
}

/// Effect selection (`PUT /api/v1/{token}/effects`).
#[derive(Debug, Clone, Serialize)]
pub struct EffectSelect {
    pub select: String,
}
