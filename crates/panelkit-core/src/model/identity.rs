// ── Network identity ──

use std::fmt;
use std::str::FromStr;

use panelkit_api::PanelEndpoint;
use serde::{Deserialize, Serialize};

/// Stable network identity of a panel; the registry's primary key.
///
/// Prefers the mDNS service instance name, which survives DHCP address
/// changes. Candidates added without an announcement (manual entry) fall
/// back to the `"{address}:{port}"` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelId(String);

impl PanelId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_owned())
    }

    /// Fallback identity derived from the endpoint itself.
    pub fn from_endpoint(endpoint: &PanelEndpoint) -> Self {
        Self(endpoint.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PanelId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for PanelId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
