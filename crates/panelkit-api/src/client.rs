// Panel API HTTP client
//
// Wraps `reqwest::Client` with panel-specific URL construction and status
// mapping. One client instance serves every panel: the endpoint is a call
// argument, not client state, so a single connection pool covers the whole
// device population.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{EffectSelect, PanelInfo, StateWrite, TokenResponse};
use crate::transport::TransportConfig;

/// Default API port panels listen on.
pub const DEFAULT_API_PORT: u16 = 16021;

/// A panel's current reachable endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PanelEndpoint {
    pub address: IpAddr,
    pub port: u16,
}

impl PanelEndpoint {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    /// API root for this endpoint: `http://{address}:{port}/api/v1`.
    fn api_root(&self) -> String {
        format!("http://{}:{}/api/v1", self.address, self.port)
    }
}

impl fmt::Display for PanelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Raw HTTP client for the on-device panel API.
///
/// Three surfaces:
/// - unauthenticated describe probe (`GET /api/v1/`)
/// - unauthenticated token request (`POST /api/v1/new`)
/// - token-authenticated state/effects/identify commands
///
/// Cheaply cloneable; clones share the same connection pool.
#[derive(Clone)]
pub struct PanelClient {
    http: reqwest::Client,
}

impl PanelClient {
    /// Create a new client from a `TransportConfig`.
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn from_reqwest(http: reqwest::Client) -> Self {
        Self { http }
    }

    // ── URL builders ─────────────────────────────────────────────────

    fn url(&self, endpoint: &PanelEndpoint, path: &str) -> Result<Url, Error> {
        Ok(Url::parse(&format!("{}{path}", endpoint.api_root()))?)
    }

    // ── Unauthenticated surface ──────────────────────────────────────

    /// Lightweight describe probe: confirms the endpoint speaks the panel
    /// API without requiring a token.
    ///
    /// An unauthenticated `GET /api/v1/` is answered with 401 by a real
    /// panel (200 by permissive simulators); anything else means the
    /// endpoint is not a panel.
    pub async fn describe(&self, endpoint: &PanelEndpoint) -> Result<(), Error> {
        let url = self.url(endpoint, "/")?;
        debug!("GET {url}");

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        match resp.status().as_u16() {
            200 | 401 => Ok(()),
            status => Err(Error::Api { status }),
        }
    }

    /// Request an auth token (`POST /api/v1/new`).
    ///
    /// Succeeds only while the device's on-device pairing window is open
    /// (the user held the power button). 401/403 map to
    /// [`Error::NotInPairingMode`].
    pub async fn request_token(&self, endpoint: &PanelEndpoint) -> Result<String, Error> {
        let url = self.url(endpoint, "/new")?;
        debug!("POST {url}");

        let resp = self.http.post(url).send().await.map_err(Error::Transport)?;
        let status = resp.status().as_u16();
        match status {
            200 => {
                let body = resp.text().await.map_err(Error::Transport)?;
                let token: TokenResponse =
                    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                        message: e.to_string(),
                        body,
                    })?;
                Ok(token.auth_token)
            }
            401 | 403 => Err(Error::NotInPairingMode { status }),
            _ => Err(Error::Api { status }),
        }
    }

    // ── Authenticated surface ────────────────────────────────────────

    /// Fetch the full self-description (`GET /api/v1/{token}`).
    pub async fn panel_info(
        &self,
        endpoint: &PanelEndpoint,
        token: &str,
    ) -> Result<PanelInfo, Error> {
        let url = self.url(endpoint, &format!("/{token}"))?;
        debug!("GET {}/<token>", endpoint.api_root());

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        let status = resp.status().as_u16();
        match status {
            200 => {
                let body = resp.text().await.map_err(Error::Transport)?;
                serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                    message: e.to_string(),
                    body,
                })
            }
            401 => Err(Error::Unauthorized),
            _ => Err(Error::Api { status }),
        }
    }

    /// Write a partial state update (`PUT /api/v1/{token}/state`).
    pub async fn write_state(
        &self,
        endpoint: &PanelEndpoint,
        token: &str,
        write: &StateWrite,
    ) -> Result<(), Error> {
        let url = self.url(endpoint, &format!("/{token}/state"))?;
        debug!("PUT {}/<token>/state", endpoint.api_root());

        let resp = self
            .http
            .put(url)
            .json(write)
            .send()
            .await
            .map_err(Error::Transport)?;
        Self::command_status(resp.status().as_u16())
    }

    /// Select an effect by name (`PUT /api/v1/{token}/effects`).
    pub async fn select_effect(
        &self,
        endpoint: &PanelEndpoint,
        token: &str,
        effect: &str,
    ) -> Result<(), Error> {
        let url = self.url(endpoint, &format!("/{token}/effects"))?;
        debug!("PUT {}/<token>/effects", endpoint.api_root());

        let body = EffectSelect {
            select: effect.to_owned(),
        };
        let resp = self
            .http
            .put(url)
            .json(&body)
            .send()
            .await
            .map_err(Error::Transport)?;
        Self::command_status(resp.status().as_u16())
    }

    /// Trigger the identify flash (`PUT /api/v1/{token}/identify`).
    pub async fn identify(&self, endpoint: &PanelEndpoint, token: &str) -> Result<(), Error> {
        let url = self.url(endpoint, &format!("/{token}/identify"))?;
        debug!("PUT {}/<token>/identify", endpoint.api_root());

        let resp = self.http.put(url).send().await.map_err(Error::Transport)?;
        Self::command_status(resp.status().as_u16())
    }

    /// Map a command-surface status code: panels answer 204 on success
    /// (200 accepted for permissive simulators).
    fn command_status(status: u16) -> Result<(), Error> {
        match status {
            200 | 204 => Ok(()),
            401 => Err(Error::Unauthorized),
            _ => Err(Error::Api { status }),
        }
    }
}
