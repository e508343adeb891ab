// ── Command dispatch ──
//
// Fans a command out to a set of paired devices under two rate gates: a
// global one spacing all outbound commands, and a per-device one spacing
// commands to the same panel. Consumer-grade panel firmware drops or
// misorders bursts, so both gates are mandatory on every wire operation.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use panelkit_api::models::StateWrite;
use panelkit_api::{PanelClient, PanelEndpoint};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::DispatchConfig;
use crate::error::{CoreError, DispatchFailure};
use crate::model::{DeviceRecord, PanelId};
use crate::registry::DeviceRegistry;

/// A device-facing command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum Command {
    SetPower(bool),
    /// Read the current power state, then write the inverse. Costs two
    /// gate admissions.
    Toggle,
    /// Brightness percent, clamped to 1..=100 on the wire.
    SetBrightness(u8),
    SetColor { hue: u16, sat: u8 },
    /// Color temperature in Kelvin. Devices without a tunable-white
    /// channel get the nearest color preset instead.
    SetColorTemp(u16),
    SetEffect(String),
    Identify,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetPower(_) => "set_power",
            Self::Toggle => "toggle",
            Self::SetBrightness(_) => "set_brightness",
            Self::SetColor { .. } => "set_color",
            Self::SetColorTemp(_) => "set_color_temp",
            Self::SetEffect(_) => "set_effect",
            Self::Identify => "identify",
        }
    }
}

/// Hue/saturation presets matching the devices' stock palette.
pub mod presets {
    use super::Command;

    pub const RED: Command = Command::SetColor { hue: 0, sat: 100 };
    pub const GREEN: Command = Command::SetColor { hue: 120, sat: 100 };
    pub const BLUE: Command = Command::SetColor { hue: 240, sat: 100 };
    pub const WHITE: Command = Command::SetColor { hue: 0, sat: 0 };
    pub const PURPLE: Command = Command::SetColor { hue: 300, sat: 100 };
    pub const YELLOW: Command = Command::SetColor { hue: 60, sat: 100 };
    /// Warm white approximation for devices without a tunable-white channel.
    pub const WARM_HS: (u16, u8) = (30, 50);
    pub const WARM: Command = Command::SetColor {
        hue: WARM_HS.0,
        sat: WARM_HS.1,
    };
    /// Cool white approximation for devices without a tunable-white channel.
    pub const COOL_HS: (u16, u8) = (210, 30);
    pub const COOL: Command = Command::SetColor {
        hue: COOL_HS.0,
        sat: COOL_HS.1,
    };

    pub const WARM_KELVIN: u16 = 2700;
    pub const COOL_KELVIN: u16 = 6500;
}

/// Per-device result of a dispatch, ordered by id.
pub type DispatchReport = BTreeMap<PanelId, Result<(), DispatchFailure>>;

struct DeviceGate {
    last_sent: Option<Instant>,
}

/// Rate-limited fan-out of commands to paired devices.
pub struct Dispatcher {
    registry: Arc<DeviceRegistry>,
    client: PanelClient,
    config: DispatchConfig,
    global_gate: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    device_gates: DashMap<PanelId, Arc<Mutex<DeviceGate>>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<DeviceRegistry>, client: PanelClient, config: DispatchConfig) -> Self {
        let quota = Quota::with_period(config.global_interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Self {
            registry,
            client,
            config,
            global_gate: RateLimiter::direct(quota),
            device_gates: DashMap::new(),
        }
    }

    /// Dispatch `command` to every target, concurrently but rate-gated.
    ///
    /// Targets are deduplicated. The report always carries one entry per
    /// unique target; one device failing never affects the others.
    pub async fn dispatch(
        &self,
        command: &Command,
        targets: &[PanelId],
    ) -> Result<DispatchReport, CoreError> {
        self.dispatch_with_cancel(command, targets, &CancellationToken::new())
            .await
    }

    /// Like [`dispatch`](Self::dispatch), but commands not yet on the wire
    /// when `cancel` fires report [`DispatchFailure::Cancelled`].
    pub async fn dispatch_with_cancel(
        &self,
        command: &Command,
        targets: &[PanelId],
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, CoreError> {
        if targets.is_empty() {
            return Err(CoreError::EmptySelection);
        }
        let mut unique: Vec<&PanelId> = targets.iter().collect();
        unique.sort();
        unique.dedup();

        debug!(command = command.name(), targets = unique.len(), "dispatching");
        let mut sends: FuturesUnordered<_> = unique
            .into_iter()
            .map(|id| async move { (id.clone(), self.dispatch_one(command, id, cancel).await) })
            .collect();

        let mut report = DispatchReport::new();
        while let Some((id, result)) = sends.next().await {
            if let Err(failure) = result {
                warn!(%id, command = command.name(), %failure, "command failed");
            }
            report.insert(id, result);
        }
        Ok(report)
    }

    // ── Per-device path ──────────────────────────────────────────────

    async fn dispatch_one(
        &self,
        command: &Command,
        id: &PanelId,
        cancel: &CancellationToken,
    ) -> Result<(), DispatchFailure> {
        let Some(record) = self.registry.get(id) else {
            return Err(DispatchFailure::Unauthorized);
        };
        let Some(token) = record.auth_token().map(|t| t.expose().to_owned()) else {
            return Err(DispatchFailure::Unauthorized);
        };

        let gate = Arc::clone(
            self.device_gates
                .entry(id.clone())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(DeviceGate { last_sent: None }))
                })
                .value(),
        );

        // Holding the gate lock across the whole exchange serializes
        // same-device commands and keeps them in submission order.
        let mut gate = gate.lock().await;
        if cancel.is_cancelled() {
            return Err(DispatchFailure::Cancelled);
        }

        let first = self
            .execute(&mut gate, cancel, &record, &token, command)
            .await;
        match first {
            Err(failure) if failure.is_retryable() && !cancel.is_cancelled() => {
                debug!(%id, command = command.name(), "retrying after transport failure");
                sleep(self.config.retry_backoff).await;
                self.execute(&mut gate, cancel, &record, &token, command)
                    .await
            }
            other => other,
        }
    }

    /// Run one command against one device. Every wire operation passes
    /// both gates, so a two-step command pays two admissions.
    async fn execute(
        &self,
        gate: &mut DeviceGate,
        cancel: &CancellationToken,
        record: &DeviceRecord,
        token: &str,
        command: &Command,
    ) -> Result<(), DispatchFailure> {
        let endpoint = record.endpoint;
        match command {
            Command::SetPower(on) => {
                self.send(gate, cancel, endpoint, token, &StateWrite::power(*on))
                    .await
            }
            Command::Toggle => {
                self.admit(gate, cancel).await?;
                let info = self
                    .bounded(self.client.panel_info(&endpoint, token))
                    .await?;
                self.send(
                    gate,
                    cancel,
                    endpoint,
                    token,
                    &StateWrite::power(!info.state.on.value),
                )
                .await
            }
            Command::SetBrightness(percent) => {
                self.send(
                    gate,
                    cancel,
                    endpoint,
                    token,
                    &StateWrite::brightness(*percent, None),
                )
                .await
            }
            Command::SetColor { hue, sat } => {
                self.send(gate, cancel, endpoint, token, &StateWrite::color(*hue, *sat))
                    .await
            }
            Command::SetColorTemp(kelvin) => {
                let write = if record.capabilities.is_none_or(|c| c.color_temp) {
                    StateWrite::color_temperature(*kelvin)
                } else {
                    // No tunable-white channel on this hardware.
                    let (hue, sat) = if *kelvin < 4000 {
                        presets::WARM_HS
                    } else {
                        presets::COOL_HS
                    };
                    StateWrite::color(hue, sat)
                };
                self.send(gate, cancel, endpoint, token, &write).await
            }
            Command::SetEffect(effect) => {
                if !record.effects.is_empty() && !record.effects.iter().any(|e| e == effect) {
                    warn!(id = %record.id, effect, "effect not in device catalog, sending anyway");
                }
                self.admit(gate, cancel).await?;
                self.bounded(self.client.select_effect(&endpoint, token, effect))
                    .await
            }
            Command::Identify => {
                self.admit(gate, cancel).await?;
                self.bounded(self.client.identify(&endpoint, token)).await
            }
        }
    }

    async fn send(
        &self,
        gate: &mut DeviceGate,
        cancel: &CancellationToken,
        endpoint: PanelEndpoint,
        token: &str,
        write: &StateWrite,
    ) -> Result<(), DispatchFailure> {
        self.admit(gate, cancel).await?;
        self.bounded(self.client.write_state(&endpoint, token, write))
            .await
    }

    /// Pass both rate gates: per-device spacing first, then the global
    /// interval. Stamps the device gate on admission.
    async fn admit(
        &self,
        gate: &mut DeviceGate,
        cancel: &CancellationToken,
    ) -> Result<(), DispatchFailure> {
        if let Some(last) = gate.last_sent {
            sleep_until(last + self.config.device_interval).await;
        }
        self.global_gate.until_ready().await;
        if cancel.is_cancelled() {
            return Err(DispatchFailure::Cancelled);
        }
        gate.last_sent = Some(Instant::now());
        Ok(())
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, panelkit_api::Error>>,
    ) -> Result<T, DispatchFailure> {
        match timeout(self.config.call_timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DispatchFailure::classify(&e)),
            Err(_) => Err(DispatchFailure::Timeout),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_stock_palette() {
        assert_eq!(presets::RED, Command::SetColor { hue: 0, sat: 100 });
        assert_eq!(presets::WHITE, Command::SetColor { hue: 0, sat: 0 });
        assert_eq!(presets::WARM, Command::SetColor { hue: 30, sat: 50 });
        assert_eq!(presets::COOL, Command::SetColor { hue: 210, sat: 30 });
    }

    #[test]
    fn command_names_are_stable() {
        assert_eq!(Command::Toggle.name(), "toggle");
        assert_eq!(Command::SetColorTemp(4000).name(), "set_color_temp");
        assert_eq!(Command::SetEffect("Snowfall".into()).name(), "set_effect");
    }

    #[tokio::test]
    async fn empty_target_list_is_rejected() {
        let registry = Arc::new(DeviceRegistry::new());
        let dispatcher = Dispatcher::new(
            registry,
            PanelClient::from_reqwest(reqwest::Client::new()),
            DispatchConfig::default(),
        );
        let err = dispatcher
            .dispatch(&Command::Identify, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::EmptySelection));
    }
}
