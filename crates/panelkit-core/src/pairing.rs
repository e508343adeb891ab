// ── Simultaneous pairing ──
//
// Pairs several devices inside one shared time window. The user puts all
// target devices into their on-device pairing mode first, confirms via
// the proceed handle, and every device is then raced concurrently against
// a single deadline. One slow or dead device costs nothing extra: the
// batch always finishes by the window boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use panelkit_api::models::PanelInfo;
use panelkit_api::{PanelClient, PanelEndpoint};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::PairingConfig;
use crate::error::{CoreError, PairingFailure};
use crate::model::{AuthToken, PairingState, PanelId};
use crate::registry::DeviceRegistry;

/// Lifecycle of one pairing batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    /// Waiting for the user to put devices into pairing mode and confirm.
    AwaitingUserAction,
    Racing,
    Completed,
}

/// Per-device result of a completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingOutcome {
    Paired,
    Failed(PairingFailure),
}

/// Outcome per device, ordered by id.
pub type PairingReport = BTreeMap<PanelId, PairingOutcome>;

/// Entry point for pairing batches.
pub struct PairingOrchestrator {
    registry: Arc<DeviceRegistry>,
    client: PanelClient,
    config: PairingConfig,
}

impl PairingOrchestrator {
    pub fn new(registry: Arc<DeviceRegistry>, client: PanelClient, config: PairingConfig) -> Self {
        Self {
            registry,
            client,
            config,
        }
    }

    /// Prepare a batch over `targets`.
    ///
    /// Validates every id, resets previously failed or paired records back
    /// to `Discovered`, and returns the batch plus the proceed handle. The
    /// race itself starts only when [`ProceedSignal::proceed`] is called,
    /// so the window clock never runs while the user is still walking
    /// around holding power buttons.
    pub fn begin(&self, targets: &[PanelId]) -> Result<(PairingBatch, ProceedSignal), CoreError> {
        if targets.is_empty() {
            return Err(CoreError::EmptySelection);
        }

        let mut endpoints = Vec::with_capacity(targets.len());
        for id in targets {
            let record = self
                .registry
                .get(id)
                .ok_or_else(|| CoreError::UnknownDevice { id: id.clone() })?;
            self.registry.reset_for_pairing(id)?;
            endpoints.push((id.clone(), record.endpoint));
        }

        let (proceed_tx, proceed_rx) = oneshot::channel();
        let (state_tx, _) = watch::channel(BatchState::AwaitingUserAction);
        info!(devices = endpoints.len(), "pairing batch prepared");

        let batch = PairingBatch {
            registry: Arc::clone(&self.registry),
            client: self.client.clone(),
            config: self.config.clone(),
            targets: endpoints,
            proceed_rx,
            state: state_tx,
        };
        Ok((batch, ProceedSignal(proceed_tx)))
    }
}

/// One-shot confirmation that the devices are in pairing mode.
///
/// Dropping it unconfirmed aborts the batch.
pub struct ProceedSignal(oneshot::Sender<()>);

impl ProceedSignal {
    pub fn proceed(self) {
        let _ = self.0.send(());
    }
}

impl fmt::Debug for ProceedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProceedSignal").finish_non_exhaustive()
    }
}

/// A prepared pairing batch; consumed by [`run`](Self::run).
pub struct PairingBatch {
    registry: Arc<DeviceRegistry>,
    client: PanelClient,
    config: PairingConfig,
    targets: Vec<(PanelId, PanelEndpoint)>,
    proceed_rx: oneshot::Receiver<()>,
    state: watch::Sender<BatchState>,
}

impl fmt::Debug for PairingBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingBatch")
            .field("targets", &self.targets)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl PairingBatch {
    /// Observe the batch lifecycle.
    pub fn watch_state(&self) -> watch::Receiver<BatchState> {
        self.state.subscribe()
    }

    /// Wait for the proceed confirmation, then race every target against
    /// one shared deadline.
    ///
    /// Devices that pair are moved to `Paired` and hydrated; devices that
    /// fail are marked `Failed` with the reason. A device still mid-race
    /// at the deadline reports `WindowExpired`. The batch itself always
    /// completes; individual failures never abort it.
    pub async fn run(self, window: Option<Duration>) -> Result<PairingReport, CoreError> {
        if self.proceed_rx.await.is_err() {
            let _ = self.state.send(BatchState::Completed);
            return Err(CoreError::PairingAborted);
        }
        let _ = self.state.send(BatchState::Racing);

        for (id, _) in &self.targets {
            if let Err(e) = self
                .registry
                .set_pairing_state(id, PairingState::PairingRequested)
            {
                warn!(%id, error = %e, "could not mark device as pairing");
            }
        }

        let window = window.unwrap_or(self.config.default_window);
        let deadline = Instant::now() + window;
        info!(devices = self.targets.len(), window_secs = window.as_secs_f64(), "pairing race started");

        let mut races: FuturesUnordered<_> = self
            .targets
            .iter()
            .map(|(id, endpoint)| {
                let client = self.client.clone();
                let config = self.config.clone();
                let endpoint = *endpoint;
                let id = id.clone();
                async move {
                    let result = match timeout_at(deadline, race_device(&client, &config, endpoint)).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(PairingFailure::WindowExpired),
                    };
                    (id, result)
                }
            })
            .collect();

        let mut report = PairingReport::new();
        while let Some((id, result)) = races.next().await {
            match result {
                Ok((token, info)) => {
                    info!(%id, "device paired");
                    let next = PairingState::Paired {
                        token: AuthToken::new(token),
                    };
                    if let Err(e) = self.registry.set_pairing_state(&id, next) {
                        warn!(%id, error = %e, "could not record pairing outcome");
                    } else if let Some(info) = info {
                        if let Err(e) = self.registry.hydrate(&id, &info) {
                            warn!(%id, error = %e, "could not hydrate paired device");
                        }
                    }
                    report.insert(id, PairingOutcome::Paired);
                }
                Err(reason) => {
                    warn!(%id, %reason, "device failed to pair");
                    let next = PairingState::Failed {
                        reason: reason.to_string(),
                    };
                    if let Err(e) = self.registry.set_pairing_state(&id, next) {
                        warn!(%id, error = %e, "could not record pairing outcome");
                    }
                    report.insert(id, PairingOutcome::Failed(reason));
                }
            }
        }

        let _ = self.state.send(BatchState::Completed);
        info!(
            paired = report.values().filter(|o| **o == PairingOutcome::Paired).count(),
            total = report.len(),
            "pairing batch completed"
        );
        Ok(report)
    }
}

/// Race one device: request a token repeatedly until it succeeds, hits a
/// terminal failure, or the attempt budget runs out. On success the
/// self-description is fetched best-effort so the record can be hydrated
/// immediately.
async fn race_device(
    client: &PanelClient,
    config: &PairingConfig,
    endpoint: PanelEndpoint,
) -> Result<(String, Option<PanelInfo>), PairingFailure> {
    let mut last_failure = PairingFailure::Unreachable;

    for attempt in 1..=config.attempts.max(1) {
        match timeout(config.call_timeout, client.request_token(&endpoint)).await {
            Ok(Ok(token)) => {
                let info = match timeout(config.call_timeout, client.panel_info(&endpoint, &token))
                    .await
                {
                    Ok(Ok(info)) => Some(info),
                    Ok(Err(e)) => {
                        warn!(%endpoint, error = %e, "self-description fetch failed after pairing");
                        None
                    }
                    Err(_) => {
                        warn!(%endpoint, "self-description fetch timed out after pairing");
                        None
                    }
                };
                return Ok((token, info));
            }
            Ok(Err(e)) => {
                let failure = PairingFailure::classify(&e);
                debug!(%endpoint, attempt, %failure, "token request failed");
                if !failure.is_retryable() {
                    return Err(failure);
                }
                last_failure = failure;
            }
            Err(_) => {
                debug!(%endpoint, attempt, "token request timed out");
                last_failure = PairingFailure::Unreachable;
            }
        }
        if attempt < config.attempts {
            sleep(config.backoff).await;
        }
    }
    Err(last_failure)
}
