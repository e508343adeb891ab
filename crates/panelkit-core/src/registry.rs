// ── Device registry ──
//
// Concurrent map of device records keyed by `PanelId`, with a versioned
// snapshot channel so consumers can watch the population change without
// polling. Writers mutate through the registry so every mutation bumps
// the version and republishes the snapshot.

use std::sync::Arc;

use dashmap::DashMap;
use panelkit_api::PanelEndpoint;
use panelkit_api::models::PanelInfo;
use tokio::sync::watch;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{DeviceRecord, ModelCode, PairingState, PanelId};

/// A published view of the registry: records sorted by id.
pub type Snapshot = Arc<Vec<Arc<DeviceRecord>>>;

pub struct DeviceRegistry {
    records: DashMap<PanelId, Arc<DeviceRecord>>,
    version: watch::Sender<u64>,
    snapshot: watch::Sender<Snapshot>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            records: DashMap::new(),
            version,
            snapshot,
        }
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Insert or refresh a discovered candidate. Pairing state, token,
    /// capabilities, and effects of an existing record are preserved;
    /// only the volatile fields (endpoint, name, last-seen) move.
    ///
    /// Returns `true` if this id was new.
    pub fn upsert_candidate(
        &self,
        id: PanelId,
        endpoint: PanelEndpoint,
        name: &str,
        model_hint: Option<&str>,
    ) -> bool {
        let mut is_new = false;
        {
            let mut entry = self
                .records
                .entry(id.clone())
                .or_insert_with(|| {
                    is_new = true;
                    Arc::new(DeviceRecord::candidate(id.clone(), endpoint, name))
                });
            let record = Arc::make_mut(entry.value_mut());
            record.endpoint = endpoint;
            if !name.is_empty() {
                record.name = name.to_owned();
            }
            if record.model.is_unknown() {
                if let Some(hint) = model_hint.filter(|h| !h.is_empty()) {
                    record.model = ModelCode::from_sku(hint);
                }
            }
            record.last_seen = chrono::Utc::now();
        }
        if is_new {
            debug!(%id, %endpoint, "registered new candidate");
        }
        self.rebuild_snapshot();
        is_new
    }

    /// Move one record through the pairing lifecycle, rejecting illegal
    /// transitions.
    pub fn set_pairing_state(&self, id: &PanelId, next: PairingState) -> Result<(), CoreError> {
        {
            let mut entry = self
                .records
                .get_mut(id)
                .ok_or_else(|| CoreError::UnknownDevice { id: id.clone() })?;
            let record = Arc::make_mut(entry.value_mut());
            if !record.pairing.can_transition_to(&next) {
                return Err(CoreError::InvalidTransition {
                    id: id.clone(),
                    from: record.pairing.name(),
                    to: next.name(),
                });
            }
            debug!(%id, from = record.pairing.name(), to = next.name(), "pairing transition");
            record.pairing = next;
        }
        self.rebuild_snapshot();
        Ok(())
    }

    /// Reset a `Failed` or `Paired` record back to `Discovered` so it can
    /// join a new pairing batch. `Discovered` is left alone; a record
    /// mid-race is an error.
    pub fn reset_for_pairing(&self, id: &PanelId) -> Result<(), CoreError> {
        let current = {
            let entry = self
                .records
                .get(id)
                .ok_or_else(|| CoreError::UnknownDevice { id: id.clone() })?;
            entry.value().pairing.clone()
        };
        match current {
            PairingState::Discovered => Ok(()),
            PairingState::Failed { .. } | PairingState::Paired { .. } => {
                self.set_pairing_state(id, PairingState::Discovered)
            }
            PairingState::PairingRequested => Err(CoreError::InvalidTransition {
                id: id.clone(),
                from: current.name(),
                to: PairingState::Discovered.name(),
            }),
        }
    }

    /// Fold a fetched self-description into a record.
    pub fn hydrate(&self, id: &PanelId, info: &PanelInfo) -> Result<(), CoreError> {
        {
            let mut entry = self
                .records
                .get_mut(id)
                .ok_or_else(|| CoreError::UnknownDevice { id: id.clone() })?;
            Arc::make_mut(entry.value_mut()).hydrate_from_info(info);
        }
        self.rebuild_snapshot();
        Ok(())
    }

    pub fn remove(&self, id: &PanelId) -> Option<Arc<DeviceRecord>> {
        let removed = self.records.remove(id).map(|(_, record)| record);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, id: &PanelId) -> Option<Arc<DeviceRecord>> {
        self.records.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Current population, sorted by id.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Paired records only, sorted by id.
    pub fn paired_snapshot(&self) -> Vec<Arc<DeviceRecord>> {
        self.snapshot()
            .iter()
            .filter(|r| r.is_paired())
            .cloned()
            .collect()
    }

    /// Watch the population change; the receiver always observes the
    /// latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    /// Monotonic version counter, bumped on every mutation.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ── Internals ────────────────────────────────────────────────────

    // Callers must have dropped their map guards before this runs.
    fn rebuild_snapshot(&self) {
        let mut records: Vec<Arc<DeviceRecord>> = self
            .records
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        self.version.send_modify(|v| *v += 1);
        // send_modify updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(records));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::AuthToken;

    fn endpoint(last_octet: u8) -> PanelEndpoint {
        PanelEndpoint::new(format!("192.168.1.{last_octet}").parse().unwrap(), 16021)
    }

    #[test]
    fn upsert_preserves_pairing_across_refresh() {
        let registry = DeviceRegistry::new();
        let id = PanelId::new("Desk Shapes");

        assert!(registry.upsert_candidate(id.clone(), endpoint(10), "Desk Shapes", Some("NL52")));
        registry
            .set_pairing_state(&id, PairingState::PairingRequested)
            .unwrap();
        registry
            .set_pairing_state(
                &id,
                PairingState::Paired {
                    token: AuthToken::new("tok"),
                },
            )
            .unwrap();

        // Same device re-announced from a new address.
        assert!(!registry.upsert_candidate(id.clone(), endpoint(20), "Desk Shapes", None));
        let record = registry.get(&id).unwrap();
        assert_eq!(record.endpoint, endpoint(20));
        assert!(record.is_paired());
        assert_eq!(record.model.sku(), "NL52");
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let registry = DeviceRegistry::new();
        let id = PanelId::new("a");
        registry.upsert_candidate(id.clone(), endpoint(1), "a", None);

        let err = registry
            .set_pairing_state(
                &id,
                PairingState::Paired {
                    token: AuthToken::new("t"),
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn reset_for_pairing_rules() {
        let registry = DeviceRegistry::new();
        let id = PanelId::new("a");
        registry.upsert_candidate(id.clone(), endpoint(1), "a", None);

        // Discovered is a no-op.
        registry.reset_for_pairing(&id).unwrap();

        registry
            .set_pairing_state(&id, PairingState::PairingRequested)
            .unwrap();
        assert!(matches!(
            registry.reset_for_pairing(&id).unwrap_err(),
            CoreError::InvalidTransition { .. }
        ));

        registry
            .set_pairing_state(
                &id,
                PairingState::Failed {
                    reason: "unreachable".into(),
                },
            )
            .unwrap();
        registry.reset_for_pairing(&id).unwrap();
        assert_eq!(registry.get(&id).unwrap().pairing, PairingState::Discovered);
    }

    #[test]
    fn snapshot_is_sorted_and_versioned() {
        let registry = DeviceRegistry::new();
        let v0 = registry.version();
        registry.upsert_candidate(PanelId::new("b"), endpoint(2), "b", None);
        registry.upsert_candidate(PanelId::new("a"), endpoint(1), "a", None);

        let snap = registry.snapshot();
        let ids: Vec<&str> = snap.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(registry.version() > v0);
    }

    #[test]
    fn snapshot_updates_without_any_subscriber() {
        let registry = DeviceRegistry::new();
        assert!(registry.snapshot().is_empty());

        registry.upsert_candidate(PanelId::new("a"), endpoint(1), "a", None);
        assert_eq!(registry.snapshot().len(), 1);
        assert_eq!(registry.paired_snapshot().len(), 0);
    }

    #[tokio::test]
    async fn subscribers_observe_mutations() {
        let registry = DeviceRegistry::new();
        let mut rx = registry.subscribe();

        registry.upsert_candidate(PanelId::new("a"), endpoint(1), "a", None);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);
    }
}
