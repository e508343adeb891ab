// ── Discovery engine ──
//
// Drives an mDNS browse pass, dedups announcements per device, verifies
// each endpoint with a describe probe, and registers survivors as
// candidates. A device announcing from a new address keeps its identity
// and pairing state; only the endpoint moves.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use panelkit_api::{Announcement, PanelClient, PanelEndpoint, ServiceBrowser};
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::error::CoreError;
use crate::model::PanelId;
use crate::registry::DeviceRegistry;

pub struct DiscoveryEngine {
    registry: Arc<DeviceRegistry>,
    client: PanelClient,
    config: DiscoveryConfig,
}

impl DiscoveryEngine {
    pub fn new(registry: Arc<DeviceRegistry>, client: PanelClient, config: DiscoveryConfig) -> Self {
        Self {
            registry,
            client,
            config,
        }
    }

    /// Run one full browse pass: collect announcements until the network
    /// goes quiet (or the hard cap hits), probe each candidate endpoint,
    /// and register the ones that answer like a panel.
    ///
    /// Returns the number of previously unknown devices registered.
    pub async fn discover(&self) -> Result<usize, CoreError> {
        let browser = ServiceBrowser::new().map_err(|e| CoreError::Discovery(e.to_string()))?;
        let announcements = Self::collect(&browser, &self.config).await;
        info!(candidates = announcements.len(), "browse pass complete");
        Ok(self.probe_and_register(announcements).await)
    }

    /// Background rediscovery: reruns [`discover`](Self::discover) every
    /// `interval` until the token is cancelled.
    pub fn spawn_periodic(
        self: Arc<Self>,
        interval: std::time::Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("periodic discovery stopped");
                        return;
                    }
                    () = tokio::time::sleep(interval) => {}
                }
                if let Err(e) = self.discover().await {
                    warn!(error = %e, "periodic discovery pass failed");
                }
            }
        })
    }

    /// Collect announcements until `quiescence` passes without a new one,
    /// bounded by `cap`. Repeat announcements for the same instance are
    /// collapsed, latest endpoint wins.
    async fn collect(
        browser: &ServiceBrowser,
        config: &DiscoveryConfig,
    ) -> Vec<Announcement> {
        let started = Instant::now();
        let hard_deadline = started + config.cap;
        let mut quiet_deadline = started + config.quiescence;
        let mut seen: HashMap<String, Announcement> = HashMap::new();

        loop {
            tokio::select! {
                announcement = browser.next() => {
                    let Some(announcement) = announcement else { break };
                    quiet_deadline = Instant::now() + config.quiescence;
                    seen.insert(announcement.instance.clone(), announcement);
                }
                () = sleep_until(quiet_deadline.min(hard_deadline)) => break,
            }
        }
        seen.into_values().collect()
    }

    /// Probe each announced endpoint concurrently and register the ones
    /// that speak the panel API. Unreachable or non-panel endpoints are
    /// logged and dropped, never registered.
    pub async fn probe_and_register(&self, announcements: Vec<Announcement>) -> usize {
        let mut probes: FuturesUnordered<_> = announcements
            .into_iter()
            .map(|a| async move {
                let endpoint = PanelEndpoint::new(a.address, a.port);
                let probe = timeout(self.config.probe_timeout, self.client.describe(&endpoint));
                let ok = matches!(probe.await, Ok(Ok(())));
                (a, endpoint, ok)
            })
            .collect();

        let mut new_devices = 0;
        while let Some((announcement, endpoint, ok)) = probes.next().await {
            if !ok {
                warn!(
                    instance = %announcement.instance,
                    %endpoint,
                    "endpoint failed describe probe, skipping"
                );
                continue;
            }
            let id = if announcement.instance.is_empty() {
                PanelId::from_endpoint(&endpoint)
            } else {
                PanelId::new(&announcement.instance)
            };
            if self.registry.upsert_candidate(
                id,
                endpoint,
                &announcement.instance,
                announcement.model_hint.as_deref(),
            ) {
                new_devices += 1;
            }
        }
        new_devices
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::IpAddr;
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn engine(registry: Arc<DeviceRegistry>) -> DiscoveryEngine {
        let config = DiscoveryConfig {
            probe_timeout: Duration::from_millis(500),
            ..DiscoveryConfig::default()
        };
        DiscoveryEngine::new(registry, PanelClient::from_reqwest(reqwest::Client::new()), config)
    }

    async fn panel_server() -> (MockServer, IpAddr, u16) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let uri: url::Url = server.uri().parse().unwrap();
        let address = uri.host_str().unwrap().parse().unwrap();
        let port = uri.port().unwrap();
        (server, address, port)
    }

    #[tokio::test]
    async fn duplicate_announcements_register_once() {
        let (_server, address, port) = panel_server().await;
        let registry = Arc::new(DeviceRegistry::new());
        let engine = engine(Arc::clone(&registry));

        let announce = |model: Option<&str>| Announcement {
            instance: "Desk Shapes".to_owned(),
            address,
            port,
            model_hint: model.map(str::to_owned),
        };

        // Same instance announced twice, as a flaky network would.
        let new = engine
            .probe_and_register(vec![announce(None), announce(Some("NL52"))])
            .await;
        assert_eq!(new, 1);
        assert_eq!(registry.len(), 1);

        // A later pass over the same instance is a refresh, not a new device.
        let new = engine.probe_and_register(vec![announce(Some("NL52"))]).await;
        assert_eq!(new, 0);
    }

    #[tokio::test]
    async fn failed_probe_is_not_registered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let uri: url::Url = server.uri().parse().unwrap();

        let registry = Arc::new(DeviceRegistry::new());
        let engine = engine(Arc::clone(&registry));
        let new = engine
            .probe_and_register(vec![Announcement {
                instance: "Not A Panel".to_owned(),
                address: uri.host_str().unwrap().parse().unwrap(),
                port: uri.port().unwrap(),
                model_hint: None,
            }])
            .await;
        assert_eq!(new, 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn readdressed_device_keeps_identity() {
        let (_a, addr_a, port_a) = panel_server().await;
        let (_b, addr_b, port_b) = panel_server().await;
        let registry = Arc::new(DeviceRegistry::new());
        let engine = engine(Arc::clone(&registry));

        engine
            .probe_and_register(vec![Announcement {
                instance: "Desk Shapes".to_owned(),
                address: addr_a,
                port: port_a,
                model_hint: None,
            }])
            .await;
        engine
            .probe_and_register(vec![Announcement {
                instance: "Desk Shapes".to_owned(),
                address: addr_b,
                port: port_b,
                model_hint: None,
            }])
            .await;

        assert_eq!(registry.len(), 1);
        let record = registry.get(&PanelId::new("Desk Shapes")).unwrap();
        assert_eq!(record.endpoint, PanelEndpoint::new(addr_b, port_b));
    }
}
