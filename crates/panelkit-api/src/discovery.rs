//! mDNS browsing for panel service announcements.
//!
//! Panels announce themselves under a well-known service type; each
//! resolved announcement carries the endpoint plus TXT-record hints
//! (model SKU, device id). This module only surfaces raw announcements --
//! dedup, describe probing, and quiescence policy live in panelkit-core.

use std::net::IpAddr;

use mdns_sd::{Receiver, ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, warn};

use crate::error::Error;

/// mDNS service type panels announce under.
pub const SERVICE_TYPE: &str = "_nanoleafapi._tcp.local.";

/// One resolved service announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// Service instance name -- stable across address changes, which makes
    /// it the preferred network identity.
    pub instance: String,
    pub address: IpAddr,
    pub port: u16,
    /// Model SKU hint from the `md` TXT record, if announced.
    pub model_hint: Option<String>,
}

/// Active browse session over the panel service type.
///
/// Yields announcements until stopped; the daemon is shut down on drop.
pub struct ServiceBrowser {
    daemon: ServiceDaemon,
    events: Receiver<ServiceEvent>,
}

impl ServiceBrowser {
    /// Start browsing for panel announcements.
    pub fn new() -> Result<Self, Error> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| Error::ServiceDiscovery(format!("failed to create mDNS daemon: {e}")))?;
        let events = daemon
            .browse(SERVICE_TYPE)
            .map_err(|e| Error::ServiceDiscovery(format!("failed to start browse: {e}")))?;
        Ok(Self { daemon, events })
    }

    /// Wait for the next resolved announcement.
    ///
    /// Returns `None` once the browse channel closes. Announcements that
    /// resolve without any address are logged and skipped -- one broken
    /// announcement never ends the session.
    pub async fn next(&self) -> Option<Announcement> {
        loop {
            match self.events.recv_async().await {
                Ok(ServiceEvent::ServiceResolved(info)) => {
                    if let Some(announcement) = announcement_from_info(&info) {
                        debug!(
                            instance = %announcement.instance,
                            endpoint = %format!("{}:{}", announcement.address, announcement.port),
                            "resolved panel announcement"
                        );
                        return Some(announcement);
                    }
                    warn!(
                        fullname = info.get_fullname(),
                        "announcement resolved without a usable address -- skipping"
                    );
                }
                Ok(_) => {}
                Err(_) => return None,
            }
        }
    }
}

impl Drop for ServiceBrowser {
    fn drop(&mut self) {
        let _ = self.daemon.stop_browse(SERVICE_TYPE);
        if let Err(e) = self.daemon.shutdown() {
            tracing::trace!(error = %e, "mDNS daemon shutdown error (expected on normal exit)");
        }
    }
}

/// Build an [`Announcement`] from resolved service info.
///
/// Prefers an IPv4 address when the device announces both families.
fn announcement_from_info(info: &ServiceInfo) -> Option<Announcement> {
    let addresses = info.get_addresses();
    let address = addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.iter().next())
        .copied()?;

    Some(Announcement {
        instance: instance_from_fullname(info.get_fullname()),
        address,
        port: info.get_port(),
        model_hint: info.get_property_val_str("md").map(str::to_owned),
    })
}

/// Strip the service-type suffix from a fullname, leaving the instance name.
fn instance_from_fullname(fullname: &str) -> String {
    fullname
        .strip_suffix(SERVICE_TYPE)
        .map_or(fullname, |s| s.trim_end_matches('.'))
        .to_owned()
}
