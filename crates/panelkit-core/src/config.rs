// ── Runtime tunables ──
//
// Every timing knob the engines use lives here, so integration tests can
// scale the whole system down to millisecond budgets.

use std::time::Duration;

use panelkit_api::TransportConfig;

/// Discovery timing.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Stop browsing once no new announcement has arrived for this long.
    pub quiescence: Duration,
    /// Hard cap on a single browse pass, quiescent or not.
    pub cap: Duration,
    /// Per-endpoint budget for the describe probe.
    pub probe_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            quiescence: Duration::from_secs(5),
            cap: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

/// Pairing batch timing.
#[derive(Debug, Clone)]
pub struct PairingConfig {
    /// Budget for one token request to one device.
    pub call_timeout: Duration,
    /// Token request attempts per device within the window.
    pub attempts: u32,
    /// Pause between attempts to the same device.
    pub backoff: Duration,
    /// Batch window when the caller does not pass one.
    pub default_window: Duration,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            attempts: 3,
            backoff: Duration::from_secs(2),
            default_window: Duration::from_secs(30),
        }
    }
}

/// Dispatch rate gates and retry timing.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Minimum spacing between any two outbound commands.
    pub global_interval: Duration,
    /// Minimum spacing between two commands to the same device.
    pub device_interval: Duration,
    /// Budget for one command round trip.
    pub call_timeout: Duration,
    /// Pause before the single retry of a timed-out command.
    pub retry_backoff: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            global_interval: Duration::from_millis(100),
            device_interval: Duration::from_millis(300),
            call_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// Full tunable set for the core engines.
#[derive(Debug, Clone, Default)]
pub struct Tunables {
    pub discovery: DiscoveryConfig,
    pub pairing: PairingConfig,
    pub dispatch: DispatchConfig,
    pub transport: TransportConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_device_gate_wider_than_global() {
        let t = Tunables::default();
        assert!(t.dispatch.device_interval > t.dispatch.global_interval);
        assert!(t.discovery.cap >= t.discovery.quiescence);
    }
}
