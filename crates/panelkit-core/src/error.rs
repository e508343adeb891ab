// ── Error taxonomy ──

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::PanelId;

/// Why a device failed to pair within a pairing batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingFailure {
    /// The device answered but its on-device pairing window was not open.
    #[error("device is not in pairing mode")]
    NotInPairingMode,
    /// No response within the per-call timeout.
    #[error("device unreachable")]
    Unreachable,
    /// The device answered with something the protocol does not allow.
    #[error("protocol error")]
    ProtocolError,
    /// The batch window closed before the device paired.
    #[error("pairing window expired")]
    WindowExpired,
}

impl PairingFailure {
    pub fn classify(err: &panelkit_api::Error) -> Self {
        match err {
            panelkit_api::Error::NotInPairingMode { .. } => Self::NotInPairingMode,
            e if e.is_unreachable() => Self::Unreachable,
            _ => Self::ProtocolError,
        }
    }

    /// Failures worth another attempt while the window is still open.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::NotInPairingMode | Self::Unreachable)
    }
}

/// Why a command failed to reach one device during dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchFailure {
    /// The device did not answer in time (includes connect failures).
    #[error("command timed out")]
    Timeout,
    /// The stored token was rejected; the device needs re-pairing.
    #[error("auth token rejected")]
    Unauthorized,
    /// The device answered with an unexpected status.
    #[error("device returned HTTP {status}")]
    HttpError { status: u16 },
    /// The dispatch was cancelled before the command was sent.
    #[error("dispatch cancelled")]
    Cancelled,
}

impl DispatchFailure {
    pub fn classify(err: &panelkit_api::Error) -> Self {
        match err {
            panelkit_api::Error::Unauthorized => Self::Unauthorized,
            panelkit_api::Error::Api { status } => Self::HttpError { status: *status },
            _ => Self::Timeout,
        }
    }

    /// Only transport-level silence earns a retry; a rejected token or an
    /// explicit error status would just repeat.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Top-level error for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown device: {id}")]
    UnknownDevice { id: PanelId },

    #[error("no devices selected")]
    EmptySelection,

    #[error("invalid pairing transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: PanelId,
        from: &'static str,
        to: &'static str,
    },

    /// The caller dropped the proceed handle without confirming.
    #[error("pairing batch aborted before proceed")]
    PairingAborted,

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error(transparent)]
    Api(#[from] panelkit_api::Error),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pairing_failure_classification() {
        let err = panelkit_api::Error::NotInPairingMode { status: 403 };
        assert_eq!(PairingFailure::classify(&err), PairingFailure::NotInPairingMode);

        let err = panelkit_api::Error::Api { status: 500 };
        assert_eq!(PairingFailure::classify(&err), PairingFailure::ProtocolError);
    }

    #[test]
    fn dispatch_failure_classification() {
        assert_eq!(
            DispatchFailure::classify(&panelkit_api::Error::Unauthorized),
            DispatchFailure::Unauthorized
        );
        assert_eq!(
            DispatchFailure::classify(&panelkit_api::Error::Api { status: 503 }),
            DispatchFailure::HttpError { status: 503 }
        );
    }

    #[test]
    fn retry_budget_excludes_auth_failures() {
        assert!(DispatchFailure::Timeout.is_retryable());
        assert!(!DispatchFailure::Unauthorized.is_retryable());
        assert!(!DispatchFailure::HttpError { status: 500 }.is_retryable());
        assert!(!DispatchFailure::Cancelled.is_retryable());

        assert!(PairingFailure::NotInPairingMode.is_retryable());
        assert!(PairingFailure::Unreachable.is_retryable());
        assert!(!PairingFailure::ProtocolError.is_retryable());
        assert!(!PairingFailure::WindowExpired.is_retryable());
    }
}
