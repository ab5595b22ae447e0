// ── Core error types ──
//
// User-facing errors from airlink-core. Callers never see backend codes
// directly; `From` impls translate seam-level failures into the domain
// taxonomy. Per-setting validation failures carry the offending value so
// the configuration surface can echo it.

use airlink_hal::{RadioError, ServiceError, StoreError};
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum Error {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("Invalid IPv4 address: {value}")]
    InvalidFormat { value: String },

    #[error("Setting not handled by this module")]
    Unhandled,

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("WiFi start failed: {reason}")]
    StartFailed { reason: String },

    #[error("WiFi is not running")]
    NotRunning,

    // ── Shared-resource errors ───────────────────────────────────────
    #[error("Resource is busy; try again")]
    Unavailable,

    // ── Wrapped seam failures ────────────────────────────────────────
    #[error("Settings storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Radio driver error: {0}")]
    Radio(#[from] RadioError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    pub(crate) fn start_failed(reason: impl Into<String>) -> Self {
        Self::StartFailed {
            reason: reason.into(),
        }
    }
}
