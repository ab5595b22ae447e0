// ── Radio driver seam ──
//
// The core never talks to wireless hardware directly. A platform backend
// implements `RadioDriver` and feeds `RadioEvent`s into the channel the
// core hands it at wiring time. Every trait method either completes its
// work before returning or merely *requests* an operation whose outcome
// arrives later as an event; none of them may block for network time.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use crate::types::{IpMode, MacAddr, Role, WifiMode};

/// IPv4 addressing applied to one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addressing {
    pub mode: IpMode,
    pub ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub mask: Ipv4Addr,
}

/// Access-point personality applied when the AP role is brought up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApProfile {
    pub ssid: String,
    /// `None` runs the AP open; otherwise WPA2-PSK with this passphrase.
    pub passphrase: Option<String>,
    pub max_clients: u8,
}

/// Security in use by a scanned network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum SecurityKind {
    Open,
    #[strum(serialize = "WEP")]
    Wep,
    #[strum(serialize = "WPA-PSK")]
    WpaPsk,
    #[strum(serialize = "WPA2-PSK")]
    Wpa2Psk,
    #[strum(serialize = "WPA3-PSK")]
    Wpa3Psk,
    Enterprise,
    Unknown,
}

/// One network observed by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub ssid: String,
    /// Received signal strength in dBm.
    pub rssi: i8,
    pub security: SecurityKind,
}

/// Why an established or attempted station link went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The peer or the stack tore down an established association.
    ConnectionLost,
    /// Authentication or key exchange failed.
    AuthFailed,
    /// No access point matching the configured SSID was found.
    SsidNotFound,
    /// Stack-specific code with no portable meaning.
    Other(u16),
}

/// Asynchronous completions delivered by the radio backend.
///
/// These are the only way radio outcomes reach the core; trait calls
/// never report link results directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// Station association completed and addressing is live.
    LinkAcquired { ip: Ipv4Addr },
    /// Station link lost or association attempt failed.
    LinkLost { reason: DisconnectReason },
    /// Access-point role finished coming up.
    ApStarted,
    /// A client joined the local access point.
    ApClientJoined { mac: MacAddr },
    /// A client left the local access point.
    ApClientLeft { mac: MacAddr },
    /// A previously requested scan finished.
    ScanComplete { records: Vec<ScanRecord> },
}

/// Failure surfaced by a `RadioDriver` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    /// The operation is not valid in the radio's current state.
    #[error("radio rejected the operation in its current state")]
    InvalidState,
    /// The backend could not apply the requested configuration.
    #[error("radio configuration not applied: {0}")]
    Config(String),
    /// Anything else the underlying stack reports.
    #[error("radio stack fault: {0}")]
    Stack(String),
}

/// Platform wireless backend.
///
/// Implementations must be cheap to call from an async task: do the work
/// synchronously if it is bounded, otherwise kick it off and report the
/// outcome through a `RadioEvent`.
pub trait RadioDriver: Send + Sync {
    /// Select the operating role. Called before per-role configuration.
    fn configure_role(&self, mode: WifiMode) -> Result<(), RadioError>;

    /// Apply IPv4 addressing to one sub-interface.
    fn set_addressing(&self, role: Role, addressing: &Addressing) -> Result<(), RadioError>;

    /// Apply SSID/credentials for the local access point.
    fn configure_access_point(&self, profile: &ApProfile) -> Result<(), RadioError>;

    /// Set the hostname advertised by one sub-interface.
    fn set_hostname(&self, role: Role, hostname: &str) -> Result<(), RadioError>;

    /// Start the configured role(s). Link outcomes arrive as events.
    fn bring_up(&self) -> Result<(), RadioError>;

    /// Stop the radio entirely. No further events are expected after this.
    fn power_down(&self) -> Result<(), RadioError>;

    /// Begin associating the station role with a network.
    fn associate(&self, ssid: &str, passphrase: &str) -> Result<(), RadioError>;

    /// Request teardown of the current station association, if any.
    fn disassociate(&self) -> Result<(), RadioError>;

    /// Remove station credentials from the stack so it cannot re-associate
    /// on its own.
    fn clear_station_credentials(&self) -> Result<(), RadioError>;

    /// Request an asynchronous network scan; completion is a
    /// `RadioEvent::ScanComplete`.
    fn start_scan(&self) -> Result<(), RadioError>;

    /// Hardware address of the station interface.
    fn mac_address(&self) -> MacAddr;
}
