// ── Network service seam ──
//
// Protocol daemons (telnet bridge, websocket bridge, HTTP, FTP, captive
// DNS) are provided by the host platform. The core decides *which* run
// and *when*; the backends own sockets and sessions. Calls must return
// promptly — `poll` does one bounded slice of housekeeping.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};
use thiserror::Error;

/// The service protocols the orchestrator knows about.
///
/// Display strings match the labels used in reports and in the
/// configuration surface's service list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Telnet,
    Websocket,
    #[strum(serialize = "HTTP")]
    Http,
    #[strum(serialize = "FTP")]
    Ftp,
    /// Captive address-resolution helper. Carried in the mask type but
    /// never started by mask-driven orchestration.
    #[strum(serialize = "DNS")]
    Dns,
}

impl ServiceKind {
    const fn bit(self) -> u8 {
        match self {
            Self::Telnet => 1 << 0,
            Self::Websocket => 1 << 1,
            Self::Http => 1 << 2,
            Self::Ftp => 1 << 3,
            Self::Dns => 1 << 4,
        }
    }
}

/// Set of services, one named flag per protocol.
///
/// The persisted and reported form is a bit set (`bits`/`from_bits`);
/// in code the flags stay named so call sites read without masking
/// arithmetic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMask {
    pub telnet: bool,
    pub websocket: bool,
    pub http: bool,
    pub ftp: bool,
    pub dns: bool,
}

impl ServiceMask {
    pub const NONE: Self = Self {
        telnet: false,
        websocket: false,
        http: false,
        ftp: false,
        dns: false,
    };

    pub const ALL: Self = Self {
        telnet: true,
        websocket: true,
        http: true,
        ftp: true,
        dns: true,
    };

    /// Decode from the wire/persisted bit set. Undefined bits are dropped.
    pub fn from_bits(bits: u8) -> Self {
        let mut mask = Self::NONE;
        for kind in ServiceKind::iter() {
            if bits & kind.bit() != 0 {
                mask.set(kind, true);
            }
        }
        mask
    }

    pub fn bits(self) -> u8 {
        ServiceKind::iter()
            .filter(|kind| self.contains(*kind))
            .fold(0, |acc, kind| acc | kind.bit())
    }

    pub fn contains(self, kind: ServiceKind) -> bool {
        match kind {
            ServiceKind::Telnet => self.telnet,
            ServiceKind::Websocket => self.websocket,
            ServiceKind::Http => self.http,
            ServiceKind::Ftp => self.ftp,
            ServiceKind::Dns => self.dns,
        }
    }

    pub fn set(&mut self, kind: ServiceKind, on: bool) {
        match kind {
            ServiceKind::Telnet => self.telnet = on,
            ServiceKind::Websocket => self.websocket = on,
            ServiceKind::Http => self.http = on,
            ServiceKind::Ftp => self.ftp = on,
            ServiceKind::Dns => self.dns = on,
        }
    }

    /// Keep only the flags also present in `other`.
    pub fn intersect(self, other: Self) -> Self {
        Self::from_bits(self.bits() & other.bits())
    }

    pub fn is_empty(self) -> bool {
        self.bits() == 0
    }

    /// Kinds present in this mask, in fixed protocol order.
    pub fn kinds(self) -> impl Iterator<Item = ServiceKind> {
        ServiceKind::iter().filter(move |kind| self.contains(*kind))
    }

    /// Comma-separated labels, the form the configuration surface shows
    /// for a bitfield setting.
    pub fn label_list(self) -> String {
        self.kinds()
            .map(|kind| kind.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for ServiceMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&self.label_list())
        }
    }
}

/// Failure starting a service backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("failed to bind port {port}")]
    Bind { port: u16 },
    #[error("service backend fault: {0}")]
    Backend(String),
}

/// A host-provided protocol daemon managed by the orchestrator.
pub trait NetService: Send {
    fn kind(&self) -> ServiceKind;

    /// Bring the listener up on `port`. Idempotence is not required; the
    /// orchestrator never double-starts an entry.
    fn init(&mut self, port: u16) -> Result<(), ServiceError>;

    /// Tear the listener down, dropping any sessions.
    fn stop(&mut self);

    /// One bounded slice of background work (session upkeep, timeouts).
    fn poll(&mut self);

    /// Close all open client connections, keeping the listener alive.
    fn close_connections(&mut self);
}
