// ── Shared primitive types ──
//
// Small value types used on both sides of the platform seam. The core
// crate builds its settings and state models out of these; driver and
// service backends consume them directly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Operating role of the radio.
///
/// Discriminants match the persisted representation and the order the
/// configuration surface presents the choices in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum WifiMode {
    /// Radio disabled.
    #[default]
    Off = 0,
    /// Client of an external access point.
    Station = 1,
    /// Standalone access point.
    #[strum(serialize = "Access Point")]
    AccessPoint = 2,
    /// Access point and station concurrently (commissioning mode).
    #[strum(serialize = "Access Point/Station")]
    ApSta = 3,
}

impl WifiMode {
    /// Whether this mode includes the station (client) sub-interface.
    pub fn has_station(self) -> bool {
        matches!(self, Self::Station | Self::ApSta)
    }

    /// Whether this mode includes the access-point sub-interface.
    pub fn has_access_point(self) -> bool {
        matches!(self, Self::AccessPoint | Self::ApSta)
    }

    /// Decode from the persisted representation.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::Station),
            2 => Some(Self::AccessPoint),
            3 => Some(Self::ApSta),
            _ => None,
        }
    }
}

/// One of the two sub-interfaces a dual-capable radio exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Station,
    #[strum(serialize = "Access Point")]
    AccessPoint,
}

/// How an interface obtains its IPv4 addressing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum IpMode {
    /// Fixed address from settings.
    Static = 0,
    /// Leased from a DHCP server.
    #[default]
    #[strum(serialize = "DHCP")]
    Dhcp = 1,
    /// Link-local self-assignment.
    #[strum(serialize = "AutoIP")]
    Auto = 2,
}

impl IpMode {
    /// Decode from the persisted representation.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Static),
            1 => Some(Self::Dhcp),
            2 => Some(Self::Auto),
            _ => None,
        }
    }
}

/// 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Error parsing a textual MAC address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address: {0}")]
pub struct MacAddrParseError(String);

impl FromStr for MacAddr {
    type Err = MacAddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in &mut octets {
            let part = parts
                .next()
                .ok_or_else(|| MacAddrParseError(s.to_string()))?;
            *octet =
                u8::from_str_radix(part, 16).map_err(|_| MacAddrParseError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(MacAddrParseError(s.to_string()));
        }
        Ok(Self(octets))
    }
}
