// ── WiFi settings model ──
//
// The in-memory settings tree: one persisted struct covering radio mode,
// per-role network endpoints and credentials. Field bounds mirror the
// configuration surface (`x(64)` strings for SSIDs and hostnames,
// `x(32)` for passphrases and passwords); the binary record layout in
// `record` depends on them.

use std::net::Ipv4Addr;

use airlink_hal::{Addressing, IpMode, Role, ServiceKind, ServiceMask, WifiMode};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub mod record;
pub mod registry;
pub mod vault;

// ── Field bounds ──
pub const SSID_MAX_LEN: usize = 64;
pub const PASSPHRASE_MAX_LEN: usize = 32;
pub const HOSTNAME_MAX_LEN: usize = 64;
pub const PASSWORD_MAX_LEN: usize = 32;

// ── Factory defaults ──
pub const DEFAULT_HOSTNAME: &str = "airlink";
pub const DEFAULT_AP_HOSTNAME: &str = "airlinkAP";
pub const DEFAULT_AP_SSID: &str = "AIRLINK";
/// Minimum 8 characters, or blank for an open access point.
pub const DEFAULT_AP_PASSPHRASE: &str = "airlinkSetup";
pub const DEFAULT_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 5, 1);
pub const DEFAULT_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 5, 1);
pub const DEFAULT_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
pub const DEFAULT_TELNET_PORT: u16 = 23;
pub const DEFAULT_FTP_PORT: u16 = 21;
pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_WEBSOCKET_PORT: u16 = 81;

/// Network endpoint configuration for one radio role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub ip_mode: IpMode,
    pub ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub hostname: String,
    pub telnet_port: u16,
    pub http_port: u16,
    pub ftp_port: u16,
    pub websocket_port: u16,
    pub services: ServiceMask,
}

impl EndpointConfig {
    /// The addressing block handed to the radio driver.
    pub fn addressing(&self) -> Addressing {
        Addressing {
            mode: self.ip_mode,
            ip: self.ip,
            gateway: self.gateway,
            mask: self.mask,
        }
    }

    /// Configured port for a service, falling back to the protocol
    /// default when unset (zero).
    pub fn port_for(&self, kind: ServiceKind) -> u16 {
        let (configured, fallback) = match kind {
            ServiceKind::Telnet => (self.telnet_port, DEFAULT_TELNET_PORT),
            ServiceKind::Http => (self.http_port, DEFAULT_HTTP_PORT),
            ServiceKind::Ftp => (self.ftp_port, DEFAULT_FTP_PORT),
            ServiceKind::Websocket => (self.websocket_port, DEFAULT_WEBSOCKET_PORT),
            // The DNS helper answers on the protocol's fixed port.
            ServiceKind::Dns => (53, 53),
        };
        if configured == 0 { fallback } else { configured }
    }
}

/// Credentials plus endpoint for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiProfile {
    pub ssid: String,
    pub passphrase: String,
    pub network: EndpointConfig,
}

/// The complete persisted WiFi settings tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiSettings {
    pub mode: WifiMode,
    pub sta: WifiProfile,
    pub ap: WifiProfile,
    pub admin_password: String,
    pub user_password: String,
}

impl WifiSettings {
    /// Factory defaults: access-point mode with a usable commissioning
    /// network, station profile blank, all permitted services enabled.
    pub fn defaults(allowed_services: ServiceMask) -> Self {
        let endpoint = |ip_mode: IpMode, hostname: &str| EndpointConfig {
            ip_mode,
            ip: DEFAULT_IP,
            gateway: DEFAULT_GATEWAY,
            mask: DEFAULT_NETMASK,
            hostname: hostname.to_string(),
            telnet_port: DEFAULT_TELNET_PORT,
            http_port: DEFAULT_HTTP_PORT,
            ftp_port: DEFAULT_FTP_PORT,
            websocket_port: DEFAULT_WEBSOCKET_PORT,
            services: allowed_services,
        };

        Self {
            mode: WifiMode::AccessPoint,
            sta: WifiProfile {
                ssid: String::new(),
                passphrase: String::new(),
                network: endpoint(IpMode::Dhcp, DEFAULT_HOSTNAME),
            },
            ap: WifiProfile {
                ssid: DEFAULT_AP_SSID.to_string(),
                passphrase: DEFAULT_AP_PASSPHRASE.to_string(),
                network: endpoint(IpMode::Static, DEFAULT_AP_HOSTNAME),
            },
            admin_password: String::new(),
            user_password: String::new(),
        }
    }

    pub fn profile(&self, role: Role) -> &WifiProfile {
        match role {
            Role::Station => &self.sta,
            Role::AccessPoint => &self.ap,
        }
    }

    pub fn profile_mut(&mut self, role: Role) -> &mut WifiProfile {
        match role {
            Role::Station => &mut self.sta,
            Role::AccessPoint => &mut self.ap,
        }
    }

    /// Drop service flags the platform does not permit. Applied after
    /// every load so a stale record cannot enable absent services.
    pub fn clamp_services(&mut self, allowed_services: ServiceMask) {
        self.sta.network.services = self.sta.network.services.intersect(allowed_services);
        self.ap.network.services = self.ap.network.services.intersect(allowed_services);
    }
}

/// Length check shared by the facade and the lifecycle validators.
pub(crate) fn check_len(value: &str, max: usize, what: &str) -> Result<(), Error> {
    if value.len() > max {
        return Err(Error::config(format!(
            "{what} exceeds {max} bytes: {value:?}"
        )));
    }
    Ok(())
}
