// ── Configuration facade ──
//
// The surface the host's generic settings registry binds to: a static
// descriptor table (groups, labels, formats, bounds) plus typed get/set
// entry points grouped by format family, the way the registry dispatches
// them. Setters validate and mutate the in-memory settings only;
// persistence happens on the explicit group-level `save`.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};

use airlink_hal::{ServiceMask, WifiMode};
use strum::{Display, EnumIter, IntoEnumIterator};
use tracing::debug;

use super::vault::SettingsVault;
use super::{
    HOSTNAME_MAX_LEN, PASSPHRASE_MAX_LEN, PASSWORD_MAX_LEN, SSID_MAX_LEN, WifiSettings, check_len,
};
use crate::error::Error;

/// Identifies one setting in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum SettingId {
    Mode,
    StaSsid,
    StaPassphrase,
    Hostname,
    IpAddress,
    Gateway,
    Netmask,
    ApSsid,
    ApPassphrase,
    ApHostname,
    ApIpAddress,
    ApGateway,
    ApNetmask,
    NetworkServices,
    TelnetPort,
    HttpPort,
    FtpPort,
    WebsocketPort,
    AdminPassword,
    UserPassword,
}

/// Grouping nodes of the settings tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum SettingGroup {
    General,
    Networking,
    NetworkingWifi,
}

impl SettingGroup {
    pub fn label(self) -> &'static str {
        match self {
            Self::General => "General",
            Self::Networking => "Networking",
            Self::NetworkingWifi => "WiFi",
        }
    }

    /// Parent node; `None` means the group hangs off the root.
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::General | Self::Networking => None,
            Self::NetworkingWifi => Some(Self::Networking),
        }
    }
}

/// Value shape of a setting, as the registry renders and parses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingFormat {
    Text { max: usize },
    Password { max: usize },
    Ipv4,
    Integer { min: u32, max: u32 },
    /// Index into the option list returned by
    /// [`WifiConfig::format_options`].
    RadioChoice,
    /// Bit set; option labels come from the platform's allowed services.
    Bitfield,
}

/// Registry metadata for one setting.
#[derive(Debug, Clone, Copy)]
pub struct SettingDescriptor {
    pub id: SettingId,
    pub group: SettingGroup,
    pub label: &'static str,
    pub format: SettingFormat,
    pub description: &'static str,
    /// The running system does not re-read this value; it takes effect
    /// on the next start.
    pub reboot_required: bool,
}

const PORT: SettingFormat = SettingFormat::Integer { min: 1, max: 65535 };

static DESCRIPTORS: &[SettingDescriptor] = &[
    SettingDescriptor {
        id: SettingId::NetworkServices,
        group: SettingGroup::Networking,
        label: "Network Services",
        format: SettingFormat::Bitfield,
        description: "Network services to enable. Consult driver documentation for availability.",
        reboot_required: true,
    },
    SettingDescriptor {
        id: SettingId::AdminPassword,
        group: SettingGroup::General,
        label: "Admin Password",
        format: SettingFormat::Password { max: PASSWORD_MAX_LEN },
        description: "Administrator password.",
        reboot_required: false,
    },
    SettingDescriptor {
        id: SettingId::UserPassword,
        group: SettingGroup::General,
        label: "User Password",
        format: SettingFormat::Password { max: PASSWORD_MAX_LEN },
        description: "User password.",
        reboot_required: false,
    },
    SettingDescriptor {
        id: SettingId::StaSsid,
        group: SettingGroup::NetworkingWifi,
        label: "WiFi Station (STA) SSID",
        format: SettingFormat::Text { max: SSID_MAX_LEN },
        description: "WiFi Station (STA) SSID.",
        reboot_required: false,
    },
    SettingDescriptor {
        id: SettingId::StaPassphrase,
        group: SettingGroup::NetworkingWifi,
        label: "WiFi Station (STA) Password",
        format: SettingFormat::Password { max: PASSPHRASE_MAX_LEN },
        description: "WiFi Station (STA) Password.",
        reboot_required: false,
    },
    SettingDescriptor {
        id: SettingId::Hostname,
        group: SettingGroup::Networking,
        label: "Hostname",
        format: SettingFormat::Text { max: HOSTNAME_MAX_LEN },
        description: "Network hostname.",
        reboot_required: true,
    },
    SettingDescriptor {
        id: SettingId::IpAddress,
        group: SettingGroup::Networking,
        label: "IP Address",
        format: SettingFormat::Ipv4,
        description: "Static IP address.",
        reboot_required: true,
    },
    SettingDescriptor {
        id: SettingId::Gateway,
        group: SettingGroup::Networking,
        label: "Gateway",
        format: SettingFormat::Ipv4,
        description: "Static gateway address.",
        reboot_required: true,
    },
    SettingDescriptor {
        id: SettingId::Netmask,
        group: SettingGroup::Networking,
        label: "Netmask",
        format: SettingFormat::Ipv4,
        description: "Static netmask.",
        reboot_required: true,
    },
    SettingDescriptor {
        id: SettingId::Mode,
        group: SettingGroup::NetworkingWifi,
        label: "WiFi Mode",
        format: SettingFormat::RadioChoice,
        description: "WiFi Mode.",
        reboot_required: false,
    },
    SettingDescriptor {
        id: SettingId::ApSsid,
        group: SettingGroup::NetworkingWifi,
        label: "WiFi Access Point (AP) SSID",
        format: SettingFormat::Text { max: SSID_MAX_LEN },
        description: "WiFi Access Point (AP) SSID.",
        reboot_required: false,
    },
    SettingDescriptor {
        id: SettingId::ApPassphrase,
        group: SettingGroup::NetworkingWifi,
        label: "WiFi Access Point (AP) Password",
        format: SettingFormat::Password { max: PASSPHRASE_MAX_LEN },
        description: "WiFi Access Point (AP) Password.",
        reboot_required: false,
    },
    SettingDescriptor {
        id: SettingId::ApHostname,
        group: SettingGroup::Networking,
        label: "Hostname (AP)",
        format: SettingFormat::Text { max: HOSTNAME_MAX_LEN },
        description: "Network hostname.",
        reboot_required: true,
    },
    SettingDescriptor {
        id: SettingId::ApIpAddress,
        group: SettingGroup::Networking,
        label: "IP Address (AP)",
        format: SettingFormat::Ipv4,
        description: "Static IP address.",
        reboot_required: true,
    },
    SettingDescriptor {
        id: SettingId::ApGateway,
        group: SettingGroup::Networking,
        label: "Gateway (AP)",
        format: SettingFormat::Ipv4,
        description: "Static gateway address.",
        reboot_required: true,
    },
    SettingDescriptor {
        id: SettingId::ApNetmask,
        group: SettingGroup::Networking,
        label: "Netmask (AP)",
        format: SettingFormat::Ipv4,
        description: "Static netmask.",
        reboot_required: true,
    },
    SettingDescriptor {
        id: SettingId::TelnetPort,
        group: SettingGroup::Networking,
        label: "Telnet port",
        format: PORT,
        description: "(Raw) Telnet port number listening for incoming connections.",
        reboot_required: true,
    },
    SettingDescriptor {
        id: SettingId::HttpPort,
        group: SettingGroup::Networking,
        label: "HTTP port",
        format: PORT,
        description: "HTTP port number listening for incoming connections.",
        reboot_required: true,
    },
    SettingDescriptor {
        id: SettingId::FtpPort,
        group: SettingGroup::Networking,
        label: "FTP port",
        format: PORT,
        description: "FTP port number listening for incoming connections.",
        reboot_required: true,
    },
    SettingDescriptor {
        id: SettingId::WebsocketPort,
        group: SettingGroup::Networking,
        label: "Websocket port",
        format: PORT,
        description: "Websocket port number listening for incoming connections.",
        reboot_required: true,
    },
];

/// The full descriptor table, one row per [`SettingId`].
pub fn descriptors() -> &'static [SettingDescriptor] {
    DESCRIPTORS
}

pub fn descriptor(id: SettingId) -> &'static SettingDescriptor {
    // The table is complete by construction; the coverage test pins it.
    DESCRIPTORS
        .iter()
        .find(|d| d.id == id)
        .unwrap_or(&DESCRIPTORS[0])
}

struct ConfigInner {
    settings: Mutex<WifiSettings>,
    vault: SettingsVault,
    allowed_services: ServiceMask,
}

/// Shared handle to the in-memory settings plus their vault.
///
/// Clones are cheap and refer to the same settings; the lock inside is
/// held only for the duration of a single get or set.
#[derive(Clone)]
pub struct WifiConfig {
    inner: Arc<ConfigInner>,
}

impl WifiConfig {
    /// Load settings from the vault and wrap them for shared access.
    pub fn load(vault: SettingsVault, allowed_services: ServiceMask) -> Self {
        let settings = vault.load();
        Self {
            inner: Arc::new(ConfigInner {
                settings: Mutex::new(settings),
                vault,
                allowed_services,
            }),
        }
    }

    /// Service bits the platform supports at all.
    pub fn allowed_services(&self) -> ServiceMask {
        self.inner.allowed_services
    }

    /// Clone of the current settings tree.
    pub fn snapshot(&self) -> WifiSettings {
        self.with(Clone::clone)
    }

    // ── Typed accessors ──────────────────────────────────────────────

    pub fn mode(&self) -> WifiMode {
        self.with(|s| s.mode)
    }

    pub fn set_mode(&self, mode: WifiMode) {
        self.with_mut(|s| s.mode = mode);
    }

    /// Enabled services on the station endpoint, clamped to the allowed
    /// set.
    pub fn services(&self) -> ServiceMask {
        self.with(|s| s.sta.network.services)
            .intersect(self.inner.allowed_services)
    }

    /// Enable services on both endpoints. Bits outside the allowed set
    /// are dropped without an error.
    pub fn set_services(&self, mask: ServiceMask) {
        let clamped = mask.intersect(self.inner.allowed_services);
        if clamped != mask {
            debug!(requested = %mask, applied = %clamped, "service mask clamped");
        }
        self.with_mut(|s| {
            s.sta.network.services = clamped;
            s.ap.network.services = clamped;
        });
    }

    // ── Format-family entry points ───────────────────────────────────

    /// Set a string-valued setting. Length bounds are enforced; content
    /// is not interpreted.
    pub fn set_text(&self, id: SettingId, value: &str) -> Result<(), Error> {
        match id {
            SettingId::StaSsid => self.put_text(value, SSID_MAX_LEN, "SSID", |s, v| s.sta.ssid = v),
            SettingId::ApSsid => self.put_text(value, SSID_MAX_LEN, "SSID", |s, v| s.ap.ssid = v),
            SettingId::StaPassphrase => {
                self.put_text(value, PASSPHRASE_MAX_LEN, "passphrase", |s, v| {
                    s.sta.passphrase = v;
                })
            }
            SettingId::ApPassphrase => {
                self.put_text(value, PASSPHRASE_MAX_LEN, "passphrase", |s, v| {
                    s.ap.passphrase = v;
                })
            }
            SettingId::Hostname => self.put_text(value, HOSTNAME_MAX_LEN, "hostname", |s, v| {
                s.sta.network.hostname = v;
            }),
            SettingId::ApHostname => self.put_text(value, HOSTNAME_MAX_LEN, "hostname", |s, v| {
                s.ap.network.hostname = v;
            }),
            SettingId::AdminPassword => self.put_text(value, PASSWORD_MAX_LEN, "password", |s, v| {
                s.admin_password = v;
            }),
            SettingId::UserPassword => self.put_text(value, PASSWORD_MAX_LEN, "password", |s, v| {
                s.user_password = v;
            }),
            _ => Err(Error::Unhandled),
        }
    }

    pub fn text(&self, id: SettingId) -> Result<String, Error> {
        self.with(|s| match id {
            SettingId::StaSsid => Ok(s.sta.ssid.clone()),
            SettingId::ApSsid => Ok(s.ap.ssid.clone()),
            SettingId::StaPassphrase => Ok(s.sta.passphrase.clone()),
            SettingId::ApPassphrase => Ok(s.ap.passphrase.clone()),
            SettingId::Hostname => Ok(s.sta.network.hostname.clone()),
            SettingId::ApHostname => Ok(s.ap.network.hostname.clone()),
            SettingId::AdminPassword => Ok(s.admin_password.clone()),
            SettingId::UserPassword => Ok(s.user_password.clone()),
            _ => Err(Error::Unhandled),
        })
    }

    /// Set an IPv4-valued setting from its textual form. A value that
    /// does not parse as a strict dotted quad leaves the stored address
    /// untouched.
    pub fn set_ipv4(&self, id: SettingId, value: &str) -> Result<(), Error> {
        let addr: Ipv4Addr = value.parse().map_err(|_| Error::InvalidFormat {
            value: value.to_string(),
        })?;
        self.with_mut(|s| match id {
            SettingId::IpAddress => {
                s.sta.network.ip = addr;
                Ok(())
            }
            SettingId::Gateway => {
                s.sta.network.gateway = addr;
                Ok(())
            }
            SettingId::Netmask => {
                s.sta.network.mask = addr;
                Ok(())
            }
            SettingId::ApIpAddress => {
                s.ap.network.ip = addr;
                Ok(())
            }
            SettingId::ApGateway => {
                s.ap.network.gateway = addr;
                Ok(())
            }
            SettingId::ApNetmask => {
                s.ap.network.mask = addr;
                Ok(())
            }
            _ => Err(Error::Unhandled),
        })
    }

    pub fn ipv4(&self, id: SettingId) -> Result<String, Error> {
        self.with(|s| match id {
            SettingId::IpAddress => Ok(s.sta.network.ip.to_string()),
            SettingId::Gateway => Ok(s.sta.network.gateway.to_string()),
            SettingId::Netmask => Ok(s.sta.network.mask.to_string()),
            SettingId::ApIpAddress => Ok(s.ap.network.ip.to_string()),
            SettingId::ApGateway => Ok(s.ap.network.gateway.to_string()),
            SettingId::ApNetmask => Ok(s.ap.network.mask.to_string()),
            _ => Err(Error::Unhandled),
        })
    }

    /// Set an integer-valued setting. Ports apply to both endpoints;
    /// range policy beyond `u16` lives in the registry metadata. The
    /// service mask is intersected with the allowed set silently.
    pub fn set_int(&self, id: SettingId, value: u32) -> Result<(), Error> {
        match id {
            SettingId::NetworkServices => {
                let bits = u8::try_from(value & 0xFF).unwrap_or(0);
                self.set_services(ServiceMask::from_bits(bits));
                Ok(())
            }
            SettingId::Mode => {
                let mode = u8::try_from(value)
                    .ok()
                    .and_then(WifiMode::from_u8)
                    .ok_or_else(|| Error::config(format!("invalid WiFi mode index: {value}")))?;
                self.set_mode(mode);
                Ok(())
            }
            SettingId::TelnetPort
            | SettingId::HttpPort
            | SettingId::FtpPort
            | SettingId::WebsocketPort => {
                let port = u16::try_from(value)
                    .map_err(|_| Error::config(format!("port out of range: {value}")))?;
                self.with_mut(|s| {
                    for network in [&mut s.sta.network, &mut s.ap.network] {
                        match id {
                            SettingId::TelnetPort => network.telnet_port = port,
                            SettingId::HttpPort => network.http_port = port,
                            SettingId::FtpPort => network.ftp_port = port,
                            _ => network.websocket_port = port,
                        }
                    }
                });
                Ok(())
            }
            _ => Err(Error::Unhandled),
        }
    }

    pub fn int_value(&self, id: SettingId) -> Result<u32, Error> {
        let allowed = self.inner.allowed_services;
        self.with(|s| match id {
            SettingId::NetworkServices => {
                Ok(u32::from(s.sta.network.services.intersect(allowed).bits()))
            }
            SettingId::Mode => Ok(u32::from(s.mode as u8)),
            SettingId::TelnetPort => Ok(u32::from(s.sta.network.telnet_port)),
            SettingId::HttpPort => Ok(u32::from(s.sta.network.http_port)),
            SettingId::FtpPort => Ok(u32::from(s.sta.network.ftp_port)),
            SettingId::WebsocketPort => Ok(u32::from(s.sta.network.websocket_port)),
            _ => Err(Error::Unhandled),
        })
    }

    // ── Generic registry entry points ────────────────────────────────

    /// Parse and apply a textual value according to the setting's
    /// declared format.
    pub fn set_value(&self, id: SettingId, value: &str) -> Result<(), Error> {
        match descriptor(id).format {
            SettingFormat::Text { .. } | SettingFormat::Password { .. } => self.set_text(id, value),
            SettingFormat::Ipv4 => self.set_ipv4(id, value),
            SettingFormat::Integer { .. }
            | SettingFormat::RadioChoice
            | SettingFormat::Bitfield => {
                let parsed: u32 = value.trim().parse().map_err(|_| {
                    Error::config(format!("not a number: {value:?}"))
                })?;
                self.set_int(id, parsed)
            }
        }
    }

    /// Render the current value the way the registry displays it.
    pub fn get_value(&self, id: SettingId) -> Result<String, Error> {
        match descriptor(id).format {
            SettingFormat::Text { .. } | SettingFormat::Password { .. } => self.text(id),
            SettingFormat::Ipv4 => self.ipv4(id),
            SettingFormat::Integer { .. }
            | SettingFormat::RadioChoice
            | SettingFormat::Bitfield => self.int_value(id).map(|v| v.to_string()),
        }
    }

    /// Option labels for choice-style settings, `None` for plain ones.
    pub fn format_options(&self, id: SettingId) -> Option<String> {
        match descriptor(id).format {
            SettingFormat::RadioChoice => Some(
                WifiMode::iter()
                    .map(|mode| mode.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            SettingFormat::Bitfield => Some(self.inner.allowed_services.label_list()),
            _ => None,
        }
    }

    // ── Group-level operations ───────────────────────────────────────

    /// Persist the current settings.
    pub fn save(&self) -> Result<(), Error> {
        let snapshot = self.snapshot();
        self.inner.vault.save(&snapshot)
    }

    /// Replace the in-memory settings with what storage holds.
    pub fn reload(&self) {
        let loaded = self.inner.vault.load();
        self.with_mut(|s| *s = loaded.clone());
    }

    /// Reset to factory defaults, persisting them.
    pub fn restore_defaults(&self) -> Result<(), Error> {
        let defaults = self.inner.vault.restore()?;
        self.with_mut(|s| *s = defaults.clone());
        Ok(())
    }

    /// Record station credentials that produced a working link and
    /// persist them.
    pub(crate) fn commit_station_credentials(
        &self,
        ssid: &str,
        passphrase: &str,
    ) -> Result<(), Error> {
        self.with_mut(|s| {
            s.sta.ssid = ssid.to_string();
            s.sta.passphrase = passphrase.to_string();
        });
        self.save()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn with<R>(&self, f: impl FnOnce(&WifiSettings) -> R) -> R {
        let guard = self
            .inner
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn with_mut<R>(&self, f: impl FnOnce(&mut WifiSettings) -> R) -> R {
        let mut guard = self
            .inner
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn put_text(
        &self,
        value: &str,
        max: usize,
        what: &str,
        apply: impl FnOnce(&mut WifiSettings, String),
    ) -> Result<(), Error> {
        check_len(value, max, what)?;
        self.with_mut(|s| apply(s, value.to_string()));
        Ok(())
    }
}
