// airlink-core: WiFi connectivity lifecycle for embedded machine controllers.

pub mod controller;
pub mod error;
pub mod notify;
pub mod scan;
pub mod services;
pub mod settings;

// ── Primary re-exports ──────────────────────────────────────────────
pub use controller::{ControllerDeps, LinkState, SERVICE_POLL_PERIOD, WifiController};
pub use error::Error;
pub use notify::{NOTICE_QUEUE_DEPTH, Notice};
pub use scan::{ScanRegistry, ScanTable, ScanView};
pub use services::ServiceSet;
pub use settings::registry::{
    SettingDescriptor, SettingFormat, SettingGroup, SettingId, WifiConfig, descriptor, descriptors,
};
pub use settings::vault::SettingsVault;
pub use settings::{EndpointConfig, WifiProfile, WifiSettings};

// Re-export the platform seam so hosts only need one dependency.
pub use airlink_hal as hal;
