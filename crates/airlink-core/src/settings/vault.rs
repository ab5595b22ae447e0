// ── Settings persistence ──
//
// Binds the record codec to a host `BlobStore` slot. Loading never
// fails outward: a missing or structurally invalid record falls back to
// factory defaults and rewrites the slot, so the system always boots
// with coherent settings.

use std::sync::Arc;

use airlink_hal::{BlobStore, ServiceMask, SlotId};
use tracing::{debug, warn};

use super::WifiSettings;
use super::record::{self, RECORD_LEN};
use crate::error::Error;

/// Persistent home of the WiFi settings record.
pub struct SettingsVault {
    store: Arc<dyn BlobStore>,
    slot: SlotId,
    allowed_services: ServiceMask,
}

impl SettingsVault {
    pub fn new(store: Arc<dyn BlobStore>, slot: SlotId, allowed_services: ServiceMask) -> Self {
        Self {
            store,
            slot,
            allowed_services,
        }
    }

    /// Read settings from storage.
    ///
    /// Any failure — empty slot, short blob, bad checksum — restores
    /// factory defaults and persists them. Service masks are clamped to
    /// the platform's allowed set in every case, so a record written by
    /// a build with more services cannot enable absent ones.
    pub fn load(&self) -> WifiSettings {
        let mut buf = [0u8; RECORD_LEN];
        let mut settings = match self.store.load(self.slot, &mut buf) {
            Ok(()) => match record::decode(&buf) {
                Some(settings) => settings,
                None => {
                    warn!(slot = %self.slot, "settings record invalid, restoring defaults");
                    self.restore_best_effort()
                }
            },
            Err(err) => {
                warn!(slot = %self.slot, %err, "settings load failed, restoring defaults");
                self.restore_best_effort()
            }
        };
        settings.clamp_services(self.allowed_services);
        settings
    }

    /// Persist settings, skipping the write when the stored image is
    /// already identical.
    pub fn save(&self, settings: &WifiSettings) -> Result<(), Error> {
        let image = record::encode(settings);

        let mut current = [0u8; RECORD_LEN];
        if self.store.load(self.slot, &mut current).is_ok() && current == image {
            debug!(slot = %self.slot, "settings unchanged, skipping write");
            return Ok(());
        }

        self.store.save(self.slot, &image)?;
        Ok(())
    }

    /// Reset to factory defaults and persist them.
    pub fn restore(&self) -> Result<WifiSettings, Error> {
        let defaults = WifiSettings::defaults(self.allowed_services);
        self.save(&defaults)?;
        Ok(defaults)
    }

    fn restore_best_effort(&self) -> WifiSettings {
        match self.restore() {
            Ok(defaults) => defaults,
            Err(err) => {
                warn!(slot = %self.slot, %err, "default settings could not be persisted");
                WifiSettings::defaults(self.allowed_services)
            }
        }
    }
}
