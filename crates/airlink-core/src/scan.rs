// ── Network scan registry ──
//
// Shared table of scan results plus the current association selection.
// Readers (status reporting, UIs) and the event loop are different
// contexts, so the table sits behind a mutex acquired with a short
// bound on BOTH sides: a reader that cannot get the lock backs off with
// `Unavailable`, and a writer that cannot get it drops the fresh scan
// result rather than stall event processing. Results go stale anyway;
// the next scan replaces them.

use std::net::Ipv4Addr;
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use airlink_hal::ScanRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::Error;

/// Upper bound on lock acquisition, both readers and writers.
pub const SCAN_LOCK_BOUND: Duration = Duration::from_millis(10);

const LOCK_RETRY_PAUSE: Duration = Duration::from_micros(500);

/// Scan results and association bookkeeping.
#[derive(Debug, Default, Serialize)]
pub struct ScanTable {
    /// Networks seen by the most recent completed scan.
    pub records: Vec<ScanRecord>,
    /// SSID of the network the station is associated with, if any.
    pub selected: Option<String>,
    /// Address leased or assigned on the station link.
    pub ip_address: Option<Ipv4Addr>,
    /// Human-readable link status: "", "Connecting..." or "Connected".
    pub status: String,
    /// When `records` was last replaced.
    pub scanned_at: Option<DateTime<Utc>>,
}

impl ScanTable {
    /// Age of the current records, `None` before the first scan.
    pub fn scan_age(&self) -> Option<chrono::Duration> {
        self.scanned_at.map(|at| Utc::now() - at)
    }
}

/// Read access to the scan table. Dropping the view releases the lock,
/// so every successful acquire is balanced by construction. Do not hold
/// a view across slow work; writers give up after `SCAN_LOCK_BOUND`.
pub struct ScanView<'a> {
    guard: MutexGuard<'a, ScanTable>,
}

impl Deref for ScanView<'_> {
    type Target = ScanTable;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

/// Mutex-guarded owner of the [`ScanTable`].
#[derive(Debug, Default)]
pub struct ScanRegistry {
    table: Mutex<ScanTable>,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a read view, waiting at most [`SCAN_LOCK_BOUND`].
    pub fn acquire(&self) -> Result<ScanView<'_>, Error> {
        match self.lock_bounded() {
            Some(guard) => Ok(ScanView { guard }),
            None => Err(Error::Unavailable),
        }
    }

    /// Install a fresh set of scan records.
    ///
    /// Returns `false` when the table was contended and the result was
    /// dropped.
    pub(crate) fn publish(&self, records: Vec<ScanRecord>) -> bool {
        let Some(mut table) = self.lock_bounded() else {
            debug!(count = records.len(), "scan table busy, dropping scan result");
            return false;
        };
        // New records are in place before the old allocation goes away.
        let old = std::mem::replace(&mut table.records, records);
        table.scanned_at = Some(Utc::now());
        drop(old);
        true
    }

    /// Reset selection state for a new association attempt (or to blank
    /// after an explicit clear).
    pub(crate) fn begin_attempt(&self, connecting: bool) {
        if let Some(mut table) = self.lock_bounded() {
            table.selected = None;
            table.ip_address = None;
            table.status = if connecting {
                "Connecting...".to_string()
            } else {
                String::new()
            };
        }
    }

    /// Record a completed association.
    pub(crate) fn mark_connected(&self, ssid: &str, ip: Ipv4Addr) {
        if let Some(mut table) = self.lock_bounded() {
            table.selected = Some(ssid.to_string());
            table.ip_address = Some(ip);
            table.status = "Connected".to_string();
        }
    }

    fn lock_bounded(&self) -> Option<MutexGuard<'_, ScanTable>> {
        let deadline = Instant::now() + SCAN_LOCK_BOUND;
        loop {
            match self.table.try_lock() {
                Ok(guard) => return Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    thread::sleep(LOCK_RETRY_PAUSE);
                }
            }
        }
    }
}
