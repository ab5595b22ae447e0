//! Platform seam for the airlink connectivity core.
//!
//! The core crate (`airlink-core`) is host-agnostic: everything that
//! touches hardware, sockets, flash, or an operator console lives behind
//! the traits defined here, and a platform port implements them:
//!
//! - **[`RadioDriver`]** — wireless stack control (role/addressing setup,
//!   association, scanning). Calls return promptly; link outcomes arrive
//!   asynchronously as [`RadioEvent`]s on the channel the core provides.
//!
//! - **[`NetService`]** — one protocol daemon (telnet bridge, websocket
//!   bridge, HTTP, FTP, captive DNS) started and stopped by the core's
//!   orchestrator according to a [`ServiceMask`].
//!
//! - **[`BlobStore`]** — byte-blob persistence for settings records,
//!   keyed by [`SlotId`]. [`MemoryStore`] is the in-process reference
//!   backend.
//!
//! - **[`ReportSink`]** — destination for operator-visible status lines.
//!
//! Shared value types (`WifiMode`, `MacAddr`, `ScanRecord`, ...) live
//! here too so backends and the core agree on one vocabulary.

pub mod radio;
pub mod report;
pub mod service;
pub mod store;
pub mod types;

// ── Primary re-exports ──────────────────────────────────────────────
pub use radio::{
    Addressing, ApProfile, DisconnectReason, RadioDriver, RadioError, RadioEvent, ScanRecord,
    SecurityKind,
};
pub use report::{NullSink, ReportSink};
pub use service::{NetService, ServiceError, ServiceKind, ServiceMask};
pub use store::{BlobStore, MemoryStore, SlotId, StoreError};
pub use types::{IpMode, MacAddr, MacAddrParseError, Role, WifiMode};
