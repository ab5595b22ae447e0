// ── Service orchestrator ──
//
// Owns the host-provided protocol daemons and tracks which are live.
// Mask-driven start/stop covers the operator-enabled services; the DNS
// helper is excluded from that path and driven only by the dual-mode
// fallback logic in the controller. A failed start is logged and the
// remaining services still come up.

use airlink_hal::{NetService, ServiceKind, ServiceMask};
use tracing::{debug, warn};

use crate::settings::EndpointConfig;

/// Port the captive DNS helper answers on.
const DNS_PORT: u16 = 53;

/// Collection of managed services plus their runtime state.
pub struct ServiceSet {
    entries: Vec<Box<dyn NetService>>,
    running: ServiceMask,
}

impl ServiceSet {
    /// Build from the backends the host provides. One entry per kind;
    /// a duplicate kind would shadow its predecessor and is rejected
    /// loudly in debug builds.
    pub fn new(entries: Vec<Box<dyn NetService>>) -> Self {
        debug_assert!(
            {
                let mut kinds: Vec<_> = entries.iter().map(|e| e.kind()).collect();
                kinds.sort_by_key(|k| *k as u8);
                kinds.windows(2).all(|pair| pair[0] != pair[1])
            },
            "duplicate service kind registered"
        );
        Self {
            entries,
            running: ServiceMask::NONE,
        }
    }

    /// Services currently live.
    pub fn running(&self) -> ServiceMask {
        self.running
    }

    pub fn dns_running(&self) -> bool {
        self.running.dns
    }

    /// Start every service enabled in `network` that is not already
    /// running. Ports fall back to protocol defaults when unset.
    pub(crate) fn start(&mut self, network: &EndpointConfig) {
        let enabled = network.services;
        for kind in protocol_kinds() {
            if !enabled.contains(kind) || self.running.contains(kind) {
                continue;
            }
            let port = network.port_for(kind);
            let Some(entry) = self.entry_mut(kind) else {
                continue;
            };
            match entry.init(port) {
                Ok(()) => {
                    debug!(service = %kind, port, "service started");
                    self.running.set(kind, true);
                }
                Err(err) => warn!(service = %kind, port, %err, "service failed to start"),
            }
        }
    }

    /// Stop everything that is running, the DNS helper included.
    pub(crate) fn stop_all(&mut self) {
        let was_running = self.running;
        self.running = ServiceMask::NONE;
        for kind in was_running.kinds() {
            if let Some(entry) = self.entry_mut(kind) {
                entry.stop();
                debug!(service = %kind, "service stopped");
            }
        }
    }

    /// One housekeeping pass over the running services, in fixed kind
    /// order.
    pub(crate) fn poll(&mut self) {
        let running = self.running;
        for kind in running.kinds() {
            if let Some(entry) = self.entry_mut(kind) {
                entry.poll();
            }
        }
    }

    /// Drop all open client connections on the running services.
    pub(crate) fn close_connections(&mut self) {
        let running = self.running;
        for kind in running.kinds() {
            if let Some(entry) = self.entry_mut(kind) {
                entry.close_connections();
            }
        }
    }

    /// Bring up the captive DNS helper, if the platform permits one and
    /// it is not already live.
    pub(crate) fn start_dns(&mut self, allowed_services: ServiceMask) {
        if !allowed_services.dns || self.running.dns {
            return;
        }
        let Some(entry) = self.entry_mut(ServiceKind::Dns) else {
            return;
        };
        match entry.init(DNS_PORT) {
            Ok(()) => {
                debug!("dns helper started");
                self.running.dns = true;
            }
            Err(err) => warn!(%err, "dns helper failed to start"),
        }
    }

    pub(crate) fn stop_dns(&mut self) {
        if !self.running.dns {
            return;
        }
        self.running.dns = false;
        if let Some(entry) = self.entry_mut(ServiceKind::Dns) {
            entry.stop();
            debug!("dns helper stopped");
        }
    }

    fn entry_mut(&mut self, kind: ServiceKind) -> Option<&mut dyn NetService> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.kind() == kind)?;
        Some(entry.as_mut())
    }
}

/// The mask-driven protocol services, excluding the DNS helper.
fn protocol_kinds() -> impl Iterator<Item = ServiceKind> {
    [
        ServiceKind::Telnet,
        ServiceKind::Websocket,
        ServiceKind::Http,
        ServiceKind::Ftp,
    ]
    .into_iter()
}
