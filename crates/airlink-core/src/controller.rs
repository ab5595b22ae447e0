// ── Controller abstraction ──
//
// Full lifecycle management for the WiFi subsystem. One event-loop task
// owns every mutable piece: the radio session, the service set, the
// connectivity flags. Commands and radio completions both arrive as
// messages, so handlers never run concurrently with each other.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use airlink_hal::{
    Addressing, ApProfile, BlobStore, DisconnectReason, IpMode, MacAddr, NetService, RadioDriver,
    RadioError, RadioEvent, ReportSink, Role, ScanRecord, ServiceKind, ServiceMask, SlotId,
    WifiMode,
};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::notify::{NOTICE_QUEUE_DEPTH, Notice, NoticeQueue, spawn_reporter};
use crate::scan::{ScanRegistry, ScanView};
use crate::services::ServiceSet;
use crate::settings::registry::WifiConfig;
use crate::settings::vault::SettingsVault;
use crate::settings::{PASSPHRASE_MAX_LEN, SSID_MAX_LEN, WifiSettings, check_len};

const COMMAND_CHANNEL_SIZE: usize = 16;
const RADIO_EVENT_CHANNEL_SIZE: usize = 32;

/// How often running services get a housekeeping pass.
pub const SERVICE_POLL_PERIOD: Duration = Duration::from_millis(250);

/// Station count limit advertised to the radio's access-point role.
const AP_MAX_CLIENTS: u8 = 4;

// ── LinkState ────────────────────────────────────────────────────

/// Connectivity snapshot observable by consumers.
///
/// Access-point and station sub-states are independent flags, not one
/// enum, because dual mode holds several of them true at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkState {
    /// A `start()` succeeded and no `stop()` has followed it.
    pub running: bool,
    /// Mode the running session was started with; `Off` when stopped.
    pub mode: WifiMode,
    /// The station link is up with an assigned address.
    pub connected: bool,
    /// A scan was dispatched and its completion has not yet arrived.
    pub scanning: bool,
    /// The local access point is accepting clients.
    pub ap_active: bool,
    /// Address acquired by the station link, while `connected`.
    pub station_ip: Option<Ipv4Addr>,
    /// Services currently live, the DNS helper included.
    pub services_running: ServiceMask,
}

impl LinkState {
    /// Both roles active concurrently (commissioning mode).
    pub fn dual_mode_active(&self) -> bool {
        self.running && self.mode == WifiMode::ApSta
    }
}

// ── Commands ─────────────────────────────────────────────────────

#[derive(Debug)]
enum Command {
    Start,
    Stop,
    Connect { ssid: String, passphrase: String },
    ClearStation,
    RequestScan,
}

/// A command envelope sent through the command channel.
struct CommandEnvelope {
    command: Command,
    reply: oneshot::Sender<Result<(), Error>>,
}

// ── Dependencies ─────────────────────────────────────────────────

/// Platform bindings the controller is built from.
pub struct ControllerDeps {
    pub radio: Arc<dyn RadioDriver>,
    pub services: Vec<Box<dyn NetService>>,
    pub store: Arc<dyn BlobStore>,
    pub report: Arc<dyn ReportSink>,
    /// Storage slot the settings record lives in.
    pub settings_slot: SlotId,
    /// Service bits this build/platform supports at all.
    pub allowed_services: ServiceMask,
}

// ── WifiController ───────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Construction via
/// [`spawn()`](Self::spawn) starts the event-loop and reporter tasks;
/// [`shutdown()`](Self::shutdown) tears both down.
#[derive(Clone)]
pub struct WifiController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: WifiConfig,
    registry: Arc<ScanRegistry>,
    radio: Arc<dyn RadioDriver>,
    report: Arc<dyn ReportSink>,
    notices: NoticeQueue,
    link: watch::Receiver<LinkState>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    event_tx: mpsc::Sender<RadioEvent>,
    active_stream: StdMutex<Option<ServiceKind>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WifiController {
    /// Build the controller and start its background tasks.
    ///
    /// Loads settings from the store (falling back to defaults on a
    /// damaged record) and spawns the event loop plus the notice
    /// reporter. Must be called within a Tokio runtime. The radio is
    /// not touched until [`start()`](Self::start).
    pub fn spawn(deps: ControllerDeps) -> Self {
        let vault = SettingsVault::new(deps.store, deps.settings_slot, deps.allowed_services);
        let config = WifiConfig::load(vault, deps.allowed_services);
        let registry = Arc::new(ScanRegistry::new());
        let notices = NoticeQueue::new(NOTICE_QUEUE_DEPTH);
        let (link_tx, link_rx) = watch::channel(LinkState::default());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, event_rx) = mpsc::channel(RADIO_EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        let event_loop = EventLoop {
            config: config.clone(),
            registry: Arc::clone(&registry),
            radio: Arc::clone(&deps.radio),
            services: ServiceSet::new(deps.services),
            notices: notices.clone(),
            link: link_tx,
            cancel: cancel.clone(),
            session: None,
        };

        let handles = vec![
            tokio::spawn(event_loop.run(command_rx, event_rx)),
            spawn_reporter(notices.subscribe(), Arc::clone(&deps.report), cancel.clone()),
        ];

        Self {
            inner: Arc::new(ControllerInner {
                config,
                registry,
                radio: deps.radio,
                report: deps.report,
                notices,
                link: link_rx,
                command_tx,
                event_tx,
                active_stream: StdMutex::new(None),
                cancel,
                task_handles: Mutex::new(handles),
            }),
        }
    }

    // ── Lifecycle commands ───────────────────────────────────────

    /// Bring the configured mode up.
    ///
    /// Validates the settings, applies addressing and role profiles,
    /// and dispatches association/scan work. Completion of the link
    /// itself arrives later as radio events. Idempotent while running.
    pub async fn start(&self) -> Result<(), Error> {
        self.execute(Command::Start).await
    }

    /// Stop services, halt the radio, and clear connectivity flags.
    pub async fn stop(&self) -> Result<(), Error> {
        self.execute(Command::Stop).await
    }

    /// Associate the station role with a network.
    ///
    /// Dispatches the attempt only; the outcome arrives later as a
    /// link event. Fails with [`Error::NotRunning`] before `start()`.
    pub async fn connect(&self, ssid: &str, passphrase: &str) -> Result<(), Error> {
        self.execute(Command::Connect {
            ssid: ssid.to_string(),
            passphrase: passphrase.to_string(),
        })
        .await
    }

    /// Drop the station association and forget the credentials applied
    /// to the radio, keeping the persisted settings intact.
    pub async fn clear_station(&self) -> Result<(), Error> {
        self.execute(Command::ClearStation).await
    }

    /// Kick off a network scan. Success only if no scan is pending;
    /// an in-flight scan makes this a no-op.
    pub async fn request_scan(&self) -> Result<(), Error> {
        self.execute(Command::RequestScan).await
    }

    /// Cancel background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("controller shut down");
    }

    async fn execute(&self, command: Command) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope { command, reply: tx })
            .await
            .map_err(|_| Error::Unavailable)?;
        rx.await.map_err(|_| Error::Unavailable)?
    }

    // ── Event intake ─────────────────────────────────────────────

    /// Deliver a radio completion to the event loop.
    ///
    /// Never blocks; when the channel is full the event is dropped
    /// with a warning rather than stalling the radio's context.
    pub fn push_radio_event(&self, event: RadioEvent) {
        match self.inner.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(?event, "radio event channel full, event dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("event loop gone, radio event dropped");
            }
        }
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to connectivity state changes.
    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.inner.link.clone()
    }

    /// Subscribe to the operator-visible notice stream.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    /// Bounded, non-blocking view of the scan table.
    pub fn scan(&self) -> Result<ScanView<'_>, Error> {
        self.inner.registry.acquire()
    }

    /// Handle to the settings facade.
    pub fn config(&self) -> &WifiConfig {
        &self.inner.config
    }

    pub fn mac_address(&self) -> MacAddr {
        self.inner.radio.mac_address()
    }

    /// Address the device is reachable at: the station address while
    /// connected, else the access point's own, else unspecified.
    pub fn ip_address(&self) -> Ipv4Addr {
        let state = self.inner.link.borrow().clone();
        if state.connected {
            if let Some(ip) = state.station_ip {
                return ip;
            }
        }
        if state.ap_active {
            return self.inner.config.snapshot().ap.network.ip;
        }
        Ipv4Addr::UNSPECIFIED
    }

    /// Whether the captive DNS helper is currently answering.
    pub fn dns_running(&self) -> bool {
        self.inner.link.borrow().services_running.dns
    }

    /// Record which service carries the interactive console stream, so
    /// network reports can name it.
    pub fn note_active_stream(&self, kind: Option<ServiceKind>) {
        *self
            .inner
            .active_stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = kind;
    }

    /// Write the network identity block to the report sink.
    pub fn report_network_info(&self) {
        let sink = &self.inner.report;
        sink.write_line(&format!("[WIFI MAC:{}]", self.mac_address()));
        sink.write_line(&format!("[IP:{}]", self.ip_address()));
        let active = *self
            .inner
            .active_stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(kind) = active {
            sink.write_line(&format!("[NETCON:{kind}]"));
        }
    }
}

// ── Event loop ───────────────────────────────────────────────────

/// A running radio session. Present between a successful `start()` and
/// the matching `stop()`.
struct Session {
    mode: WifiMode,
    /// Settings snapshot the session was started with. Later facade
    /// edits do not affect a running session.
    settings: WifiSettings,
    /// Credentials currently applied to the radio's station role.
    station_ssid: Option<String>,
    /// Credentials to persist once the link proves them good.
    pending_persist: Option<(String, String)>,
}

struct EventLoop {
    config: WifiConfig,
    registry: Arc<ScanRegistry>,
    radio: Arc<dyn RadioDriver>,
    services: ServiceSet,
    notices: NoticeQueue,
    link: watch::Sender<LinkState>,
    cancel: CancellationToken,
    session: Option<Session>,
}

impl EventLoop {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<CommandEnvelope>,
        mut events: mpsc::Receiver<RadioEvent>,
    ) {
        // First poll a full period out; the branch guard keeps ticks
        // from doing anything while no service runs.
        let mut poll = time::interval_at(
            Instant::now() + SERVICE_POLL_PERIOD,
            SERVICE_POLL_PERIOD,
        );
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                envelope = commands.recv() => {
                    let Some(envelope) = envelope else { break };
                    let result = self.handle_command(envelope.command);
                    let _ = envelope.reply.send(result);
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    self.handle_radio_event(event);
                }
                _ = poll.tick(), if !self.services.running().is_empty() => {
                    self.services.poll();
                }
            }
        }

        self.stop();
        debug!("event loop stopped");
    }

    fn handle_command(&mut self, command: Command) -> Result<(), Error> {
        match command {
            Command::Start => self.start(),
            Command::Stop => {
                self.stop();
                Ok(())
            }
            Command::Connect { ssid, passphrase } => self.connect(ssid, passphrase),
            Command::ClearStation => self.clear_station(),
            Command::RequestScan => self.request_scan(),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    fn start(&mut self) -> Result<(), Error> {
        if self.session.is_some() {
            debug!("start requested while already running");
            return Ok(());
        }

        let settings = self.config.snapshot();
        let mode = settings.mode;
        validate_for_start(&settings)?;

        self.radio.configure_role(mode).map_err(start_failure)?;

        if mode.has_access_point() {
            let network = &settings.ap.network;
            // Static is the only addressing the AP role supports.
            let addressing = Addressing {
                mode: IpMode::Static,
                ..network.addressing()
            };
            self.radio
                .set_addressing(Role::AccessPoint, &addressing)
                .map_err(start_failure)?;
            let profile = ApProfile {
                ssid: settings.ap.ssid.clone(),
                passphrase: (!settings.ap.passphrase.is_empty())
                    .then(|| settings.ap.passphrase.clone()),
                max_clients: AP_MAX_CLIENTS,
            };
            self.radio
                .configure_access_point(&profile)
                .map_err(start_failure)?;
            self.radio
                .set_hostname(Role::AccessPoint, &network.hostname)
                .map_err(start_failure)?;
        }

        if mode.has_station() {
            // Station addressing is DHCP only for now.
            let addressing = Addressing {
                mode: IpMode::Dhcp,
                ..settings.sta.network.addressing()
            };
            self.radio
                .set_addressing(Role::Station, &addressing)
                .map_err(start_failure)?;
            self.radio
                .set_hostname(Role::Station, &settings.sta.network.hostname)
                .map_err(start_failure)?;
        }

        self.radio.bring_up().map_err(start_failure)?;

        // No station-up completion event exists, so association is
        // dispatched here; its outcome arrives as a link event.
        let mut station_ssid = None;
        if mode.has_station() && !settings.sta.ssid.is_empty() {
            self.registry.begin_attempt(true);
            self.radio
                .associate(&settings.sta.ssid, &settings.sta.passphrase)
                .map_err(start_failure)?;
            station_ssid = Some(settings.sta.ssid.clone());
        }

        // Dual mode seeds the network picker for commissioning clients.
        let mut scanning = false;
        if mode == WifiMode::ApSta {
            match self.radio.start_scan() {
                Ok(()) => scanning = true,
                Err(error) => warn!(%error, "initial scan not started"),
            }
        }

        info!(%mode, "wifi started");
        self.session = Some(Session {
            mode,
            settings,
            station_ssid,
            pending_persist: None,
        });
        self.link.send_modify(|state| {
            *state = LinkState {
                running: true,
                mode,
                scanning,
                ..LinkState::default()
            };
        });
        Ok(())
    }

    fn stop(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.services.stop_all();
        if let Err(error) = self.radio.power_down() {
            warn!(%error, "radio power down failed");
        }
        self.registry.begin_attempt(false);
        self.session = None;
        self.link.send_modify(|state| *state = LinkState::default());
        info!("wifi stopped");
    }

    fn connect(&mut self, ssid: String, passphrase: String) -> Result<(), Error> {
        let mode = match &self.session {
            Some(session) => session.mode,
            None => return Err(Error::NotRunning),
        };
        if !mode.has_station() {
            return Err(Error::Unavailable);
        }
        if ssid.is_empty() {
            return Err(Error::config("SSID must not be empty"));
        }
        check_len(&ssid, SSID_MAX_LEN, "SSID")?;
        check_len(&passphrase, PASSPHRASE_MAX_LEN, "passphrase")?;

        // Supersede any existing association; the result of the
        // disassociation request does not gate the rest.
        if self.link.borrow().connected {
            if let Err(error) = self.radio.disassociate() {
                debug!(%error, "disassociate before reconnect failed");
            }
        }

        self.registry.begin_attempt(true);
        self.radio.associate(&ssid, &passphrase)?;
        info!(%ssid, "association dispatched");

        if let Some(session) = self.session.as_mut() {
            session.station_ssid = Some(ssid.clone());
            session.pending_persist = Some((ssid, passphrase));
        }
        Ok(())
    }

    fn clear_station(&mut self) -> Result<(), Error> {
        let mode = match &self.session {
            Some(session) => session.mode,
            None => return Err(Error::NotRunning),
        };
        if !mode.has_station() {
            return Err(Error::Unavailable);
        }

        if let Err(error) = self.radio.disassociate() {
            debug!(%error, "disassociate during clear failed");
        }
        self.radio.clear_station_credentials()?;
        self.registry.begin_attempt(false);
        if let Some(session) = self.session.as_mut() {
            session.station_ssid = None;
            session.pending_persist = None;
        }
        info!("station credentials cleared");
        Ok(())
    }

    fn request_scan(&mut self) -> Result<(), Error> {
        let mode = match &self.session {
            Some(session) => session.mode,
            None => return Err(Error::NotRunning),
        };
        // Scanning runs on the station interface.
        if !mode.has_station() {
            return Err(Error::Unavailable);
        }
        if self.link.borrow().scanning {
            debug!("scan already in progress");
            return Ok(());
        }
        self.radio.start_scan()?;
        self.link.send_modify(|state| state.scanning = true);
        Ok(())
    }

    // ── Radio event handling ─────────────────────────────────────

    fn handle_radio_event(&mut self, event: RadioEvent) {
        if self.session.is_none() {
            debug!(?event, "radio event while stopped, ignored");
            return;
        }
        match event {
            RadioEvent::LinkAcquired { ip } => self.on_link_acquired(ip),
            RadioEvent::LinkLost { reason } => self.on_link_lost(reason),
            RadioEvent::ApStarted => self.on_ap_started(),
            RadioEvent::ApClientJoined { mac } => self.on_ap_client_joined(mac),
            RadioEvent::ApClientLeft { mac } => self.on_ap_client_left(mac),
            RadioEvent::ScanComplete { records } => self.on_scan_complete(records),
        }
        self.sync_services_state();
    }

    fn on_link_acquired(&mut self, ip: Ipv4Addr) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let dual = session.mode == WifiMode::ApSta;
        let ssid = session
            .station_ssid
            .clone()
            .unwrap_or_else(|| session.settings.sta.ssid.clone());

        info!(%ip, %ssid, "station link up");
        self.registry.mark_connected(&ssid, ip);
        self.notices.push(Notice::StaActive);
        self.services.start(&session.settings.sta.network);

        if dual {
            // An upstream link exists now; captive answers would only
            // mislead AP-side clients.
            self.services.stop_dns();

            if let Some((ssid, passphrase)) = session.pending_persist.take() {
                let config = self.config.clone();
                tokio::task::spawn_blocking(move || {
                    if let Err(error) = config.commit_station_credentials(&ssid, &passphrase) {
                        warn!(%error, "station credentials not persisted");
                    }
                });
            }
        }

        self.link.send_modify(|state| {
            state.connected = true;
            state.station_ip = Some(ip);
        });
    }

    fn on_link_lost(&mut self, reason: DisconnectReason) {
        let was_connected = self.link.borrow().connected;

        // A dead link cannot deliver a graceful close.
        self.services.close_connections();
        if let Err(error) = self.radio.clear_station_credentials() {
            debug!(%error, "stale credential clear failed");
        }

        if was_connected {
            info!(?reason, "station link down");
            self.notices.push(Notice::StaDisconnected);
        } else {
            debug!(?reason, "association attempt failed");
        }

        self.registry.begin_attempt(false);

        let dual = self
            .session
            .as_ref()
            .is_some_and(|session| session.mode == WifiMode::ApSta);
        if dual && !self.services.dns_running() {
            self.services.start_dns(self.config.allowed_services());
        }

        self.link.send_modify(|state| {
            state.connected = false;
            state.station_ip = None;
        });
    }

    fn on_ap_started(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        info!(ssid = %session.settings.ap.ssid, "access point up");
        self.notices.push(Notice::ApReady);
        self.services.start(&session.settings.ap.network);
        if session.mode == WifiMode::ApSta {
            self.services.start_dns(self.config.allowed_services());
        }
        self.link.send_modify(|state| state.ap_active = true);
    }

    fn on_ap_client_joined(&mut self, mac: MacAddr) {
        info!(%mac, "access point client joined");
        self.notices.push(Notice::ApClientJoined);

        let dual = self
            .session
            .as_ref()
            .is_some_and(|session| session.mode == WifiMode::ApSta);
        if dual && !self.link.borrow().connected && !self.services.dns_running() {
            self.services.start_dns(self.config.allowed_services());
        }
    }

    fn on_ap_client_left(&mut self, mac: MacAddr) {
        info!(%mac, "access point client left");
        self.services.close_connections();
        self.notices.push(Notice::ApClientLeft);
    }

    fn on_scan_complete(&mut self, records: Vec<ScanRecord>) {
        let count = records.len();
        if self.registry.publish(records) {
            debug!(count, "scan table refreshed");
        }
        self.notices.push(Notice::ScanCompleted);
        self.link.send_modify(|state| state.scanning = false);
    }

    fn sync_services_state(&self) {
        let running = self.services.running();
        self.link.send_if_modified(|state| {
            if state.services_running == running {
                false
            } else {
                state.services_running = running;
                true
            }
        });
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Reject settings a `start()` cannot act on. Bounds are normally
/// upheld by the facade and the record codec; re-checked here so a
/// hand-built settings value cannot reach the radio.
fn validate_for_start(settings: &WifiSettings) -> Result<(), Error> {
    let mode = settings.mode;
    if mode == WifiMode::Off {
        return Err(Error::config("wifi mode is off"));
    }
    check_len(&settings.sta.ssid, SSID_MAX_LEN, "station SSID")?;
    check_len(&settings.sta.passphrase, PASSPHRASE_MAX_LEN, "station passphrase")?;
    check_len(&settings.ap.ssid, SSID_MAX_LEN, "access point SSID")?;
    check_len(&settings.ap.passphrase, PASSPHRASE_MAX_LEN, "access point passphrase")?;

    if mode == WifiMode::Station && settings.sta.ssid.is_empty() {
        return Err(Error::config("station mode requires an SSID"));
    }
    if mode.has_access_point() && settings.ap.ssid.is_empty() {
        return Err(Error::config("access point mode requires an SSID"));
    }
    Ok(())
}

fn start_failure(error: RadioError) -> Error {
    Error::start_failed(error.to_string())
}
