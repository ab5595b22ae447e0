// Integration tests for the WiFi lifecycle: controller event loop,
// service orchestration, scan registry, and operator reporting, all
// against scripted platform doubles.
#![allow(clippy::unwrap_used)]

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use airlink_core::hal::{
    Addressing, ApProfile, DisconnectReason, MacAddr, MemoryStore, NetService, RadioDriver,
    RadioError, RadioEvent, ReportSink, Role, ScanRecord, SecurityKind, ServiceError, ServiceKind,
    ServiceMask, SlotId, WifiMode,
};
use airlink_core::{
    ControllerDeps, Error, LinkState, Notice, SERVICE_POLL_PERIOD, SettingId, WifiController,
};
use pretty_assertions::assert_eq;
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;

// ── Test doubles ────────────────────────────────────────────────────

type CallLog = Arc<Mutex<Vec<String>>>;

fn drain(log: &CallLog) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

/// Scripted radio: records every call, succeeds unless told to fail a
/// specific operation, and lets tests feed events back by hand.
#[derive(Default)]
struct MockRadio {
    calls: Mutex<Vec<String>>,
    fail_op: Mutex<Option<&'static str>>,
}

impl MockRadio {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn fail_on(&self, op: &'static str) {
        *self.fail_op.lock().unwrap() = Some(op);
    }

    fn gate(&self, op: &str) -> Result<(), RadioError> {
        if self.fail_op.lock().unwrap().is_some_and(|f| f == op) {
            return Err(RadioError::Stack(format!("{op} refused")));
        }
        Ok(())
    }
}

impl RadioDriver for MockRadio {
    fn configure_role(&self, mode: WifiMode) -> Result<(), RadioError> {
        self.record(format!("configure_role:{mode:?}"));
        self.gate("configure_role")
    }

    fn set_addressing(&self, role: Role, addressing: &Addressing) -> Result<(), RadioError> {
        self.record(format!("set_addressing:{role:?}:{:?}", addressing.mode));
        self.gate("set_addressing")
    }

    fn configure_access_point(&self, profile: &ApProfile) -> Result<(), RadioError> {
        self.record(format!("configure_access_point:{}", profile.ssid));
        self.gate("configure_access_point")
    }

    fn set_hostname(&self, role: Role, hostname: &str) -> Result<(), RadioError> {
        self.record(format!("set_hostname:{role:?}:{hostname}"));
        self.gate("set_hostname")
    }

    fn bring_up(&self) -> Result<(), RadioError> {
        self.record("bring_up".to_string());
        self.gate("bring_up")
    }

    fn power_down(&self) -> Result<(), RadioError> {
        self.record("power_down".to_string());
        self.gate("power_down")
    }

    fn associate(&self, ssid: &str, _passphrase: &str) -> Result<(), RadioError> {
        self.record(format!("associate:{ssid}"));
        self.gate("associate")
    }

    fn disassociate(&self) -> Result<(), RadioError> {
        self.record("disassociate".to_string());
        self.gate("disassociate")
    }

    fn clear_station_credentials(&self) -> Result<(), RadioError> {
        self.record("clear_station_credentials".to_string());
        self.gate("clear_station_credentials")
    }

    fn start_scan(&self) -> Result<(), RadioError> {
        self.record("start_scan".to_string());
        self.gate("start_scan")
    }

    fn mac_address(&self) -> MacAddr {
        MacAddr::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF])
    }
}

#[derive(Default)]
struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap())
    }
}

impl ReportSink for RecordingSink {
    fn write_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

struct FakeService {
    kind: ServiceKind,
    log: CallLog,
}

impl NetService for FakeService {
    fn kind(&self) -> ServiceKind {
        self.kind
    }

    fn init(&mut self, port: u16) -> Result<(), ServiceError> {
        self.log.lock().unwrap().push(format!("{}:init:{port}", self.kind));
        Ok(())
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().push(format!("{}:stop", self.kind));
    }

    fn poll(&mut self) {
        self.log.lock().unwrap().push(format!("{}:poll", self.kind));
    }

    fn close_connections(&mut self) {
        self.log.lock().unwrap().push(format!("{}:close", self.kind));
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    controller: WifiController,
    radio: Arc<MockRadio>,
    sink: Arc<RecordingSink>,
    service_log: CallLog,
}

fn build_with(allowed: ServiceMask) -> Harness {
    let radio = Arc::new(MockRadio::default());
    let sink = Arc::new(RecordingSink::default());
    let service_log = CallLog::default();

    let services: Vec<Box<dyn NetService>> = [
        ServiceKind::Telnet,
        ServiceKind::Websocket,
        ServiceKind::Http,
        ServiceKind::Ftp,
        ServiceKind::Dns,
    ]
    .into_iter()
    .map(|kind| {
        Box::new(FakeService {
            kind,
            log: Arc::clone(&service_log),
        }) as Box<dyn NetService>
    })
    .collect();

    let controller = WifiController::spawn(ControllerDeps {
        radio: Arc::clone(&radio) as Arc<dyn RadioDriver>,
        services,
        store: Arc::new(MemoryStore::new()),
        report: Arc::clone(&sink) as Arc<dyn ReportSink>,
        settings_slot: SlotId(1),
        allowed_services: allowed,
    });

    Harness {
        controller,
        radio,
        sink,
        service_log,
    }
}

fn build() -> Harness {
    build_with(ServiceMask::ALL)
}

async fn wait_link(
    link: &mut watch::Receiver<LinkState>,
    what: &str,
    pred: impl Fn(&LinkState) -> bool,
) {
    timeout(Duration::from_secs(2), async {
        while !pred(&link.borrow()) {
            link.changed().await.expect("controller stopped unexpectedly");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

async fn next_notice(rx: &mut broadcast::Receiver<Notice>) -> Notice {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("no notice arrived")
        .expect("notice stream closed")
}

/// Bring up a station-mode harness and walk it to a connected link.
async fn connected_station() -> (Harness, watch::Receiver<LinkState>) {
    let harness = build();
    let config = harness.controller.config();
    config.set_mode(WifiMode::Station);
    config.set_text(SettingId::StaSsid, "HomeNet").unwrap();
    config.set_text(SettingId::StaPassphrase, "pw123456").unwrap();

    let mut link = harness.controller.link_state();
    harness.controller.start().await.unwrap();
    harness
        .controller
        .push_radio_event(RadioEvent::LinkAcquired {
            ip: Ipv4Addr::new(192, 168, 5, 50),
        });
    wait_link(&mut link, "station link", |state| state.connected).await;
    (harness, link)
}

// ── Start validation ────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_before_start_fails() {
    let harness = build();
    let err = harness
        .controller
        .connect("HomeNet", "pw123456")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotRunning), "got {err:?}");
    assert!(harness.radio.calls().is_empty(), "radio must stay untouched");
}

#[tokio::test]
async fn test_start_rejects_off_mode() {
    let harness = build();
    harness.controller.config().set_mode(WifiMode::Off);
    let err = harness.controller.start().await.unwrap_err();
    assert!(matches!(err, Error::ConfigInvalid { .. }), "got {err:?}");
    assert!(!harness.controller.link_state().borrow().running);
}

#[tokio::test]
async fn test_start_requires_station_ssid() {
    let harness = build();
    harness.controller.config().set_mode(WifiMode::Station);
    let err = harness.controller.start().await.unwrap_err();
    assert!(matches!(err, Error::ConfigInvalid { .. }), "got {err:?}");
    assert!(harness.radio.calls().is_empty());
}

#[tokio::test]
async fn test_start_failure_reports_start_failed() {
    let harness = build();
    harness.radio.fail_on("bring_up");

    let err = harness.controller.start().await.unwrap_err();
    assert!(matches!(err, Error::StartFailed { .. }), "got {err:?}");
    assert!(!harness.controller.link_state().borrow().running);

    // Nothing was started, so station commands still see a stopped core.
    let err = harness.controller.connect("a", "b").await.unwrap_err();
    assert!(matches!(err, Error::NotRunning));
}

// ── Station lifecycle ───────────────────────────────────────────────

#[tokio::test]
async fn test_station_link_acquisition() {
    let harness = build();
    let config = harness.controller.config();
    config.set_mode(WifiMode::Station);
    config.set_text(SettingId::StaSsid, "HomeNet").unwrap();
    config.set_text(SettingId::StaPassphrase, "pw123456").unwrap();

    let mut link = harness.controller.link_state();
    harness.controller.start().await.unwrap();

    assert_eq!(
        harness.radio.calls(),
        vec![
            "configure_role:Station".to_string(),
            "set_addressing:Station:Dhcp".to_string(),
            "set_hostname:Station:airlink".to_string(),
            "bring_up".to_string(),
            "associate:HomeNet".to_string(),
        ]
    );

    // A second start while running changes nothing.
    harness.controller.start().await.unwrap();
    assert_eq!(harness.radio.calls().len(), 5);

    harness
        .controller
        .push_radio_event(RadioEvent::LinkAcquired {
            ip: Ipv4Addr::new(192, 168, 5, 50),
        });
    wait_link(&mut link, "station link", |state| state.connected).await;

    let state = link.borrow().clone();
    assert_eq!(state.station_ip, Some(Ipv4Addr::new(192, 168, 5, 50)));
    assert_eq!(
        state.services_running,
        ServiceMask {
            dns: false,
            ..ServiceMask::ALL
        }
    );

    let view = harness.controller.scan().unwrap();
    assert_eq!(view.selected.as_deref(), Some("HomeNet"));
    assert_eq!(view.ip_address, Some(Ipv4Addr::new(192, 168, 5, 50)));
    assert_eq!(view.status, "Connected");
    drop(view);

    let inits: Vec<String> = drain(&harness.service_log)
        .into_iter()
        .filter(|entry| entry.contains(":init:"))
        .collect();
    assert_eq!(
        inits,
        vec![
            "Telnet:init:23".to_string(),
            "Websocket:init:81".to_string(),
            "HTTP:init:80".to_string(),
            "FTP:init:21".to_string(),
        ]
    );

    harness.controller.shutdown().await;
}

#[tokio::test]
async fn test_link_lost_closes_connections_first() {
    let (harness, mut link) = connected_station().await;
    drain(&harness.service_log);

    harness.controller.push_radio_event(RadioEvent::LinkLost {
        reason: DisconnectReason::ConnectionLost,
    });
    wait_link(&mut link, "link loss", |state| !state.connected).await;

    let log = drain(&harness.service_log);
    for service in ["Telnet", "Websocket", "HTTP", "FTP"] {
        assert!(
            log.contains(&format!("{service}:close")),
            "{service} connections must be closed, log: {log:?}"
        );
    }
    // The dead link's credentials are cleared from the radio.
    assert!(
        harness
            .radio
            .calls()
            .contains(&"clear_station_credentials".to_string())
    );

    let state = link.borrow().clone();
    assert!(!state.connected);
    assert_eq!(state.station_ip, None);
    assert!(state.running, "losing the link does not stop the core");
}

#[tokio::test]
async fn test_clear_station_forgets_the_network() {
    let (harness, mut link) = connected_station().await;

    harness.controller.clear_station().await.unwrap();

    let calls = harness.radio.calls();
    assert!(calls.contains(&"disassociate".to_string()));
    assert!(calls.contains(&"clear_station_credentials".to_string()));

    let view = harness.controller.scan().unwrap();
    assert_eq!(view.selected, None);
    assert_eq!(view.status, "");
    drop(view);

    // The radio acknowledges the forced disassociation with an event.
    harness.controller.push_radio_event(RadioEvent::LinkLost {
        reason: DisconnectReason::Other(8),
    });
    wait_link(&mut link, "link teardown", |state| !state.connected).await;
    assert!(link.borrow().running, "the core keeps running without a link");
}

// ── Dual mode ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_dual_mode_dns_follows_station_link() {
    let harness = build();
    let config = harness.controller.config();
    config.set_mode(WifiMode::ApSta);

    let mut notices = harness.controller.notices();
    let mut link = harness.controller.link_state();
    harness.controller.start().await.unwrap();

    // Dual mode dispatches a commissioning scan up front.
    assert!(harness.radio.calls().contains(&"start_scan".to_string()));
    assert!(link.borrow().scanning);

    harness.controller.push_radio_event(RadioEvent::ApStarted);
    wait_link(&mut link, "access point", |state| state.ap_active).await;
    assert!(
        harness.controller.dns_running(),
        "captive dns must answer while no upstream link exists"
    );
    assert_eq!(next_notice(&mut notices).await, Notice::ApReady);

    harness
        .controller
        .connect("shop-floor", "portal-pass")
        .await
        .unwrap();
    harness
        .controller
        .push_radio_event(RadioEvent::LinkAcquired {
            ip: Ipv4Addr::new(10, 0, 0, 7),
        });
    wait_link(&mut link, "station link", |state| state.connected).await;
    assert!(
        !harness.controller.dns_running(),
        "dns helper and station link are mutually exclusive"
    );
    assert_eq!(next_notice(&mut notices).await, Notice::StaActive);

    // The proven credentials get persisted off the event loop.
    timeout(Duration::from_secs(2), async {
        loop {
            harness.controller.config().reload();
            let ssid = harness.controller.config().text(SettingId::StaSsid).unwrap();
            if ssid == "shop-floor" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("credentials were not persisted");

    harness.controller.push_radio_event(RadioEvent::LinkLost {
        reason: DisconnectReason::ConnectionLost,
    });
    wait_link(&mut link, "link loss", |state| !state.connected).await;
    assert!(
        harness.controller.dns_running(),
        "dns helper must resume when the upstream link drops"
    );
    assert_eq!(next_notice(&mut notices).await, Notice::StaDisconnected);
    assert!(link.borrow().ap_active, "access point side keeps serving");

    harness.controller.shutdown().await;
}

#[tokio::test]
async fn test_connect_requires_station_role() {
    let harness = build();
    harness.controller.start().await.unwrap();

    let err = harness
        .controller
        .connect("HomeNet", "pw123456")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unavailable), "got {err:?}");

    let err = harness.controller.clear_station().await.unwrap_err();
    assert!(matches!(err, Error::Unavailable), "got {err:?}");
}

// ── Access point clients ────────────────────────────────────────────

#[tokio::test]
async fn test_ap_client_join_and_leave() {
    let harness = build();
    let mut notices = harness.controller.notices();
    let mut link = harness.controller.link_state();
    harness.controller.start().await.unwrap();
    harness.controller.push_radio_event(RadioEvent::ApStarted);
    wait_link(&mut link, "access point", |state| state.ap_active).await;
    assert_eq!(next_notice(&mut notices).await, Notice::ApReady);
    drain(&harness.service_log);

    let mac = MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    harness
        .controller
        .push_radio_event(RadioEvent::ApClientJoined { mac });
    assert_eq!(next_notice(&mut notices).await, Notice::ApClientJoined);

    harness
        .controller
        .push_radio_event(RadioEvent::ApClientLeft { mac });
    assert_eq!(next_notice(&mut notices).await, Notice::ApClientLeft);

    // Streams the departed client held must not linger half-open.
    let closes: Vec<String> = drain(&harness.service_log)
        .into_iter()
        .filter(|entry| entry.ends_with(":close"))
        .collect();
    assert_eq!(
        closes,
        vec![
            "Telnet:close".to_string(),
            "Websocket:close".to_string(),
            "HTTP:close".to_string(),
            "FTP:close".to_string(),
        ]
    );
}

// ── Scanning ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_scan_results_published_once_per_request() {
    let harness = build();
    let config = harness.controller.config();
    config.set_mode(WifiMode::Station);
    config.set_text(SettingId::StaSsid, "HomeNet").unwrap();

    let mut link = harness.controller.link_state();
    harness.controller.start().await.unwrap();

    harness.controller.request_scan().await.unwrap();
    // A scan is pending; asking again is a quiet success.
    harness.controller.request_scan().await.unwrap();
    let scans = harness
        .radio
        .calls()
        .iter()
        .filter(|call| *call == "start_scan")
        .count();
    assert_eq!(scans, 1);

    harness
        .controller
        .push_radio_event(RadioEvent::ScanComplete {
            records: vec![
                ScanRecord {
                    ssid: "alpha".to_string(),
                    rssi: -41,
                    security: SecurityKind::Wpa2Psk,
                },
                ScanRecord {
                    ssid: "beta".to_string(),
                    rssi: -70,
                    security: SecurityKind::Open,
                },
            ],
        });
    wait_link(&mut link, "scan completion", |state| !state.scanning).await;

    let view = harness.controller.scan().unwrap();
    assert_eq!(view.records.len(), 2);
    assert_eq!(view.records[0].ssid, "alpha");
    assert_eq!(view.records[1].rssi, -70);
    assert!(view.scanned_at.is_some());
    drop(view);

    timeout(Duration::from_secs(1), async {
        while !harness
            .sink
            .lines()
            .contains(&"[MSG:WIFI AP SCAN COMPLETED]".to_string())
        {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("scan notice not reported");
}

// ── Teardown and service masks ──────────────────────────────────────

#[tokio::test]
async fn test_stop_tears_everything_down() {
    let (harness, mut link) = connected_station().await;
    drain(&harness.service_log);

    harness.controller.stop().await.unwrap();
    wait_link(&mut link, "stop", |state| !state.running).await;

    assert_eq!(*link.borrow(), LinkState::default());
    assert!(harness.radio.calls().contains(&"power_down".to_string()));

    let stops: Vec<String> = drain(&harness.service_log)
        .into_iter()
        .filter(|entry| entry.ends_with(":stop"))
        .collect();
    assert_eq!(
        stops,
        vec![
            "Telnet:stop".to_string(),
            "Websocket:stop".to_string(),
            "HTTP:stop".to_string(),
            "FTP:stop".to_string(),
        ]
    );

    let view = harness.controller.scan().unwrap();
    assert_eq!(view.selected, None);
    assert_eq!(view.status, "");
    drop(view);

    // Stopping twice is quiet.
    harness.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_unsupported_service_bits_never_run() {
    let allowed = ServiceMask {
        telnet: true,
        ..ServiceMask::NONE
    };
    let harness = build_with(allowed);
    let config = harness.controller.config();

    config.set_services(ServiceMask::ALL);
    assert_eq!(config.services(), allowed, "mask must clamp silently");

    let mut link = harness.controller.link_state();
    harness.controller.start().await.unwrap();
    harness.controller.push_radio_event(RadioEvent::ApStarted);
    wait_link(&mut link, "access point", |state| state.ap_active).await;
    wait_link(&mut link, "services", |state| !state.services_running.is_empty()).await;

    assert_eq!(link.borrow().services_running, allowed);
    let inits: Vec<String> = drain(&harness.service_log)
        .into_iter()
        .filter(|entry| entry.contains(":init:"))
        .collect();
    assert_eq!(inits, vec!["Telnet:init:23".to_string()]);
}

// ── Reporting and polling ───────────────────────────────────────────

#[tokio::test]
async fn test_report_network_info_lines() {
    let harness = build();

    harness.controller.report_network_info();
    assert_eq!(
        harness.sink.take(),
        vec![
            "[WIFI MAC:AA:BB:CC:DD:EE:FF]".to_string(),
            "[IP:0.0.0.0]".to_string(),
        ]
    );

    let mut link = harness.controller.link_state();
    harness.controller.start().await.unwrap();
    harness.controller.push_radio_event(RadioEvent::ApStarted);
    wait_link(&mut link, "access point", |state| state.ap_active).await;

    harness.sink.take();
    harness
        .controller
        .note_active_stream(Some(ServiceKind::Telnet));
    harness.controller.report_network_info();

    let lines = harness.sink.take();
    assert!(lines.contains(&"[WIFI MAC:AA:BB:CC:DD:EE:FF]".to_string()));
    assert!(
        lines.contains(&"[IP:192.168.5.1]".to_string()),
        "ap address expected, got {lines:?}"
    );
    assert!(lines.contains(&"[NETCON:Telnet]".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_poll_dispatch_follows_running_services() {
    let harness = build();
    let mut link = harness.controller.link_state();
    harness.controller.start().await.unwrap();
    harness.controller.push_radio_event(RadioEvent::ApStarted);
    wait_link(&mut link, "services", |state| !state.services_running.is_empty()).await;

    drain(&harness.service_log);
    tokio::time::advance(SERVICE_POLL_PERIOD).await;
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }

    let polls: Vec<String> = drain(&harness.service_log)
        .into_iter()
        .filter(|entry| entry.ends_with(":poll"))
        .collect();
    assert!(
        polls.len() >= 4 && polls.len() % 4 == 0,
        "whole passes expected, got {polls:?}"
    );
    assert_eq!(
        polls[..4],
        [
            "Telnet:poll".to_string(),
            "Websocket:poll".to_string(),
            "HTTP:poll".to_string(),
            "FTP:poll".to_string(),
        ]
    );

    // Once nothing runs, ticks stop reaching the services.
    harness.controller.stop().await.unwrap();
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    drain(&harness.service_log);
    tokio::time::advance(SERVICE_POLL_PERIOD * 3).await;
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    let polls: Vec<String> = drain(&harness.service_log)
        .into_iter()
        .filter(|entry| entry.ends_with(":poll"))
        .collect();
    assert_eq!(polls, Vec::<String>::new());

    harness.controller.shutdown().await;
}
