// ── Deferred status notifications ──
//
// Event handling never writes to the operator stream directly; it queues
// a `Notice` and moves on. A reporter task drains the queue and writes
// the bracketed message lines to the host sink. The queue is bounded
// and the producer never blocks: when a consumer falls behind, the
// oldest unprocessed notices are lost, newest kept, order preserved.

use std::fmt;
use std::sync::Arc;

use airlink_hal::ReportSink;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Queue depth; small on purpose, notices are terse and frequent ones
/// supersede each other.
pub const NOTICE_QUEUE_DEPTH: usize = 16;

/// Operator-visible connectivity events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    ApReady,
    ApClientJoined,
    ApClientLeft,
    StaActive,
    StaDisconnected,
    ScanCompleted,
}

impl Notice {
    /// The exact report line for this notice.
    pub fn message(self) -> &'static str {
        match self {
            Self::ApReady => "[MSG:WIFI AP READY]",
            Self::ApClientJoined => "[MSG:WIFI AP CONNECTED]",
            Self::ApClientLeft => "[MSG:WIFI AP DISCONNECTED]",
            Self::StaActive => "[MSG:WIFI STA ACTIVE]",
            Self::StaDisconnected => "[MSG:WIFI STA DISCONNECTED]",
            Self::ScanCompleted => "[MSG:WIFI AP SCAN COMPLETED]",
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Producer half of the notice channel.
#[derive(Debug, Clone)]
pub(crate) struct NoticeQueue {
    tx: broadcast::Sender<Notice>,
}

impl NoticeQueue {
    pub(crate) fn new(depth: usize) -> Self {
        let (tx, _) = broadcast::channel(depth);
        Self { tx }
    }

    /// Enqueue without blocking. A queue with no consumers simply drops
    /// the notice.
    pub(crate) fn push(&self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            debug!(%notice, "no notice consumers attached");
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}

/// Drain notices to the report sink until cancelled.
pub(crate) fn spawn_reporter(
    mut rx: broadcast::Receiver<Notice>,
    sink: Arc<dyn ReportSink>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = rx.recv() => match result {
                    Ok(notice) => sink.write_line(notice.message()),
                    Err(broadcast::error::RecvError::Lagged(dropped)) => {
                        warn!(dropped, "notice queue overflowed, oldest dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("notice reporter stopped");
    })
}
