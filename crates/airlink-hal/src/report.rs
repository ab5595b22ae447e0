// ── Status report seam ──
//
// Operator-visible status lines (`[MSG:...]`, `[IP:...]`) go out through
// whatever stream the host considers current. The sink appends its own
// line terminator; callers pass bare text.

/// Destination for one-line status reports.
pub trait ReportSink: Send + Sync {
    fn write_line(&self, text: &str);
}

/// Sink that drops everything, for hosts that run headless.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn write_line(&self, _text: &str) {}
}
