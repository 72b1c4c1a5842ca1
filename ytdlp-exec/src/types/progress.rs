use serde::Serialize;

use crate::error::ExecFailure;

/// Decoded `[download]` progress line.
///
/// Values are kept as yt-dlp printed them (`"10.00MiB"`, `"1.20MiB/s"`,
/// `"00:10"`); only the percentage is numeric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub percent: f64,
    pub total_size: String,
    pub current_speed: Option<String>,
    pub eta: Option<String>
}

/// Any bracketed status line, e.g. `[youtube] abc: Downloading webpage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YtDlpEvent {
    pub tag: String,
    pub payload: String
}

/// Clean end of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitInfo {
    /// Exit code reported by the OS. `None` when the child died to a signal.
    pub code: Option<i32>,
    /// The child was killed through its handle or cancellation token.
    pub killed: bool
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecEvent {
    Progress(Progress),
    YtDlp(YtDlpEvent),
    Close(ExitInfo),
    Error(ExecFailure)
}

impl ExecEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecEvent::Close(_) | ExecEvent::Error(_))
    }
}

impl Progress {
    /// Fraction in `0.0..=1.0`, handy for progress bars.
    pub fn fraction(&self) -> f64 {
        (self.percent / 100.0).clamp(0.0, 1.0)
    }
}
