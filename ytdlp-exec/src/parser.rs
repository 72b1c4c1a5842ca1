//! Decoding of yt-dlp status output.
//!
//! yt-dlp reports what it is doing with bracketed lines such as
//! `[youtube] dQw4w9WgXcQ: Downloading webpage` and redraws its progress line
//! with carriage returns. [`LineParser`] turns raw pipe bytes into
//! [`ExecEvent::Progress`] and [`ExecEvent::YtDlp`] events.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{ExecEvent, Progress, YtDlpEvent};

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[download\] *(.*?) of *~? *([^ ]+)(?: *at *([^ ]+))?(?: *ETA *([^ ]+))?")
        .expect("progress pattern is valid")
});

/// Incremental parser over a child's output pipe.
///
/// Bytes after the last `\r` or `\n` of a chunk are held back until the line
/// is completed by a later chunk or flushed with [`LineParser::finish`].
#[derive(Debug, Default)]
pub struct LineParser {
    pending: Vec<u8>
}

impl LineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk and returns the events of every completed line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ExecEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.pending[start..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r')
        {
            let end = start + pos;
            parse_bytes(&self.pending[start..end], &mut events);
            start = end + 1;
        }
        self.pending.drain(..start);

        events
    }

    /// Parses whatever is left once the pipe reached EOF.
    pub fn finish(&mut self) -> Vec<ExecEvent> {
        let mut events = Vec::new();
        let rest = std::mem::take(&mut self.pending);
        parse_bytes(&rest, &mut events);
        events
    }
}

fn parse_bytes(bytes: &[u8], events: &mut Vec<ExecEvent>) {
    if bytes.is_empty() {
        return;
    }
    let line = String::from_utf8_lossy(bytes);
    tracing::trace!(line = %line, "yt-dlp output");
    events.extend(parse_line(&line));
}

/// Events for a single line: a progress record when the line is a download
/// progress line, followed by the generic event every bracketed line yields.
pub fn parse_line(line: &str) -> Vec<ExecEvent> {
    let Some(event) = parse_event(line) else {
        return Vec::new();
    };

    let mut events = Vec::with_capacity(2);
    if let Some(progress) = parse_progress(line) {
        events.push(ExecEvent::Progress(progress));
    }
    events.push(ExecEvent::YtDlp(event));
    events
}

pub fn parse_progress(line: &str) -> Option<Progress> {
    if !line.starts_with('[') {
        return None;
    }
    let caps = PROGRESS_RE.captures(line)?;

    let percent = caps
        .get(1)?
        .as_str()
        .trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .ok()?;

    Some(Progress {
        percent,
        total_size: caps.get(2)?.as_str().to_string(),
        current_speed: caps.get(3).map(|m| m.as_str().to_string()),
        eta: caps.get(4).map(|m| m.as_str().to_string())
    })
}

pub fn parse_event(line: &str) -> Option<YtDlpEvent> {
    let rest = line.strip_prefix('[')?;

    let tag = match rest.find(']') {
        Some(end) => &rest[..end],
        None => rest.split(' ').next().unwrap_or_default()
    };
    let payload = line.split_once(' ').map_or("", |(_, payload)| payload);

    Some(YtDlpEvent {
        tag: tag.to_string(),
        payload: payload.to_string()
    })
}
