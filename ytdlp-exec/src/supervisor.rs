//! Child process supervision.
//!
//! Every invocation owns one child, one [`ProcessHandle`] and one background
//! task. The task drains the child's pipes, forwards parsed events in arrival
//! order and publishes exactly one terminal event once both pipes reached EOF
//! and the child has been reaped.

use std::future::Future;
use std::pin::Pin;
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::process::{Child, ChildStdout};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::command::CommandBuilder;
use crate::error::{Error, ExecFailure, Result};
use crate::parser::LineParser;
use crate::types::{ExecEvent, ExecOptions, ExitInfo};

const READ_BUF_SIZE: usize = 8 * 1024;

/// Cancellation handle of a running invocation.
///
/// Cloning is cheap and every clone controls the same child.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    token: CancellationToken,
    killed: Arc<AtomicBool>,
    pid: Option<u32>
}

impl ProcessHandle {
    fn new(parent: Option<&CancellationToken>, pid: Option<u32>) -> Self {
        Self {
            token: parent.map_or_else(CancellationToken::new, CancellationToken::child_token),
            killed: Arc::new(AtomicBool::new(false)),
            pid
        }
    }

    /// Requests termination of the child. A killed child closes cleanly.
    pub fn kill(&self) {
        self.token.cancel();
    }

    /// Whether the kill signal was actually delivered to the child.
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// OS process id, `None` when the child failed to start.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Ordered stream of [`ExecEvent`]s, ending after the terminal event.
///
/// Unbounded: the pipes keep draining while nobody polls the stream, so a
/// caller reading [`OutputStream`] first cannot stall the child.
#[derive(Debug)]
pub struct EventStream {
    inner: UnboundedReceiverStream<ExecEvent>
}

impl EventStream {
    fn new(rx: mpsc::UnboundedReceiver<ExecEvent>) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(rx)
        }
    }

    pub async fn recv(&mut self) -> Option<ExecEvent> {
        tokio_stream::StreamExt::next(&mut self.inner).await
    }
}

impl Stream for EventStream {
    type Item = ExecEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// The media bytes yt-dlp writes to stdout in stream mode.
///
/// Reads as an empty stream when the child could not be started.
#[derive(Debug)]
pub struct OutputStream {
    inner: Option<ChildStdout>
}

impl AsyncRead for OutputStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut().inner.as_mut() {
            Some(stdout) => Pin::new(stdout).poll_read(cx, buf),
            None => Poll::Ready(Ok(()))
        }
    }
}

/// Which pipe carries yt-dlp's status lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParsedPipe {
    /// Event mode: status on stdout, stderr kept for diagnostics.
    Stdout,
    /// Stream mode: media on stdout, status and diagnostics on stderr.
    Stderr
}

pub(crate) struct Launched {
    pub handle: ProcessHandle,
    pub events: EventStream,
    pub stdout: OutputStream
}

/// Spawns the child and a task supervising it in event or stream mode.
///
/// Must be called from within a Tokio runtime.
pub(crate) fn launch(builder: &CommandBuilder, options: &ExecOptions, pipe: ParsedPipe) -> Launched {
    let (tx, rx) = mpsc::unbounded_channel();
    let events = EventStream::new(rx);

    let mut child = match spawn(builder, options) {
        Ok(child) => child,
        Err(err) => {
            // The receiver is still held by `events`.
            let _ = tx.send(ExecEvent::Error(ExecFailure::launch(&err)));
            return Launched {
                handle: ProcessHandle::new(options.cancel.as_ref(), None),
                events,
                stdout: OutputStream { inner: None }
            };
        }
    };

    let handle = ProcessHandle::new(options.cancel.as_ref(), child.id());
    let task_handle = handle.clone();
    let stderr = child.stderr.take();

    let stdout = match pipe {
        ParsedPipe::Stdout => {
            let stdout = child.stdout.take();
            tokio::spawn(async move {
                let tx_ref = &tx;
                let drain = async move {
                    let ((), diagnostics) =
                        tokio::join!(pump_events(stdout, tx_ref, None), read_all(stderr));
                    diagnostics
                };
                publish_exit(child, drain, &task_handle, &tx).await;
            });
            None
        }
        ParsedPipe::Stderr => {
            let stdout = child.stdout.take();
            tokio::spawn(async move {
                let tx_ref = &tx;
                let drain = async move {
                    let mut diagnostics = Vec::new();
                    pump_events(stderr, tx_ref, Some(&mut diagnostics)).await;
                    diagnostics
                };
                publish_exit(child, drain, &task_handle, &tx).await;
            });
            stdout
        }
    };

    Launched {
        handle,
        events,
        stdout: OutputStream { inner: stdout }
    }
}

/// Spawns the child and a task capturing stdout and stderr whole.
pub(crate) fn launch_buffered(
    builder: &CommandBuilder,
    options: &ExecOptions
) -> (ProcessHandle, oneshot::Receiver<Result<String>>) {
    let (tx, rx) = oneshot::channel();

    let mut child = match spawn(builder, options) {
        Ok(child) => child,
        Err(err) => {
            let _ = tx.send(Err(Error::ExecutionFailed(err)));
            return (ProcessHandle::new(options.cancel.as_ref(), None), rx);
        }
    };

    let handle = ProcessHandle::new(options.cancel.as_ref(), child.id());
    let task_handle = handle.clone();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    tokio::spawn(async move {
        let drain = async move { tokio::join!(read_all(stdout), read_all(stderr)) };
        let ((stdout, stderr), status) = supervise(&mut child, drain, &task_handle).await;

        let result = match status {
            Ok(_) if task_handle.is_killed() => Err(Error::Cancelled),
            Ok(status) if status.success() => Ok(String::from_utf8_lossy(&stdout).into_owned()),
            Ok(status) => Err(Error::CommandFailed(ExecFailure {
                code: status.code(),
                process_error: None,
                stderr: String::from_utf8_lossy(&stderr).into_owned()
            })),
            Err(err) => Err(Error::ExecutionFailed(err))
        };

        if tx.send(result).is_err() {
            tracing::debug!("buffered yt-dlp result dropped by caller");
        }
    });

    (handle, rx)
}

fn spawn(builder: &CommandBuilder, options: &ExecOptions) -> std::io::Result<Child> {
    tracing::debug!(
        binary = %builder.binary().display(),
        args = ?builder.get_args(),
        "spawning yt-dlp"
    );

    builder.build(options).spawn().inspect_err(|err| {
        tracing::debug!(error = %err, binary = %builder.binary().display(), "failed to spawn yt-dlp");
    })
}

async fn publish_exit(
    mut child: Child,
    drain: impl Future<Output = Vec<u8>>,
    handle: &ProcessHandle,
    tx: &mpsc::UnboundedSender<ExecEvent>
) {
    let (stderr, status) = supervise(&mut child, drain, handle).await;
    let event = terminal_event(status, handle.is_killed(), &stderr);

    match event {
        ExecEvent::Close(info) => tracing::debug!(code = ?info.code, killed = info.killed, "yt-dlp closed"),
        ExecEvent::Error(ref failure) => tracing::debug!(code = ?failure.code, "yt-dlp failed"),
        _ => {}
    }

    if tx.send(event).is_err() {
        tracing::debug!("event receiver dropped before yt-dlp finished");
    }
}

/// Drives `drain` to completion while honouring cancellation, then reaps the
/// child. Output is always drained fully, even after a kill.
async fn supervise<T>(
    child: &mut Child,
    drain: impl Future<Output = T>,
    handle: &ProcessHandle
) -> (T, std::io::Result<ExitStatus>) {
    tokio::pin!(drain);
    let mut kill_sent = false;

    let output = loop {
        tokio::select! {
            () = handle.token.cancelled(), if !kill_sent => {
                kill_sent = true;
                kill_child(child, handle);
            }
            output = &mut drain => break output
        }
    };

    if !kill_sent {
        let waited = tokio::select! {
            status = child.wait() => Some(status),
            () = handle.token.cancelled() => None
        };
        if let Some(status) = waited {
            return (output, status);
        }
        kill_child(child, handle);
    }

    (output, child.wait().await)
}

fn kill_child(child: &mut Child, handle: &ProcessHandle) {
    match child.start_kill() {
        Ok(()) => {
            handle.killed.store(true, Ordering::SeqCst);
            tracing::debug!(pid = ?child.id(), "killed yt-dlp");
        }
        Err(err) => tracing::debug!(error = %err, "yt-dlp exited before it could be killed")
    }
}

fn terminal_event(status: std::io::Result<ExitStatus>, killed: bool, stderr: &[u8]) -> ExecEvent {
    match status {
        Ok(status) if status.success() || killed => ExecEvent::Close(ExitInfo {
            code: status.code(),
            killed
        }),
        Ok(status) => ExecEvent::Error(ExecFailure {
            code: status.code(),
            process_error: None,
            stderr: String::from_utf8_lossy(stderr).into_owned()
        }),
        Err(err) => ExecEvent::Error(ExecFailure {
            code: None,
            process_error: Some(err.to_string()),
            stderr: String::from_utf8_lossy(stderr).into_owned()
        })
    }
}

async fn pump_events<R>(
    reader: Option<R>,
    tx: &mpsc::UnboundedSender<ExecEvent>,
    mut capture: Option<&mut Vec<u8>>
) where
    R: AsyncRead + Unpin
{
    let Some(mut reader) = reader else {
        return;
    };
    let mut parser = LineParser::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read yt-dlp output");
                break;
            }
        };
        if let Some(captured) = capture.as_deref_mut() {
            captured.extend_from_slice(&buf[..n]);
        }
        for event in parser.feed(&buf[..n]) {
            forward(tx, event);
        }
    }

    for event in parser.finish() {
        forward(tx, event);
    }
}

fn forward(tx: &mpsc::UnboundedSender<ExecEvent>, event: ExecEvent) {
    // A dropped receiver must not stop the pipe from being drained.
    let _ = tx.send(event);
}

async fn read_all<R>(reader: Option<R>) -> Vec<u8>
where
    R: AsyncRead + Unpin
{
    let mut out = Vec::new();
    if let Some(mut reader) = reader
        && let Err(err) = reader.read_to_end(&mut out).await
    {
        tracing::warn!(error = %err, "failed to read yt-dlp output");
    }
    out
}
