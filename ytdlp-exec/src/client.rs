use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio_stream::StreamExt;

use crate::command::CommandBuilder;
use crate::error::{Error, Result};
use crate::release::{Arch, Platform, ReleaseAsset};
use crate::supervisor::{self, EventStream, OutputStream, ParsedPipe, ProcessHandle};
use crate::types::{ExecEvent, ExecOptions, ExitInfo, VideoMetadata};

#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    defaults: ExecOptions,
    tag: Option<String>,
    asset_name: Option<String>,
    platform: Option<Platform>,
    arch: Option<Arch>
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlp {
    /// Client for the `yt-dlp` found on `PATH`.
    pub fn new() -> Self {
        Self::with_binary("yt-dlp")
    }

    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            binary: path.into(),
            defaults: ExecOptions::defaults(),
            tag: None,
            asset_name: None,
            platform: None,
            arch: None
        }
    }

    /// Client for a binary installed by [`crate::fetch`].
    pub fn from_release(asset: ReleaseAsset) -> Self {
        Self {
            binary: asset.filepath,
            defaults: ExecOptions::defaults(),
            tag: Some(asset.tag),
            asset_name: Some(asset.asset_name),
            platform: Some(asset.platform),
            arch: Some(asset.arch)
        }
    }

    pub fn set_binary(&mut self, path: PathBuf) {
        self.binary = path;
    }

    pub fn set_default_options(&mut self, options: ExecOptions) {
        self.defaults = options;
    }

    pub fn set_env(&mut self, key: String, value: String) {
        self.defaults.env.insert(key, value);
    }

    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }

    pub fn default_options(&self) -> &ExecOptions {
        &self.defaults
    }

    /// Release tag of the installed binary, when built from a [`ReleaseAsset`].
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn asset_name(&self) -> Option<&str> {
        self.asset_name.as_deref()
    }

    pub fn platform(&self) -> Option<&Platform> {
        self.platform.as_ref()
    }

    pub fn arch(&self) -> Option<&Arch> {
        self.arch.as_ref()
    }

    /// Runs yt-dlp and reports its progress as a live event stream.
    ///
    /// Returns immediately. The stream yields `Progress` and `YtDlp` events
    /// while the child runs and ends with exactly one `Close` or `Error`.
    /// Must be called from within a Tokio runtime.
    pub fn exec<I, S>(&self, args: I, options: &ExecOptions) -> Execution
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        let builder = self.command().args(args);
        let launched = supervisor::launch(&builder, &self.defaults.merge(options), ParsedPipe::Stdout);

        Execution {
            events: launched.events,
            handle: launched.handle
        }
    }

    /// Runs yt-dlp to completion and resolves to its stdout.
    pub fn exec_buffered<I, S>(&self, args: I, options: &ExecOptions) -> BufferedExecution
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        self.buffered(&self.command().args(args), options)
    }

    /// Runs yt-dlp with the media written to stdout (`-o -`).
    ///
    /// Status lines are parsed from stderr instead.
    pub fn exec_stream<I, S>(&self, args: I, options: &ExecOptions) -> StreamExecution
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        let builder = self.command().args(args).output_to_stdout();
        let launched = supervisor::launch(&builder, &self.defaults.merge(options), ParsedPipe::Stderr);

        StreamExecution {
            stdout: launched.stdout,
            events: launched.events,
            handle: launched.handle
        }
    }

    pub async fn get_extractors(&self) -> Result<Vec<String>> {
        let stdout = self.exec_buffered(["--list-extractors"], &ExecOptions::new()).await?;
        Ok(split_lines(&stdout))
    }

    pub async fn get_extractor_descriptions(&self) -> Result<Vec<String>> {
        let stdout = self.exec_buffered(["--extractor-descriptions"], &ExecOptions::new()).await?;
        Ok(split_lines(&stdout))
    }

    pub async fn get_help(&self) -> Result<String> {
        self.exec_buffered(["--help"], &ExecOptions::new()).await
    }

    pub async fn get_user_agent(&self) -> Result<String> {
        let stdout = self.exec_buffered(["--dump-user-agent"], &ExecOptions::new()).await?;
        Ok(stdout.trim().to_string())
    }

    pub async fn get_version(&self) -> Result<String> {
        let stdout = self.exec_buffered(["--version"], &ExecOptions::new()).await?;
        Ok(stdout.trim().to_string())
    }

    /// Fetches `--dump-json` metadata for one or more inputs.
    ///
    /// `args` usually holds URLs, optionally mixed with flags. `-f best` is
    /// added unless a format is already given.
    pub async fn get_video_info<I, S>(&self, args: I) -> Result<VideoMetadata>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        let builder = self
            .command()
            .args(args)
            .default_format()
            .json_output();
        let stdout = self.buffered(&builder, &ExecOptions::new()).await?;

        VideoMetadata::parse(&stdout)
    }

    /// Like [`YtDlp::get_video_info`], deserializing each item into `T`.
    pub async fn get_video_info_as<T, I, S>(&self, args: I) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        self.get_video_info(args).await?.deserialize()
    }

    fn buffered(&self, builder: &CommandBuilder, options: &ExecOptions) -> BufferedExecution {
        let (handle, result) = supervisor::launch_buffered(builder, &self.defaults.merge(options));
        BufferedExecution { handle, result }
    }

    fn command(&self) -> CommandBuilder {
        CommandBuilder::new(&self.binary)
    }
}

fn split_lines(stdout: &str) -> Vec<String> {
    stdout.lines().map(str::to_string).collect()
}

/// Event-mode invocation: the live event stream paired with its handle.
#[derive(Debug)]
pub struct Execution {
    pub events: EventStream,
    pub handle: ProcessHandle
}

impl Execution {
    /// Drains the remaining events and returns the terminal outcome.
    pub async fn wait(mut self) -> Result<ExitInfo> {
        while let Some(event) = self.events.next().await {
            match event {
                ExecEvent::Close(info) => return Ok(info),
                ExecEvent::Error(failure) => return Err(Error::CommandFailed(failure)),
                ExecEvent::Progress(_) | ExecEvent::YtDlp(_) => {}
            }
        }
        Err(Error::ExecutionFailed(std::io::Error::other(
            "yt-dlp supervisor stopped without an exit status"
        )))
    }

    pub fn kill(&self) {
        self.handle.kill();
    }
}

/// Buffered-mode invocation. Await it for stdout; use
/// [`BufferedExecution::handle`] to cancel it while in flight.
#[derive(Debug)]
pub struct BufferedExecution {
    handle: ProcessHandle,
    result: oneshot::Receiver<Result<String>>
}

impl BufferedExecution {
    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    pub fn kill(&self) {
        self.handle.kill();
    }
}

impl Future for BufferedExecution {
    type Output = Result<String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.result).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Cancelled)),
            Poll::Pending => Poll::Pending
        }
    }
}

/// Stream-mode invocation: media bytes, status events and the handle.
#[derive(Debug)]
pub struct StreamExecution {
    pub stdout: OutputStream,
    pub events: EventStream,
    pub handle: ProcessHandle
}
