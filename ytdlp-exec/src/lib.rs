//! Async process supervisor for the yt-dlp CLI.
//!
//! Runs yt-dlp as a child process and turns its status output into typed
//! events. Three calling conventions are offered by [`YtDlp`]:
//!
//! - [`YtDlp::exec`] streams [`ExecEvent`]s while the child runs,
//! - [`YtDlp::exec_buffered`] resolves to the captured stdout,
//! - [`YtDlp::exec_stream`] hands out the media bytes written to stdout.
//!
//! [`fetch`] installs a release binary from GitHub.
//!
//! # Example
//!
//! ```no_run
//! use tokio_stream::StreamExt;
//! use ytdlp_exec::{ExecEvent, ExecOptions, FetchOptions, YtDlp};
//!
//! #[tokio::main]
//! async fn main() -> ytdlp_exec::Result<()> {
//!     let asset = ytdlp_exec::fetch(FetchOptions::new().filepath("./bin/yt-dlp")).await?;
//!     let client = YtDlp::from_release(asset);
//!
//!     println!("yt-dlp version: {}", client.get_version().await?);
//!
//!     let mut run = client.exec(
//!         ["https://www.youtube.com/watch?v=dQw4w9WgXcQ", "-o", "video.mp4"],
//!         &ExecOptions::new()
//!     );
//!     while let Some(event) = run.events.next().await {
//!         match event {
//!             ExecEvent::Progress(p) => println!("{:.1}% of {}", p.percent, p.total_size),
//!             ExecEvent::Close(info) => println!("done ({:?})", info.code),
//!             ExecEvent::Error(failure) => eprintln!("{failure}"),
//!             ExecEvent::YtDlp(_) => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod command;
pub mod error;
pub mod parser;
pub mod release;
mod supervisor;
pub mod types;

pub use client::{BufferedExecution, Execution, StreamExecution, YtDlp};
pub use error::{Error, ExecFailure, Result};
pub use release::{Arch, FeedConfig, FetchOptions, Platform, ReleaseAsset, asset_name_for, fetch};
pub use supervisor::{EventStream, OutputStream, ProcessHandle};
pub use types::{ExecEvent, ExecOptions, ExitInfo, Progress, VideoMetadata, YtDlpEvent};
