use std::fmt;

/// Diagnostic payload of a failed invocation.
///
/// Carries everything needed to understand why yt-dlp did not exit cleanly:
/// the exit code (absent when the process never started or died to a signal),
/// the launch error if spawning failed, and the captured stderr text.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ExecFailure {
    pub code: Option<i32>,
    pub process_error: Option<String>,
    pub stderr: String
}

impl ExecFailure {
    pub(crate) fn launch(err: &std::io::Error) -> Self {
        Self {
            code: None,
            process_error: Some(err.to_string()),
            stderr: String::new()
        }
    }
}

impl fmt::Display for ExecFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "yt-dlp failed with exit code {code}")?,
            None => write!(f, "yt-dlp failed without an exit code")?
        }
        if let Some(ref err) = self.process_error {
            write!(f, "\n\nProcess error:\n{err}")?;
        }
        if !self.stderr.is_empty() {
            write!(f, "\n\nStderr:\n{}", self.stderr)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecFailure {}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to execute yt-dlp: {0}")]
    ExecutionFailed(#[from] std::io::Error),

    #[error("{0}")]
    CommandFailed(ExecFailure),

    #[error("failed to parse JSON output: {0}")]
    JsonParseFailed(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("release lookup failed with status {status}: {body}")]
    ReleaseLookup { status: u16, body: String },

    #[error("an asset must exist with the name of {0}")]
    AssetNotFound(String),

    #[error("unexpected download response {status}: {body}")]
    DownloadFailed { status: u16, body: String },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error)
}

impl Error {
    /// Exit code of the failed process, when there is one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::CommandFailed(failure) => failure.code,
            _ => None
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
