mod metadata;
mod options;
mod progress;

pub use metadata::VideoMetadata;
pub use options::ExecOptions;
pub use progress::{ExecEvent, ExitInfo, Progress, YtDlpEvent};
