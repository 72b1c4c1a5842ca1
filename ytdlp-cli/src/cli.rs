use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ytdlp_exec::{Arch, Platform};

#[derive(Parser)]
#[command(name = "ytdlp", version, about = "Run and install yt-dlp")]
pub struct Cli {
    /// yt-dlp binary to run
    #[arg(long, global = true, env = "YTDLP_PATH", default_value = "yt-dlp")]
    pub binary: PathBuf,

    /// Working directory for yt-dlp
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command
}

#[derive(Subcommand)]
pub enum Command {
    /// Download a yt-dlp release binary
    Fetch(FetchArgs),
    /// Run yt-dlp and report its progress
    Run(RunArgs),
    /// Run yt-dlp and write the media to stdout
    Stream(PassthroughArgs),
    /// Print JSON metadata for one or more URLs
    Info(PassthroughArgs),
    /// Print the yt-dlp version
    Version,
    /// List supported extractors
    Extractors {
        /// Print descriptions instead of names
        #[arg(long)]
        descriptions: bool
    },
    /// Print the user agent yt-dlp sends
    UserAgent,
    /// Print yt-dlp's own help text
    HelpText
}

#[derive(Args)]
pub struct FetchArgs {
    /// Install location (defaults to the asset name in the working directory)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Release tag (defaults to the latest release)
    #[arg(long)]
    pub tag: Option<String>,

    /// Release asset name (derived from platform and arch when omitted)
    #[arg(long)]
    pub asset: Option<String>,

    /// Target platform: darwin, win32, linux
    #[arg(long)]
    pub platform: Option<Platform>,

    /// Target architecture: x64, ia32, arm, arm64
    #[arg(long)]
    pub arch: Option<Arch>,

    /// GitHub API base URL
    #[arg(long, env = "YTDLP_RELEASE_API", default_value = "https://api.github.com")]
    pub api_base: String,

    /// GitHub token used for the release lookup
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>
}

#[derive(Args)]
pub struct RunArgs {
    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Arguments passed to yt-dlp verbatim
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub args: Vec<String>
}

#[derive(Args)]
pub struct PassthroughArgs {
    /// Arguments passed to yt-dlp verbatim
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub args: Vec<String>
}
