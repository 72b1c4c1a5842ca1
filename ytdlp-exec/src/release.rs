//! Installing yt-dlp from its GitHub releases.

use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_stream::StreamExt;

use crate::error::{Error, Result};

const MAX_REDIRECTS: usize = 3;
const MAX_ERROR_BODY_CHARS: usize = 5000;

/// Operating system naming as used by the release feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Platform {
    Darwin,
    Win32,
    Linux,
    Other(String)
}

impl Platform {
    pub fn host() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::Darwin,
            "windows" => Platform::Win32,
            "linux" => Platform::Linux,
            other => Platform::Other(other.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Platform::Darwin => "darwin",
            Platform::Win32 => "win32",
            Platform::Linux => "linux",
            Platform::Other(name) => name
        }
    }

    pub fn is_windows(&self) -> bool {
        *self == Platform::Win32
    }
}

impl FromStr for Platform {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "darwin" | "macos" => Platform::Darwin,
            "win32" | "windows" => Platform::Win32,
            "linux" => Platform::Linux,
            other => Platform::Other(other.to_string())
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// CPU architecture naming as used by the release feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arch {
    X64,
    Ia32,
    Arm,
    Arm64,
    Other(String)
}

impl Arch {
    pub fn host() -> Self {
        match std::env::consts::ARCH {
            "x86_64" => Arch::X64,
            "x86" => Arch::Ia32,
            "arm" => Arch::Arm,
            "aarch64" => Arch::Arm64,
            other => Arch::Other(other.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Arch::X64 => "x64",
            Arch::Ia32 => "ia32",
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::Other(name) => name
        }
    }
}

impl FromStr for Arch {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "x64" | "x86_64" | "amd64" => Arch::X64,
            "ia32" | "x86" | "i686" => Arch::Ia32,
            "arm" | "armv7l" => Arch::Arm,
            "arm64" | "aarch64" => Arch::Arm64,
            other => Arch::Other(other.to_string())
        })
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Arch {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Release asset name for a platform/architecture pair.
///
/// macOS gets the universal binary. Anything that is neither macOS nor
/// Windows is treated as Linux.
pub fn asset_name_for(platform: &Platform, arch: &Arch) -> &'static str {
    match (platform, arch) {
        (Platform::Darwin, _) => "yt-dlp_macos",
        (Platform::Win32, Arch::Ia32) => "yt-dlp_x86.exe",
        (Platform::Win32, _) => "yt-dlp.exe",
        (_, Arch::Arm) => "yt-dlp_linux_armv7l",
        (_, Arch::Arm64) => "yt-dlp_linux_aarch64",
        _ => "yt-dlp"
    }
}

/// Where releases are looked up.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    /// GitHub token, raises the API rate limit.
    pub token: Option<String>,
    pub user_agent: String
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            owner: "yt-dlp".to_string(),
            repo: "yt-dlp".to_string(),
            token: None,
            user_agent: concat!("ytdlp-exec/", env!("CARGO_PKG_VERSION")).to_string()
        }
    }
}

impl FeedConfig {
    fn release_url(&self, tag: Option<&str>) -> String {
        let base = self.api_base.trim_end_matches('/');
        match tag {
            Some(tag) => format!("{base}/repos/{}/{}/releases/tags/{tag}", self.owner, self.repo),
            None => format!("{base}/repos/{}/{}/releases/latest", self.owner, self.repo)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Install location. Defaults to the asset name in the working directory.
    pub filepath: Option<PathBuf>,
    /// Asset to download. Derived from platform and arch when unset.
    pub asset_name: Option<String>,
    /// Release tag. The latest release when unset.
    pub tag: Option<String>,
    pub platform: Option<Platform>,
    pub arch: Option<Arch>,
    pub feed: FeedConfig
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filepath(mut self, path: impl Into<PathBuf>) -> Self {
        self.filepath = Some(path.into());
        self
    }

    pub fn asset_name(mut self, name: impl Into<String>) -> Self {
        self.asset_name = Some(name.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn arch(mut self, arch: Arch) -> Self {
        self.arch = Some(arch);
        self
    }

    pub fn feed(mut self, feed: FeedConfig) -> Self {
        self.feed = feed;
        self
    }
}

/// An installed release binary. Feed it to [`crate::YtDlp::from_release`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseAsset {
    pub filepath: PathBuf,
    pub tag: String,
    pub asset_name: String,
    pub platform: Platform,
    pub arch: Arch
}

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    assets: Vec<GitHubAsset>
}

#[derive(Debug, Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String
}

/// Downloads a yt-dlp release binary and makes it executable.
///
/// The redirect limit of 3 applies to the release lookup as well as the
/// asset download. A download that fails midway leaves no file behind.
pub async fn fetch(options: FetchOptions) -> Result<ReleaseAsset> {
    let platform = options.platform.unwrap_or_else(Platform::host);
    let arch = options.arch.unwrap_or_else(Arch::host);
    let asset_name = options
        .asset_name
        .unwrap_or_else(|| asset_name_for(&platform, &arch).to_string());

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .user_agent(&options.feed.user_agent)
        .build()?;

    let release = fetch_release(&client, &options.feed, options.tag.as_deref()).await?;
    let filepath = resolve_filepath(options.filepath, &asset_name, &platform)?;

    let asset = release
        .assets
        .iter()
        .find(|asset| asset.name == asset_name)
        .ok_or_else(|| Error::AssetNotFound(asset_name.clone()))?;

    tracing::info!(
        tag = %release.tag_name,
        asset = %asset_name,
        path = %filepath.display(),
        "downloading yt-dlp"
    );

    let written = download_to(&client, &asset.browser_download_url, &filepath).await?;

    if !platform.is_windows() {
        make_executable(&filepath).await?;
    }

    tracing::info!(bytes = written, path = %filepath.display(), "installed yt-dlp");

    Ok(ReleaseAsset {
        filepath,
        tag: release.tag_name,
        asset_name,
        platform,
        arch
    })
}

async fn fetch_release(
    client: &reqwest::Client,
    feed: &FeedConfig,
    tag: Option<&str>
) -> Result<GitHubRelease> {
    let url = feed.release_url(tag);
    tracing::debug!(url = %url, "looking up yt-dlp release");

    let mut request = client
        .get(&url)
        .header("Accept", "application/vnd.github+json");
    if let Some(ref token) = feed.token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::ReleaseLookup {
            status: status.as_u16(),
            body: truncate_chars(&body, MAX_ERROR_BODY_CHARS)
        });
    }

    Ok(response.json().await?)
}

async fn download_to(client: &reqwest::Client, url: &str, path: &Path) -> Result<u64> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::DownloadFailed {
            status: status.as_u16(),
            body: truncate_chars(&body, MAX_ERROR_BODY_CHARS)
        });
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }

    let file = fs::File::create(path).await?;
    match write_body(file, response).await {
        Ok(written) => Ok(written),
        Err(err) => {
            if let Err(remove_err) = fs::remove_file(path).await {
                tracing::warn!(error = %remove_err, path = %path.display(), "failed to remove partial download");
            }
            Err(err)
        }
    }
}

async fn write_body(mut file: fs::File, response: reqwest::Response) -> Result<u64> {
    let stream = response.bytes_stream();
    tokio::pin!(stream);
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}

fn resolve_filepath(
    explicit: Option<PathBuf>,
    asset_name: &str,
    platform: &Platform
) -> std::io::Result<PathBuf> {
    let path = match explicit {
        Some(path) => path,
        None => std::env::current_dir()?.join(asset_name)
    };

    if platform.is_windows() && !path.to_string_lossy().ends_with(".exe") {
        let mut name = path.into_os_string();
        name.push(".exe");
        return Ok(PathBuf::from(name));
    }

    Ok(path)
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, std::fs::Permissions::from_mode(0o777)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
