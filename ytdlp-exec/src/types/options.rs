use std::collections::HashMap;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

/// Per-invocation process configuration.
///
/// A client keeps one set of defaults (see [`ExecOptions::defaults`]) and each
/// call may pass overrides; the two are combined with [`ExecOptions::merge`].
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Working directory of the child. `None` inherits the caller's.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables for the child.
    pub env: HashMap<String, String>,
    /// Start the child with an empty environment before applying `env`.
    pub env_clear: bool,
    /// Killing the child when this token fires. A killed child closes cleanly.
    pub cancel: Option<CancellationToken>,
    /// Hide the console window of the child on Windows. No-op elsewhere.
    pub no_window: Option<bool>
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults applied to every invocation: the current working directory
    /// and a hidden console window.
    pub fn defaults() -> Self {
        Self {
            cwd: std::env::current_dir().ok(),
            no_window: Some(true),
            ..Self::default()
        }
    }

    /// Combines `self` (the defaults) with `overrides`, field by field.
    ///
    /// Optional fields take the override when it is set. Environment maps are
    /// unioned with override entries winning, and `env_clear` is set when
    /// either side asks for it.
    pub fn merge(&self, overrides: &ExecOptions) -> ExecOptions {
        let mut env = self.env.clone();
        env.extend(overrides.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        ExecOptions {
            cwd: overrides.cwd.clone().or_else(|| self.cwd.clone()),
            env,
            env_clear: self.env_clear || overrides.env_clear,
            cancel: overrides.cancel.clone().or_else(|| self.cancel.clone()),
            no_window: overrides.no_window.or(self.no_window)
        }
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn env_clear(mut self, clear: bool) -> Self {
        self.env_clear = clear;
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn no_window(mut self, hide: bool) -> Self {
        self.no_window = Some(hide);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_use_current_dir() {
        let defaults = ExecOptions::defaults();
        assert_eq!(defaults.cwd, std::env::current_dir().ok());
        assert_eq!(defaults.no_window, Some(true));
        assert!(defaults.cancel.is_none());
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let defaults = ExecOptions::new()
            .cwd("/srv/media")
            .env("LANG", "C")
            .env("HTTP_PROXY", "http://proxy:3128");
        let overrides = ExecOptions::new()
            .cwd("/tmp")
            .env("LANG", "en_US.UTF-8")
            .no_window(false);

        let merged = defaults.merge(&overrides);
        assert_eq!(merged.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(merged.env.get("LANG").map(String::as_str), Some("en_US.UTF-8"));
        assert_eq!(
            merged.env.get("HTTP_PROXY").map(String::as_str),
            Some("http://proxy:3128")
        );
        assert_eq!(merged.no_window, Some(false));
        assert!(!merged.env_clear);
    }

    #[test]
    fn test_merge_keeps_defaults_when_unset() {
        let token = CancellationToken::new();
        let defaults = ExecOptions::new()
            .cwd("/srv/media")
            .cancel_token(token.clone())
            .env_clear(true);

        let merged = defaults.merge(&ExecOptions::new());
        assert_eq!(merged.cwd, Some(PathBuf::from("/srv/media")));
        assert!(merged.env_clear);

        token.cancel();
        assert!(merged.cancel.is_some_and(|t| t.is_cancelled()));
    }
}
