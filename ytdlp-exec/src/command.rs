use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::types::ExecOptions;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

pub struct CommandBuilder {
    binary: PathBuf,
    args: Vec<String>
}

impl CommandBuilder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn json_output(self) -> Self {
        self.arg("--dump-json")
    }

    pub fn format(self, format: impl Into<String>) -> Self {
        self.arg("-f").arg(format)
    }

    /// Makes yt-dlp write the media itself to stdout.
    pub fn output_to_stdout(self) -> Self {
        self.arg("-o").arg("-")
    }

    pub fn has_format(&self) -> bool {
        self.args.iter().any(|a| a == "-f" || a == "--format")
    }

    /// Requests `best` unless the caller already picked a format.
    pub fn default_format(self) -> Self {
        if self.has_format() {
            self
        } else {
            self.format("best")
        }
    }

    /// Builds a command with every stdio stream piped and `options` applied.
    pub fn build(&self, options: &ExecOptions) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if options.env_clear {
            cmd.env_clear();
        }
        cmd.envs(&options.env);

        if let Some(ref dir) = options.cwd {
            cmd.current_dir(dir);
        }

        #[cfg(windows)]
        if options.no_window.unwrap_or(false) {
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd
    }

    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }
}
