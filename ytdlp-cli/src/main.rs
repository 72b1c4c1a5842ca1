mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ytdlp_exec::{ExecOptions, YtDlp};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ytdlp_cli=info,ytdlp_exec=info".into())
        )
        .init();

    let cli = Cli::parse();

    let mut client = YtDlp::with_binary(&cli.binary);
    if let Some(cwd) = &cli.cwd {
        client.set_default_options(client.default_options().clone().cwd(cwd));
    }
    tracing::debug!("Using yt-dlp binary: {}", cli.binary.display());

    let token = CancellationToken::new();
    let options = ExecOptions::new().cancel_token(token.clone());

    match cli.command {
        Command::Fetch(args) => commands::fetch(args).await,
        Command::Run(args) => {
            commands::cancel_on_ctrl_c(token);
            commands::run(&client, &options, args).await
        }
        Command::Stream(args) => {
            commands::cancel_on_ctrl_c(token);
            commands::stream(&client, &options, args).await
        }
        Command::Info(args) => commands::info(&client, args).await,
        Command::Version => commands::version(&client).await,
        Command::Extractors { descriptions } => commands::extractors(&client, descriptions).await,
        Command::UserAgent => commands::user_agent(&client).await,
        Command::HelpText => commands::help_text(&client).await
    }
}
