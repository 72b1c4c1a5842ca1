use std::process::ExitCode;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use ytdlp_exec::{ExecEvent, ExecOptions, FeedConfig, FetchOptions, YtDlp};

use crate::cli::{FetchArgs, PassthroughArgs, RunArgs};

pub async fn fetch(args: FetchArgs) -> Result<ExitCode> {
    let mut options = FetchOptions::new().feed(FeedConfig {
        api_base: args.api_base,
        token: args.github_token,
        ..FeedConfig::default()
    });
    options.filepath = args.path;
    options.asset_name = args.asset;
    options.tag = args.tag;
    options.platform = args.platform;
    options.arch = args.arch;

    let asset = ytdlp_exec::fetch(options)
        .await
        .context("failed to install yt-dlp")?;

    println!("{}", serde_json::to_string_pretty(&asset)?);
    Ok(ExitCode::SUCCESS)
}

pub async fn run(client: &YtDlp, options: &ExecOptions, args: RunArgs) -> Result<ExitCode> {
    let mut execution = client.exec(args.args, options);

    while let Some(event) = execution.events.next().await {
        if args.json {
            print_json_event(&event)?;
        }

        match event {
            ExecEvent::Progress(progress) if !args.json => {
                tracing::info!(
                    percent = format_args!("{:.1}", progress.fraction() * 100.0),
                    size = %progress.total_size,
                    speed = progress.current_speed.as_deref().unwrap_or("-"),
                    eta = progress.eta.as_deref().unwrap_or("-"),
                    "progress"
                );
            }
            ExecEvent::YtDlp(event) if !args.json => {
                tracing::debug!(tag = %event.tag, "{}", event.payload);
            }
            ExecEvent::Close(info) => {
                if info.killed {
                    tracing::warn!("yt-dlp was cancelled");
                }
                return Ok(ExitCode::SUCCESS);
            }
            ExecEvent::Error(failure) => {
                tracing::error!("{failure}");
                return Ok(exit_code(failure.code));
            }
            _ => {}
        }
    }

    Ok(ExitCode::FAILURE)
}

pub async fn stream(client: &YtDlp, options: &ExecOptions, args: PassthroughArgs) -> Result<ExitCode> {
    let mut execution = client.exec_stream(args.args, options);

    let mut events = execution.events;
    let reporter = tokio::spawn(async move {
        let mut outcome = None;
        while let Some(event) = events.next().await {
            match event {
                ExecEvent::Progress(progress) => {
                    tracing::debug!(
                        fraction = progress.fraction(),
                        size = %progress.total_size,
                        "progress"
                    );
                }
                ExecEvent::Close(_) => outcome = Some(ExitCode::SUCCESS),
                ExecEvent::Error(failure) => {
                    tracing::error!("{failure}");
                    outcome = Some(exit_code(failure.code));
                }
                ExecEvent::YtDlp(_) => {}
            }
        }
        outcome.unwrap_or(ExitCode::FAILURE)
    });

    let mut stdout = tokio::io::stdout();
    let copied = tokio::io::copy(&mut execution.stdout, &mut stdout)
        .await
        .context("failed to write media to stdout")?;
    stdout.flush().await?;
    tracing::debug!(bytes = copied, "stream finished");

    Ok(reporter.await?)
}

pub async fn info(client: &YtDlp, args: PassthroughArgs) -> Result<ExitCode> {
    let metadata = client.get_video_info(args.args).await?;
    for item in metadata.into_vec() {
        println!("{}", serde_json::to_string_pretty(&item)?);
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn version(client: &YtDlp) -> Result<ExitCode> {
    println!("{}", client.get_version().await?);
    Ok(ExitCode::SUCCESS)
}

pub async fn extractors(client: &YtDlp, descriptions: bool) -> Result<ExitCode> {
    let lines = if descriptions {
        client.get_extractor_descriptions().await?
    } else {
        client.get_extractors().await?
    };
    for line in lines {
        println!("{line}");
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn user_agent(client: &YtDlp) -> Result<ExitCode> {
    println!("{}", client.get_user_agent().await?);
    Ok(ExitCode::SUCCESS)
}

pub async fn help_text(client: &YtDlp) -> Result<ExitCode> {
    print!("{}", client.get_help().await?);
    Ok(ExitCode::SUCCESS)
}

/// Cancels `token` on Ctrl+C so the running child is killed cleanly.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping yt-dlp");
            token.cancel();
        }
    });
}

fn print_json_event(event: &ExecEvent) -> Result<()> {
    let value = match event {
        ExecEvent::Progress(progress) => serde_json::json!({ "event": "progress", "data": progress }),
        ExecEvent::YtDlp(event) => serde_json::json!({ "event": "ytDlpEvent", "data": event }),
        ExecEvent::Close(info) => serde_json::json!({ "event": "close", "data": info }),
        ExecEvent::Error(failure) => serde_json::json!({ "event": "error", "data": failure })
    };
    println!("{}", serde_json::to_string(&value)?);
    Ok(())
}

fn exit_code(code: Option<i32>) -> ExitCode {
    code.and_then(|c| u8::try_from(c).ok())
        .filter(|c| *c != 0)
        .map_or(ExitCode::FAILURE, ExitCode::from)
}
