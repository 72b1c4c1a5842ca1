//! Invocation modes, driven with `sh -c` standing in for yt-dlp.
#![cfg(unix)]

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use ytdlp_exec::{
    Error, EventStream, ExecEvent, ExecOptions, ExitInfo, Progress, VideoMetadata, YtDlp
};

const TIMEOUT: Duration = Duration::from_secs(10);

fn sh() -> YtDlp {
    YtDlp::with_binary("sh")
}

async fn collect(mut events: EventStream) -> Vec<ExecEvent> {
    let mut out = Vec::new();
    while let Some(event) = events.next().await {
        out.push(event);
    }
    out
}

fn tags(events: &[ExecEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ExecEvent::YtDlp(ev) => Some(ev.tag.clone()),
            _ => None
        })
        .collect()
}

fn assert_single_terminal_last(events: &[ExecEvent]) {
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "events: {events:?}");
    assert!(events.last().is_some_and(ExecEvent::is_terminal));
}

#[tokio::test]
async fn test_exec_emits_progress_then_close() {
    let script = "echo '[youtube] abc: Downloading webpage'; \
                  echo 'not a status line'; \
                  echo '[download] 45.2% of ~10MiB at 1.2MiB/s ETA 00:10'; \
                  echo '[download] 100% of 10.00MiB in 00:00:02'";
    let run = sh().exec(["-c", script], &ExecOptions::new());
    let events = tokio::time::timeout(TIMEOUT, collect(run.events)).await.unwrap();

    let progress: Vec<&Progress> = events
        .iter()
        .filter_map(|e| match e {
            ExecEvent::Progress(p) => Some(p),
            _ => None
        })
        .collect();
    assert_eq!(progress.len(), 2);
    assert_eq!(progress[0], &Progress {
        percent: 45.2,
        total_size: "10MiB".to_string(),
        current_speed: Some("1.2MiB/s".to_string()),
        eta: Some("00:10".to_string())
    });
    assert_eq!(progress[1].percent, 100.0);

    assert_eq!(tags(&events), vec!["youtube", "download", "download"]);
    assert_single_terminal_last(&events);
    assert_eq!(
        events.last(),
        Some(&ExecEvent::Close(ExitInfo { code: Some(0), killed: false }))
    );
}

#[tokio::test]
async fn test_exec_nonzero_exit_is_error_with_stderr() {
    let script = "echo '[info] starting'; echo 'ERROR: Unsupported URL' >&2; exit 3";
    let run = sh().exec(["-c", script], &ExecOptions::new());
    let events = tokio::time::timeout(TIMEOUT, collect(run.events)).await.unwrap();

    assert_eq!(tags(&events), vec!["info"]);
    assert_single_terminal_last(&events);
    match events.last() {
        Some(ExecEvent::Error(failure)) => {
            assert_eq!(failure.code, Some(3));
            assert!(failure.process_error.is_none());
            assert_eq!(failure.stderr, "ERROR: Unsupported URL\n");
        }
        other => panic!("expected an error event, got {other:?}")
    }
}

#[tokio::test]
async fn test_exec_wait_returns_failure() {
    let err = sh()
        .exec(["-c", "exit 7"], &ExecOptions::new())
        .wait()
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), Some(7));
}

#[tokio::test]
async fn test_exec_killed_process_closes() {
    let script = "echo '[info] started'; exec sleep 30";
    let mut run = sh().exec(["-c", script], &ExecOptions::new());

    let first = tokio::time::timeout(TIMEOUT, run.events.next()).await.unwrap();
    assert!(matches!(first, Some(ExecEvent::YtDlp(_))));
    assert!(run.handle.pid().is_some());

    run.kill();
    let info = tokio::time::timeout(TIMEOUT, run.wait()).await.unwrap().unwrap();
    assert!(info.killed);
    assert_ne!(info.code, Some(0));
}

#[tokio::test]
async fn test_exec_cancel_token_from_options() {
    let token = CancellationToken::new();
    let options = ExecOptions::new().cancel_token(token.clone());
    let mut run = sh().exec(["-c", "echo '[info] started'; exec sleep 30"], &options);

    tokio::time::timeout(TIMEOUT, run.events.next()).await.unwrap();
    token.cancel();

    let events = tokio::time::timeout(TIMEOUT, collect(run.events)).await.unwrap();
    assert_single_terminal_last(&events);
    assert!(matches!(events.last(), Some(ExecEvent::Close(ExitInfo { killed: true, .. }))));
    assert!(run.handle.is_killed());
}

#[tokio::test]
async fn test_exec_launch_failure_is_single_error() {
    let client = YtDlp::with_binary("/nonexistent/bin/yt-dlp");
    let run = client.exec(["--version"], &ExecOptions::new());
    assert!(run.handle.pid().is_none());

    let events = tokio::time::timeout(TIMEOUT, collect(run.events)).await.unwrap();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ExecEvent::Error(failure) => {
            assert!(failure.code.is_none());
            assert!(failure.process_error.is_some());
        }
        other => panic!("expected an error event, got {other:?}")
    }
}

#[tokio::test]
async fn test_exec_applies_cwd_and_env() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = sh();
    client.set_env("YTDLP_TAG".to_string(), "from-defaults".to_string());

    let options = ExecOptions::new().cwd(dir.path());
    let stdout = client
        .exec_buffered(["-c", "echo \"$YTDLP_TAG\"; pwd"], &options)
        .await
        .unwrap();

    let mut lines = stdout.lines();
    assert_eq!(lines.next(), Some("from-defaults"));
    let cwd = std::path::PathBuf::from(lines.next().unwrap());
    assert_eq!(cwd.canonicalize().unwrap(), dir.path().canonicalize().unwrap());
}

#[tokio::test]
async fn test_buffered_returns_stdout() {
    let stdout = sh()
        .exec_buffered(["-c", "echo hello; echo '[info] ignored' >&2"], &ExecOptions::new())
        .await
        .unwrap();
    assert_eq!(stdout, "hello\n");
}

#[tokio::test]
async fn test_buffered_nonzero_exit() {
    let err = sh()
        .exec_buffered(["-c", "echo partial; echo oops >&2; exit 4"], &ExecOptions::new())
        .await
        .unwrap_err();
    match err {
        Error::CommandFailed(failure) => {
            assert_eq!(failure.code, Some(4));
            assert_eq!(failure.stderr, "oops\n");
            assert!(failure.to_string().contains("exit code 4"));
        }
        other => panic!("unexpected error: {other}")
    }
}

#[tokio::test]
async fn test_buffered_launch_failure() {
    let err = YtDlp::with_binary("/nonexistent/bin/yt-dlp")
        .exec_buffered(["--version"], &ExecOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ExecutionFailed(_)));
}

#[tokio::test]
async fn test_buffered_kill_cancels() {
    let pending = sh().exec_buffered(["-c", "exec sleep 30"], &ExecOptions::new());
    let handle = pending.handle().clone();
    handle.kill();

    let err = tokio::time::timeout(TIMEOUT, pending).await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn test_stream_mode_pipes_stdout_and_parses_stderr() {
    // `-o -` lands in $0 and $1 of the script.
    let script = "printf '%s %s' \"$0\" \"$1\"; \
                  echo '[download] 50.0% of 2.00KiB at 1.00KiB/s ETA 00:01' >&2";
    let mut run = sh().exec_stream(["-c", script], &ExecOptions::new());

    let mut media = String::new();
    tokio::time::timeout(TIMEOUT, run.stdout.read_to_string(&mut media))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(media, "-o -");

    let events = tokio::time::timeout(TIMEOUT, collect(run.events)).await.unwrap();
    assert!(events.iter().any(|e| matches!(e, ExecEvent::Progress(p) if p.percent == 50.0)));
    assert_single_terminal_last(&events);
    assert!(matches!(events.last(), Some(ExecEvent::Close(ExitInfo { code: Some(0), .. }))));
}

/// Prints `count` carriage-return separated progress lines.
fn progress_loop(count: u32, redirect: &str) -> String {
    format!(
        "i=0; while [ $i -lt {count} ]; do \
         printf '[download] %s.0%% of ~10.00MiB at 1.00MiB/s ETA 00:01\\r' $i {redirect}; \
         i=$((i+1)); done"
    )
}

fn progress_count(events: &[ExecEvent]) -> usize {
    events.iter().filter(|e| matches!(e, ExecEvent::Progress(_))).count()
}

#[tokio::test]
async fn test_exec_high_volume_keeps_order() {
    let script = format!("{}; echo; echo '[info] finished'", progress_loop(3000, ""));
    let mut run = sh().exec(["-c", script.as_str()], &ExecOptions::new());

    let mut events = Vec::new();
    while let Some(event) = tokio::time::timeout(TIMEOUT, run.events.recv()).await.unwrap() {
        events.push(event);
    }

    assert_eq!(progress_count(&events), 3000);
    assert_single_terminal_last(&events);
    assert!(matches!(events.last(), Some(ExecEvent::Close(ExitInfo { code: Some(0), .. }))));

    let last_generic = events.iter().rev().find_map(|e| match e {
        ExecEvent::YtDlp(ev) => Some(ev.tag.as_str()),
        _ => None
    });
    assert_eq!(last_generic, Some("info"));
}

#[tokio::test]
async fn test_stream_mode_reading_media_first_does_not_stall() {
    let script = format!("{}; printf media", progress_loop(3000, ">&2"));
    let mut run = sh().exec_stream(["-c", script.as_str()], &ExecOptions::new());

    let mut media = String::new();
    tokio::time::timeout(TIMEOUT, run.stdout.read_to_string(&mut media))
        .await
        .expect("reading stdout must not wait for the events to be consumed")
        .unwrap();
    assert!(media.ends_with("media"));

    let events = tokio::time::timeout(TIMEOUT, collect(run.events)).await.unwrap();
    assert_eq!(progress_count(&events), 3000);
    assert_single_terminal_last(&events);
    assert!(matches!(events.last(), Some(ExecEvent::Close(ExitInfo { code: Some(0), .. }))));
    assert!(!run.handle.is_killed());
}

#[tokio::test]
async fn test_stream_mode_error_carries_stderr() {
    let script = "echo '[generic] Extracting URL' >&2; echo 'ERROR: Unable to download' >&2; exit 1";
    let mut run = sh().exec_stream(["-c", script], &ExecOptions::new());

    let mut media = Vec::new();
    run.stdout.read_to_end(&mut media).await.unwrap();
    assert!(media.is_empty());

    let events = tokio::time::timeout(TIMEOUT, collect(run.events)).await.unwrap();
    assert_eq!(tags(&events), vec!["generic"]);
    match events.last() {
        Some(ExecEvent::Error(failure)) => {
            assert_eq!(failure.code, Some(1));
            assert!(failure.stderr.contains("[generic] Extracting URL"));
            assert!(failure.stderr.contains("ERROR: Unable to download"));
        }
        other => panic!("expected an error event, got {other:?}")
    }
}

#[tokio::test]
async fn test_stream_mode_launch_failure() {
    let mut run = YtDlp::with_binary("/nonexistent/bin/yt-dlp")
        .exec_stream(["https://example.com"], &ExecOptions::new());

    let mut media = Vec::new();
    run.stdout.read_to_end(&mut media).await.unwrap();
    assert!(media.is_empty());

    let events = collect(run.events).await;
    assert!(matches!(events.as_slice(), [ExecEvent::Error(_)]));
}

#[tokio::test]
async fn test_video_info_appends_default_format_and_dump_json() {
    let script = "printf '[\"%s\",\"%s\",\"%s\"]\\n' \"$0\" \"$1\" \"$2\"";
    let meta = sh().get_video_info(["-c", script]).await.unwrap();
    assert_eq!(meta, VideoMetadata::Single(serde_json::json!(["-f", "best", "--dump-json"])));
}

#[tokio::test]
async fn test_video_info_keeps_caller_format() {
    let script = "printf '[\"%s\",\"%s\",\"%s\"]\\n' \"$0\" \"$1\" \"$2\"";
    let meta = sh().get_video_info(["-c", script, "--format", "worst"]).await.unwrap();
    assert_eq!(
        meta,
        VideoMetadata::Single(serde_json::json!(["--format", "worst", "--dump-json"]))
    );
}

#[tokio::test]
async fn test_video_info_repairs_multiple_documents() {
    let script = "echo '{\"id\":\"a\",\"title\":\"First\"}'; echo '{\"id\":\"b\",\"title\":\"Second\"}'";
    let meta = sh().get_video_info(["-c", script]).await.unwrap();
    assert_eq!(meta.len(), 2);

    #[derive(serde::Deserialize)]
    struct Entry {
        id: String,
        title: String
    }

    let entries: Vec<Entry> = sh().get_video_info_as(["-c", script]).await.unwrap();
    assert_eq!(entries[0].id, "a");
    assert_eq!(entries[1].title, "Second");
}
