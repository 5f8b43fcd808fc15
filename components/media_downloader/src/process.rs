// components/media_downloader/src/process.rs
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Outcome of a tool that ran to completion
pub(crate) struct ToolRun {
    pub status: ExitStatus,
    pub stderr: String,
}

impl ToolRun {
    /// Last non-empty stderr line, which is where yt-dlp and ffmpeg put the reason
    pub fn failure_reason(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("exited with {}", self.status))
    }
}

/// Spawn `command`, handing every stdout line to `on_line` while it runs.
///
/// The child is killed if the returned future is dropped, so a caller that
/// times out or is cancelled never leaves the tool running.
pub(crate) async fn run_streaming(
    mut command: Command,
    mut on_line: impl FnMut(&str) + Send,
) -> std::io::Result<ToolRun> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("child stderr was not captured"))?;

    let stderr_reader = tokio::spawn(async move {
        let mut buf = String::new();
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            buf.push_str(&line);
            buf.push('\n');
        }
        buf
    });

    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await? {
        on_line(&line);
    }

    let status = child.wait().await?;
    let stderr = stderr_reader.await.unwrap_or_default();

    Ok(ToolRun { status, stderr })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_streaming_collects_lines_and_stderr() {
        let mut command = Command::new("sh");
        command.arg("-c").arg("echo one; echo two; echo oops >&2; exit 3");

        let mut seen = Vec::new();
        let run = run_streaming(command, |line| seen.push(line.to_string()))
            .await
            .unwrap();

        assert_eq!(seen, vec!["one", "two"]);
        assert!(!run.status.success());
        assert_eq!(run.failure_reason(), "oops");
    }
}
