//! Subprocess execution for engine commands.
//!
//! Streams stdout line-by-line (for progress decoding), keeps bounded
//! tails of both pipes for failure diagnostics, and enforces the
//! cancellation contract: SIGTERM, a 5 s grace window, then SIGKILL.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use scriberr_adapters::CommandSpec;
use scriberr_domain::{Error, Result};

/// Tail capture cap per pipe.
const TAIL_CAP: usize = 64 * 1024;

/// Grace window between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(5);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tail buffer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Keeps the last `cap` bytes of line-oriented output, trimming whole
/// lines from the front.
pub struct TailBuffer {
    lines: std::collections::VecDeque<String>,
    bytes: usize,
    cap: usize,
}

impl TailBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            lines: std::collections::VecDeque::new(),
            bytes: 0,
            cap,
        }
    }

    pub fn push(&mut self, line: &str) {
        self.bytes += line.len() + 1;
        self.lines.push_back(line.to_string());
        while self.bytes > self.cap {
            match self.lines.pop_front() {
                Some(dropped) => self.bytes -= dropped.len() + 1,
                None => break,
            }
        }
    }

    pub fn contents(&self) -> String {
        let mut out = String::with_capacity(self.bytes);
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Last `max` bytes, aligned down to a line boundary.
    pub fn tail(&self, max: usize) -> String {
        let full = self.contents();
        if full.len() <= max {
            return full;
        }
        let cut = full.len() - max;
        match full[cut..].find('\n') {
            Some(nl) => full[cut + nl + 1..].to_string(),
            None => full[cut..].to_string(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub cancelled: bool,
    pub timed_out: bool,
    pub stdout_tail: String,
    pub stderr_tail: String,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        !self.cancelled && !self.timed_out && self.exit_code == Some(0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run a prepared command to completion.
///
/// `on_stdout_line` sees every stdout line as it arrives (the processor
/// feeds these to the progress decoder). Cancellation and the watchdog
/// both terminate the child with SIGTERM-then-SIGKILL and are reported in
/// the outcome rather than as errors; `Err` means the process could not
/// be spawned or its pipes failed.
pub async fn run_command(
    spec: &CommandSpec,
    cancel: &CancellationToken,
    watchdog: Duration,
    mut on_stdout_line: impl FnMut(&str),
) -> Result<RunOutcome> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &spec.env {
        command.env(key, value);
    }
    if let Some(dir) = &spec.current_dir {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|e| {
        Error::EngineFailed(format!("failed to spawn {}: {e}", spec.program.display()))
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Internal("child stdout not captured".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Internal("child stderr not captured".into()))?;

    let stdout_tail = Arc::new(Mutex::new(TailBuffer::new(TAIL_CAP)));
    let stderr_tail = Arc::new(Mutex::new(TailBuffer::new(TAIL_CAP)));

    // Stderr drains in its own task; stdout is read inline so progress
    // callbacks stay on this task.
    let stderr_task = {
        let tail = stderr_tail.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tail.lock().push(&line);
            }
        })
    };

    let mut stdout_lines = BufReader::new(stdout).lines();
    let deadline = tokio::time::sleep(watchdog);
    tokio::pin!(deadline);

    let mut cancelled = false;
    let mut timed_out = false;

    // Phase 1: drain stdout until EOF, cancellation, or the watchdog.
    loop {
        tokio::select! {
            line = stdout_lines.next_line() => match line {
                Ok(Some(line)) => {
                    on_stdout_line(&line);
                    stdout_tail.lock().push(&line);
                }
                Ok(None) | Err(_) => break,
            },
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            _ = &mut deadline => {
                timed_out = true;
                break;
            }
        }
    }

    // Phase 2: reap the child, escalating if it was interrupted.
    let exit_code = if cancelled || timed_out {
        terminate(&mut child).await
    } else {
        tokio::select! {
            status = child.wait() => status.ok().and_then(|s| s.code()),
            _ = cancel.cancelled() => {
                cancelled = true;
                terminate(&mut child).await
            }
            _ = &mut deadline => {
                timed_out = true;
                terminate(&mut child).await
            }
        }
    };

    let _ = stderr_task.await;

    let stdout_tail_contents = stdout_tail.lock().contents();
    let stderr_tail_contents = stderr_tail.lock().contents();

    Ok(RunOutcome {
        exit_code,
        cancelled,
        timed_out,
        stdout_tail: stdout_tail_contents,
        stderr_tail: stderr_tail_contents,
    })
}

/// SIGTERM, wait up to the grace window, then SIGKILL.
async fn terminate(child: &mut Child) -> Option<i32> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if let Ok(Ok(status)) = tokio::time::timeout(TERM_GRACE, child.wait()).await {
            return status.code();
        }
    }

    let _ = child.start_kill();
    child.wait().await.ok().and_then(|s| s.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").args(["-c", script])
    }

    #[tokio::test]
    async fn captures_exit_code_and_output() {
        let cancel = CancellationToken::new();
        let outcome = run_command(
            &sh("echo out-line; echo err-line >&2; exit 3"),
            &cancel,
            Duration::from_secs(10),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.succeeded());
        assert!(outcome.stdout_tail.contains("out-line"));
        assert!(outcome.stderr_tail.contains("err-line"));
    }

    #[tokio::test]
    async fn stdout_lines_reach_the_callback() {
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let outcome = run_command(
            &sh("printf 'a\\nb\\n'"),
            &cancel,
            Duration::from_secs(10),
            |line| seen.push(line.to_string()),
        )
        .await
        .unwrap();

        assert!(outcome.succeeded());
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_sleeping_child() {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = run_command(&sh("sleep 30"), &cancel, Duration::from_secs(60), |_| {})
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert!(!outcome.succeeded());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn watchdog_kills_a_hung_child() {
        let cancel = CancellationToken::new();
        let outcome = run_command(
            &sh("sleep 30"),
            &cancel,
            Duration::from_millis(200),
            |_| {},
        )
        .await
        .unwrap();

        assert!(outcome.timed_out);
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn missing_binary_is_engine_failure() {
        let cancel = CancellationToken::new();
        let err = run_command(
            &CommandSpec::new("/nonexistent/engine-binary"),
            &cancel,
            Duration::from_secs(1),
            |_| {},
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "engine_failed");
    }

    #[test]
    fn tail_buffer_drops_oldest_lines() {
        let mut buf = TailBuffer::new(16);
        buf.push("first-line");
        buf.push("second");
        buf.push("third");
        let contents = buf.contents();
        assert!(!contents.contains("first-line"));
        assert!(contents.contains("third"));
    }

    #[test]
    fn tail_respects_byte_bound() {
        let mut buf = TailBuffer::new(1024);
        for i in 0..100 {
            buf.push(&format!("line number {i}"));
        }
        let tail = buf.tail(64);
        assert!(tail.len() <= 64);
        assert!(tail.contains("line number 99"));
        // Starts on a line boundary.
        assert!(tail.starts_with("line"));
    }
}
