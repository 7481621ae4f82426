//! Blocking invocation of external programs.
//!
//! The [`Invoker`] trait is the seam between sessions and the processes they
//! start. [`CommandInvoker`] is the real implementation; tests substitute a
//! scripted one.

use crate::{Error, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often a child with a deadline is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Output captured from a program run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the program exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Standard output followed by standard error.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, _) => self.stderr.clone(),
            (false, true) => self.stdout.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }

    /// Human-readable exit status.
    pub fn status_label(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {}", code),
            None => "termination by signal".to_string(),
        }
    }
}

/// Runs an external program to completion.
///
/// Implementations block the calling thread and must not classify the exit
/// status; [`crate::Engine`] does that uniformly.
pub trait Invoker: Send + Sync {
    /// Run `program` with `args` and capture its output.
    fn invoke(&self, program: &Path, args: &[String]) -> Result<ToolOutput>;
}

/// [`Invoker`] backed by [`std::process::Command`].
#[derive(Debug, Clone, Default)]
pub struct CommandInvoker {
    timeout: Option<Duration>,
}

impl CommandInvoker {
    /// Create an invoker without a deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the program if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Invoker for CommandInvoker {
    fn invoke(&self, program: &Path, args: &[String]) -> Result<ToolOutput> {
        let tool = tool_name(program);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found(&tool)
                } else {
                    Error::Io(e)
                }
            })?;

        // Drain both pipes concurrently so a chatty child never blocks on a
        // full pipe while we wait for it.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match self.timeout {
            Some(limit) => wait_with_deadline(&mut child, limit).map_err(|e| match e {
                WaitError::Io(e) => Error::Io(e),
                WaitError::Expired => Error::Timeout {
                    tool: tool.clone(),
                    after: limit,
                },
            })?,
            None => child.wait()?,
        };

        Ok(ToolOutput {
            code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}

enum WaitError {
    Io(std::io::Error),
    Expired,
}

fn wait_with_deadline(
    child: &mut Child,
    limit: Duration,
) -> std::result::Result<ExitStatus, WaitError> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(WaitError::Io)? {
            return Ok(status);
        }
        if started.elapsed() >= limit {
            let _ = child.kill();
            let _ = child.wait();
            return Err(WaitError::Expired);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Short program name used in errors and logs.
pub(crate) fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string_lossy().into_owned())
}

/// Parse a single floating-point token from probe output.
pub fn parse_scalar(tool: &str, stdout: &str) -> Result<f64> {
    let token = stdout
        .split_whitespace()
        .next()
        .ok_or_else(|| Error::parse_error(tool, "empty output"))?;

    let value: f64 = token
        .parse()
        .map_err(|_| Error::parse_error(tool, format!("expected a number, got {:?}", token)))?;

    if !value.is_finite() {
        return Err(Error::parse_error(
            tool,
            format!("expected a finite number, got {:?}", token),
        ));
    }

    Ok(value)
}

/// Parse a single `WIDTHxHEIGHT` token from probe output.
pub fn parse_dimensions(tool: &str, stdout: &str) -> Result<(u32, u32)> {
    let token = stdout
        .split_whitespace()
        .next()
        .ok_or_else(|| Error::parse_error(tool, "empty output"))?;

    // Some ffprobe builds leave a trailing separator after the last entry.
    let trimmed = token.trim_end_matches('x');

    let (w, h) = trimmed
        .split_once('x')
        .ok_or_else(|| Error::parse_error(tool, format!("expected WxH, got {:?}", token)))?;

    match (w.parse::<u32>(), h.parse::<u32>()) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(Error::parse_error(
            tool,
            format!("expected WxH, got {:?}", token),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parse_scalar_reads_first_token() {
        assert_eq!(parse_scalar("ffprobe", "10.000000\n").unwrap(), 10.0);
        assert_eq!(parse_scalar("ffprobe", "  3.5 extra").unwrap(), 3.5);
    }

    #[test]
    fn parse_scalar_rejects_garbage() {
        assert!(matches!(
            parse_scalar("ffprobe", "N/A\n"),
            Err(Error::Parse { .. })
        ));
        assert!(matches!(parse_scalar("ffprobe", ""), Err(Error::Parse { .. })));
        assert!(matches!(parse_scalar("ffprobe", "inf"), Err(Error::Parse { .. })));
    }

    #[test]
    fn parse_dimensions_variants() {
        assert_eq!(parse_dimensions("ffprobe", "1920x1080\n").unwrap(), (1920, 1080));
        assert_eq!(parse_dimensions("ffprobe", "640x360x\n").unwrap(), (640, 360));
        assert!(parse_dimensions("ffprobe", "1920,1080").is_err());
        assert!(parse_dimensions("ffprobe", "x1080").is_err());
        assert!(parse_dimensions("ffprobe", "").is_err());
    }

    #[test]
    fn combined_output_orders_stdout_first() {
        let out = ToolOutput {
            code: Some(1),
            stdout: "progress\n".to_string(),
            stderr: "boom\n".to_string(),
        };
        assert_eq!(out.combined(), "progress\nboom\n");
        assert!(!out.success());
        assert_eq!(out.status_label(), "exit code 1");
    }

    #[test]
    fn invoke_nonexistent_tool() {
        let result =
            CommandInvoker::new().invoke(&PathBuf::from("nonexistent_tool_xyz_12345"), &[]);
        assert!(matches!(result, Err(Error::ToolNotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn invoke_captures_stdout_and_exit_code() {
        let out = CommandInvoker::new()
            .invoke(
                &PathBuf::from("sh"),
                &["-c".to_string(), "echo hello; echo oops >&2; exit 3".to_string()],
            )
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[test]
    fn timeout_fires() {
        let result = CommandInvoker::new()
            .with_timeout(Some(Duration::from_millis(100)))
            .invoke(&PathBuf::from("sleep"), &["10".to_string()]);
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }), "unexpected error: {err}");
    }
}
