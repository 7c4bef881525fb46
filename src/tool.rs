use crate::AnalyzerError;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of one external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, or `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

// ── ExternalTool ──────────────────────────────────────────────────────────────

/// A program run as an isolated child process with an optional timeout.
///
/// ```no_run
/// use pdfprobe::ExternalTool;
/// use std::time::Duration;
///
/// let qpdf = ExternalTool::new("qpdf", Some(Duration::from_secs(30)));
/// let out = qpdf.run(["--check", "invoice.pdf"]).unwrap();
/// println!("exit code {:?}", out.exit_code);
/// ```
#[derive(Debug, Clone)]
pub struct ExternalTool {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl ExternalTool {
    pub fn new<P: Into<PathBuf>>(program: P, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Display name used in error messages, e.g. `"qpdf"`.
    pub fn name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Run the tool with `args`, wait for it, and capture its output.
    ///
    /// A program that cannot be found yields [`AnalyzerError::ToolUnavailable`];
    /// one that outlives the timeout is killed and yields
    /// [`AnalyzerError::ToolTimeout`].
    pub fn run<I, S>(&self, args: I) -> Result<ToolOutput, AnalyzerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        debug!(program = %self.program.display(), "spawning external tool");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // Drain both pipes on their own threads so a tool that writes more
        // than the pipe buffer cannot block our wait.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match self.timeout {
            None => child.wait().map_err(|e| self.execution_error(e))?,
            Some(limit) => self.wait_with_timeout(&mut child, limit)?,
        };

        Ok(ToolOutput {
            exit_code: status.code(),
            stdout: join(stdout),
            stderr: join(stderr),
        })
    }

    fn wait_with_timeout(
        &self,
        child: &mut Child,
        limit: Duration,
    ) -> Result<std::process::ExitStatus, AnalyzerError> {
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(|e| self.execution_error(e))? {
                return Ok(status);
            }
            if started.elapsed() >= limit {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AnalyzerError::ToolTimeout {
                    tool: self.name(),
                    timeout_secs: whole_seconds(limit),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn spawn_error(&self, e: std::io::Error) -> AnalyzerError {
        if e.kind() == std::io::ErrorKind::NotFound {
            AnalyzerError::ToolUnavailable { tool: self.name() }
        } else {
            self.execution_error(e)
        }
    }

    fn execution_error(&self, e: std::io::Error) -> AnalyzerError {
        AnalyzerError::ToolExecution {
            tool: self.name(),
            reason: e.to_string(),
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Round up so a sub-second limit is never reported as zero.
fn whole_seconds(limit: Duration) -> u64 {
    limit.as_secs() + u64::from(limit.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_unavailable() {
        let tool = ExternalTool::new("pdfprobe-no-such-tool-4711", None);
        let err = tool.run(["--check", "x.pdf"]).unwrap_err();
        assert_eq!(
            err,
            AnalyzerError::ToolUnavailable {
                tool: "pdfprobe-no-such-tool-4711".into()
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_and_streams_are_captured() {
        let tool = ExternalTool::new("sh", Some(Duration::from_secs(10)));
        let out = tool
            .run(["-c", "echo out; echo err >&2; exit 3"])
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn slow_program_is_killed_at_timeout() {
        let tool = ExternalTool::new("sleep", Some(Duration::from_millis(100)));
        let err = tool.run(["5"]).unwrap_err();
        assert!(matches!(
            err,
            AnalyzerError::ToolTimeout { ref tool, timeout_secs: 1 } if tool == "sleep"
        ));
    }

    #[test]
    fn timeout_is_reported_in_whole_seconds_rounded_up() {
        assert_eq!(whole_seconds(Duration::from_millis(100)), 1);
        assert_eq!(whole_seconds(Duration::from_secs(60)), 60);
        assert_eq!(whole_seconds(Duration::from_millis(60_001)), 61);
        assert_eq!(whole_seconds(Duration::ZERO), 0);
    }
}
