//! Bounded subprocess execution.
//!
//! Runs a program with a wall-clock timeout and a cap on combined
//! stdout+stderr size. stdout/stderr are drained on background threads while
//! the process runs; without this, a child writing more than the pipe buffer
//! (~64KB) would block on write and we'd deadlock waiting for it to exit.
//!
//! A clean non-zero exit is not an error at this layer — the caller decides
//! what an exit code means. Timeout and overflow kills are typed errors that
//! still carry whatever partial output had been captured. One attempt per
//! call, no retries.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use stepexec_core::config::ResourceLimits;
use thiserror::Error;

/// Poll interval for the wait loop, in milliseconds.
const WAIT_POLL_INTERVAL_MS: u64 = 100;

/// Options for one subprocess run.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Working directory for the child.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables, passed through verbatim.
    pub env: Vec<(String, String)>,
    /// Wall-clock timeout.
    pub timeout: Duration,
    /// Cap on combined stdout+stderr bytes.
    pub max_output_bytes: u64,
}

impl ExecOptions {
    pub fn from_limits(limits: &ResourceLimits) -> Self {
        Self {
            cwd: None,
            env: Vec::new(),
            timeout: Duration::from_secs(limits.timeout_secs),
            max_output_bytes: limits.max_output_bytes(),
        }
    }
}

/// Captured output of a process that ran to completion (any exit code).
#[derive(Debug)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Transport-level execution failures. Timeout and overflow carry the
/// partial output captured before the kill.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to start process '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process killed: exceeded timeout of {timeout_secs} seconds")]
    Timeout {
        timeout_secs: u64,
        stdout: String,
        stderr: String,
    },

    #[error("Process killed: combined output exceeded {limit_bytes} bytes")]
    OutputOverflow {
        limit_bytes: u64,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to wait for process: {0}")]
    Wait(#[from] std::io::Error),
}

impl ExecError {
    /// Partial output captured before the failure, if any.
    pub fn partial_output(&self) -> (&str, &str) {
        match self {
            Self::Timeout { stdout, stderr, .. } | Self::OutputOverflow { stdout, stderr, .. } => {
                (stdout, stderr)
            }
            _ => ("", ""),
        }
    }
}

/// Run `program` with `args` under the given options.
pub fn run(program: &Path, args: &[String], opts: &ExecOptions) -> Result<ProcessOutput, ExecError> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(ref cwd) = opts.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &opts.env {
        cmd.env(key, value);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    tracing::debug!(program = %program.display(), ?args, "Spawning process");

    let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
        program: program.display().to_string(),
        source,
    })?;

    wait_bounded(&mut child, opts)
}

/// Drain one pipe on a background thread, counting bytes into `total`.
/// Accumulation stops at the cap (plus the chunk that crossed it) but the
/// pipe keeps being drained so the child never blocks on write.
fn spawn_reader<R: std::io::Read + Send + 'static>(
    mut pipe: R,
    total: Arc<AtomicU64>,
    cap: u64,
) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut captured = String::new();
        let mut buf = [0u8; 4096];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let seen = total.fetch_add(n as u64, Ordering::Relaxed);
                    if seen <= cap {
                        captured.push_str(&String::from_utf8_lossy(&buf[..n]));
                    }
                }
                Err(_) => break,
            }
        }
        captured
    })
}

fn wait_bounded(child: &mut Child, opts: &ExecOptions) -> Result<ProcessOutput, ExecError> {
    let start = Instant::now();
    let poll = Duration::from_millis(WAIT_POLL_INTERVAL_MS);
    let total_bytes = Arc::new(AtomicU64::new(0));

    let stdout_handle = child
        .stdout
        .take()
        .map(|out| spawn_reader(out, Arc::clone(&total_bytes), opts.max_output_bytes));
    let stderr_handle = child
        .stderr
        .take()
        .map(|err| spawn_reader(err, Arc::clone(&total_bytes), opts.max_output_bytes));

    let join = |h: Option<thread::JoinHandle<String>>| {
        h.map(|h| h.join().unwrap_or_default()).unwrap_or_default()
    };

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stdout = join(stdout_handle);
                let stderr = join(stderr_handle);

                // A fast process can exceed the cap and still exit before
                // the poll loop kills it; reject the result retroactively.
                if total_bytes.load(Ordering::Relaxed) > opts.max_output_bytes {
                    return Err(ExecError::OutputOverflow {
                        limit_bytes: opts.max_output_bytes,
                        stdout,
                        stderr,
                    });
                }

                return Ok(ProcessOutput {
                    stdout,
                    stderr,
                    exit_code: status.code().unwrap_or(-1),
                });
            }
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = join(stdout_handle);
                let _ = join(stderr_handle);
                return Err(ExecError::Wait(e));
            }
        }

        if start.elapsed() > opts.timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExecError::Timeout {
                timeout_secs: opts.timeout.as_secs(),
                stdout: join(stdout_handle),
                stderr: join(stderr_handle),
            });
        }

        if total_bytes.load(Ordering::Relaxed) > opts.max_output_bytes {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExecError::OutputOverflow {
                limit_bytes: opts.max_output_bytes,
                stdout: join(stdout_handle),
                stderr: join(stderr_handle),
            });
        }

        thread::sleep(poll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn sh_opts(timeout_secs: u64, max_output_bytes: u64) -> ExecOptions {
        ExecOptions {
            cwd: None,
            env: Vec::new(),
            timeout: Duration::from_secs(timeout_secs),
            max_output_bytes,
        }
    }

    #[cfg(unix)]
    fn run_sh(script: &str, opts: &ExecOptions) -> Result<ProcessOutput, ExecError> {
        run(
            Path::new("sh"),
            &["-c".to_string(), script.to_string()],
            opts,
        )
    }

    #[test]
    fn test_spawn_failure_for_missing_program() {
        let opts = ExecOptions {
            cwd: None,
            env: Vec::new(),
            timeout: Duration::from_secs(5),
            max_output_bytes: 1024,
        };
        let err = run(Path::new("/nonexistent/interpreter-xyz"), &[], &opts).unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_stdout_stderr_and_exit_code() {
        let out = run_sh("echo hello; echo oops >&2; exit 3", &sh_opts(10, 1 << 20)).unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.exit_code, 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_and_keeps_partial_output() {
        let err = run_sh("echo before; sleep 30", &sh_opts(1, 1 << 20)).unwrap_err();
        match err {
            ExecError::Timeout {
                timeout_secs,
                stdout,
                ..
            } => {
                assert_eq!(timeout_secs, 1);
                assert_eq!(stdout.trim(), "before");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_output_overflow_is_distinguishable() {
        let err = run_sh("yes x | head -c 300000", &sh_opts(30, 64 * 1024)).unwrap_err();
        assert!(matches!(err, ExecError::OutputOverflow { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_working_directory_applies() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut opts = sh_opts(10, 1 << 20);
        opts.cwd = Some(dir.path().to_path_buf());
        let out = run_sh("pwd", &opts).unwrap();
        let reported = std::fs::canonicalize(out.stdout.trim()).unwrap();
        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(reported, expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_env_passthrough() {
        let mut opts = sh_opts(10, 1 << 20);
        opts.env.push(("STEPEXEC_TEST_VAR".into(), "42".into()));
        let out = run_sh("echo $STEPEXEC_TEST_VAR", &opts).unwrap();
        assert_eq!(out.stdout.trim(), "42");
    }
}
