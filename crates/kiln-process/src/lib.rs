//! Spawning the external build tool.
//!
//! `bazel build` can run for a long time and print a lot. This crate runs a child process with
//! bounded stdout/stderr capture, an optional wall-clock timeout and cooperative cancellation.
//! On Unix the child gets its own process group so that termination reaches the Bazel client
//! and anything it spawned.

use std::{
    fmt,
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

pub use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured stdout/stderr, each truncated to [`RunOptions::max_bytes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Set when either stream produced more bytes than were kept.
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Terminate the child if it is still running after this long.
    pub timeout: Option<Duration>,
    /// Maximum bytes kept per stream.
    pub max_bytes: usize,
    /// Terminates the child when cancelled.
    pub cancellation: Option<CancellationToken>,
    /// Delay between SIGTERM and SIGKILL when terminating.
    pub kill_grace: Duration,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_bytes: 8 * 1024 * 1024,
            cancellation: None,
            kill_grace: Duration::from_millis(250),
            env: Vec::new(),
        }
    }
}

/// cwd + program + args of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub cwd: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(cwd: &Path, program: &Path, args: &[String]) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            program: program.to_path_buf(),
            args: args.to_vec(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Human-readable only; not meant to be pasted into a shell.
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub output: CapturedOutput,
    pub timed_out: bool,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl CommandResult {
    /// Exit code, or `None` when the process was killed by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn success(&self) -> bool {
        self.status.success() && !self.timed_out && !self.cancelled
    }
}

/// Run a command to completion (or timeout/cancellation) and return its status and output.
pub fn run_command(
    cwd: &Path,
    program: &Path,
    args: &[String],
    opts: RunOptions,
) -> io::Result<CommandResult> {
    run_command_spec(&CommandSpec::new(cwd, program, args), opts)
}

/// Runs `command`. A non-zero exit is reported in the result, not as an error.
pub fn run_command_spec(command: &CommandSpec, opts: RunOptions) -> io::Result<CommandResult> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(&command.cwd)
        .envs(opts.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    unsafe {
        use std::os::unix::process::CommandExt;

        cmd.pre_exec(|| {
            // SAFETY: runs in the forked child before exec; `setpgid` is async-signal-safe.
            if libc::setpgid(0, 0) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    tracing::debug!(target = "kiln.process", command = %command, "spawning command");
    let start = Instant::now();
    let mut child = cmd.spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr was not captured"))?;

    let max_bytes = opts.max_bytes;
    let stdout_reader = thread::spawn(move || read_bounded(stdout, max_bytes));
    let stderr_reader = thread::spawn(move || read_bounded(stderr, max_bytes));

    let mut timed_out = false;
    let mut cancelled = false;

    let status = if opts.timeout.is_none() && opts.cancellation.is_none() {
        child.wait()?
    } else {
        loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }

            if opts
                .cancellation
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
            {
                cancelled = true;
                tracing::debug!(target = "kiln.process", command = %command, "cancelling command");
                break terminate_process_tree(&mut child, opts.kill_grace)?;
            }

            let mut sleep = POLL_INTERVAL;
            if let Some(timeout) = opts.timeout {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    timed_out = true;
                    tracing::debug!(
                        target = "kiln.process",
                        command = %command,
                        timeout_ms = timeout.as_millis() as u64,
                        "command timed out"
                    );
                    break terminate_process_tree(&mut child, opts.kill_grace)?;
                }
                sleep = sleep.min(timeout - elapsed);
            }
            thread::sleep(sleep);
        }
    };

    let (stdout_bytes, stdout_truncated) = join_reader(stdout_reader, "stdout")?;
    let (stderr_bytes, stderr_truncated) = join_reader(stderr_reader, "stderr")?;

    Ok(CommandResult {
        status,
        output: CapturedOutput {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            truncated: stdout_truncated || stderr_truncated,
        },
        timed_out,
        cancelled,
        elapsed: start.elapsed(),
    })
}

fn terminate_process_tree(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        // The child leads its own process group (see `pre_exec`); a negative pid signals the group.
        let pgid = -(child.id() as i32);
        unsafe {
            let _ = libc::kill(pgid, libc::SIGTERM);
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            thread::sleep(Duration::from_millis(25));
        }

        unsafe {
            let _ = libc::kill(pgid, libc::SIGKILL);
        }
        child.wait()
    }

    #[cfg(windows)]
    {
        let _ = grace;
        // `Child::kill` only reaches the immediate process; Bazel's client spawns a server.
        let pid = child.id().to_string();
        let _ = Command::new("taskkill")
            .args(["/PID", &pid, "/T", "/F"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        let _ = child.kill();
        child.wait()
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = grace;
        let _ = child.kill();
        child.wait()
    }
}

fn join_reader(
    handle: thread::JoinHandle<io::Result<(Vec<u8>, bool)>>,
    stream: &'static str,
) -> io::Result<(Vec<u8>, bool)> {
    handle
        .join()
        .map_err(|_| io::Error::other(format!("{stream} reader thread panicked")))?
}

fn read_bounded(mut reader: impl Read, max_bytes: usize) -> io::Result<(Vec<u8>, bool)> {
    let mut out = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }

        // Keep draining past the limit so the child never blocks on a full pipe.
        let keep = max_bytes.saturating_sub(out.len()).min(n);
        out.extend_from_slice(&buf[..keep]);
        if keep < n {
            truncated = true;
        }
    }

    Ok((out, truncated))
}
