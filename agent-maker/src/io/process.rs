//! Helpers for running child processes with timeouts and bounded output.

use std::env;
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Bytes of stdout/stderr kept in memory per stream.
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Exit code, `None` when killed by a signal (including our own timeout kill).
    pub fn code(&self) -> Option<i32> {
        if self.timed_out {
            return None;
        }
        self.status.code()
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// The program could not be started at all (missing binary, permissions, ...).
///
/// Returned inside `anyhow::Error` so callers can tell "did not run" apart
/// from "ran and failed" with `downcast_ref`.
#[derive(Debug)]
pub struct SpawnFailed {
    pub program: String,
    pub source: std::io::Error,
}

impl fmt::Display for SpawnFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to start '{}': {}", self.program, self.source)
    }
}

impl std::error::Error for SpawnFailed {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Extra time output readers get once the child is gone.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Output collected so far from one stream.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: usize,
}

type SharedCapture = Arc<Mutex<Captured>>;

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// The child runs in its own process group. Stdin is written and output is read on helper
/// threads, so neither can stall the deadline. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the
/// pipe). A timeout kills the whole group and is reported through `CommandOutput::timed_out`,
/// not as an error. Descendants that keep the output pipes open past the deadline are killed
/// and whatever they wrote so far is returned.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    own_process_group(&mut cmd);

    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!(program = %program, "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(source) => {
            warn!(program = %program, err = %source, "failed to spawn command");
            return Err(anyhow::Error::new(SpawnFailed { program, source }));
        }
    };
    let started = Instant::now();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (done_tx, done_rx) = mpsc::channel();
    let stdout_capture = spawn_reader("stdout", stdout, output_limit_bytes, done_tx.clone());
    let stderr_capture = spawn_reader("stderr", stderr, output_limit_bytes, done_tx);

    if let Some(input) = stdin {
        let child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        spawn_stdin_writer(child_stdin, input.to_vec());
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_group(child.id());
            if let Err(err) = child.kill() {
                debug!(err = %err, "kill child");
            }
            child.wait().context("wait command after kill")?
        }
    };

    let deadline = (started + timeout).max(Instant::now() + READER_GRACE);
    let mut open_streams = 2;
    while open_streams > 0 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match done_rx.recv_timeout(remaining) {
            Ok(stream) => {
                debug!(stream, "output stream closed");
                open_streams -= 1;
            }
            Err(_) => {
                warn!(open_streams, "output pipes still held open, killing leftover processes");
                kill_process_group(child.id());
                break;
            }
        }
    }

    let (stdout, stdout_truncated) = take_capture(&stdout_capture).context("collect stdout")?;
    let (stderr, stderr_truncated) = take_capture(&stderr_capture).context("collect stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let group = format!("-{pid}");
    let status = Command::new("kill")
        .args(["-KILL", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) if status.success() => debug!(pid, "process group killed"),
        Ok(status) => debug!(pid, ?status, "process group already gone"),
        Err(err) => warn!(pid, err = %err, "could not signal process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn spawn_stdin_writer(mut pipe: ChildStdin, input: Vec<u8>) {
    thread::spawn(move || match pipe.write_all(&input) {
        Ok(()) => {}
        // The child may exit without reading its input.
        Err(e) if e.kind() == ErrorKind::BrokenPipe => debug!("child closed stdin early"),
        Err(e) => warn!(err = %e, "write stdin failed"),
    });
}

fn spawn_reader<R: Read + Send + 'static>(
    stream: &'static str,
    mut reader: R,
    limit: usize,
    done: mpsc::Sender<&'static str>,
) -> SharedCapture {
    let capture = SharedCapture::default();
    let sink = Arc::clone(&capture);
    thread::spawn(move || {
        if let Err(err) = drain_limited(&mut reader, limit, &sink) {
            warn!(stream, err = %format!("{err:#}"), "reading child output failed");
        }
        let _ = done.send(stream);
    });
    capture
}

fn drain_limited<R: Read>(reader: &mut R, limit: usize, sink: &Mutex<Captured>) -> Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("read output"),
        };
        let mut captured = sink
            .lock()
            .map_err(|_| anyhow!("output buffer lock poisoned"))?;
        let keep = n.min(limit.saturating_sub(captured.bytes.len()));
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.truncated += n - keep;
    }
}

fn take_capture(capture: &Mutex<Captured>) -> Result<(Vec<u8>, usize)> {
    let mut captured = capture
        .lock()
        .map_err(|_| anyhow!("output buffer lock poisoned"))?;
    Ok((std::mem::take(&mut captured.bytes), captured.truncated))
}

/// Locate `program` on `PATH`. Paths containing a separator are checked as-is.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|full| full.is_file())
}

/// Split a command line into argv, honouring single quotes, double quotes and
/// backslash escapes. No variable expansion, globbing or operators.
pub fn split_command(line: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut has_token = false;
    let mut chars = line.chars();
    let mut quote: Option<char> = None;

    while let Some(ch) = chars.next() {
        match quote {
            Some('\'') => {
                if ch == '\'' {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            Some(_) => match ch {
                '"' => quote = None,
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\' | '$' | '`')) => current.push(next),
                    Some(next) => {
                        current.push('\\');
                        current.push(next);
                    }
                    None => bail!("unterminated escape in command"),
                },
                _ => current.push(ch),
            },
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    has_token = true;
                }
                '\\' => {
                    let next = chars
                        .next()
                        .ok_or_else(|| anyhow!("unterminated escape in command"))?;
                    current.push(next);
                    has_token = true;
                }
                c if c.is_whitespace() => {
                    if has_token {
                        args.push(std::mem::take(&mut current));
                        has_token = false;
                    }
                }
                c => {
                    current.push(c);
                    has_token = true;
                }
            },
        }
    }
    if quote.is_some() {
        bail!("unterminated quote in command");
    }
    if has_token {
        args.push(current);
    }
    Ok(args)
}

/// Keep the last `max_chars` characters of `s`.
pub fn tail_chars(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    s.chars().skip(count - max_chars).collect()
}
