//! Child process execution with line streaming, timeouts, and bounded output.
//!
//! Launching and driving are separate steps: [`ProcessRunner::spawn`] fails
//! fast when the executable cannot be started (before anything is streamed),
//! and [`RunningProcess::drive`] forwards output lines while the child runs.
//! A non-zero exit is an ordinary [`ProcessOutcome`], never an error.
//!
//! On unix every child leads its own process group. The group is killed on
//! timeout, on drop, and once the leader exits, so helpers an agent leaves
//! behind cannot hold its output pipes open.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::error::SpawnError;

/// A fully described command: what to run, where, and with which extra env.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    /// Added to the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Bounds applied while driving a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Wall-clock ceiling; the child is killed when it is reached.
    pub timeout: Duration,
    /// Bytes of each stream kept in memory (the rest is drained and counted).
    pub output_limit_bytes: usize,
}

/// Where output lines go while the child runs.
///
/// A `None` sink still drains and collects the stream. A sink whose receiver
/// is gone is dropped silently; the child keeps running.
#[derive(Debug, Default)]
pub struct OutputSinks {
    pub stdout: Option<mpsc::Sender<String>>,
    pub stderr: Option<mpsc::Sender<String>>,
}

/// Captured result of a finished child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code; `None` when killed by a signal or on timeout.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Number of stdout lines observed (forwarded or not).
    pub stdout_lines: usize,
    pub stderr: Vec<u8>,
    pub stderr_truncated: usize,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn stderr_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        text.push_str(&self.stderr_truncated_notice("agent"));
        text
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        if self.stderr_truncated > 0 {
            format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            )
        } else {
            String::new()
        }
    }
}

/// Launches commands. Implemented by [`TokioProcessRunner`] and by scripted
/// runners in tests.
pub trait ProcessRunner: Clone + Send + Sync + 'static {
    type Running: RunningProcess;

    fn spawn(&self, spec: &CommandSpec) -> Result<Self::Running, SpawnError>;
}

/// A launched child that can be driven to completion.
///
/// Dropping it before completion kills the child.
pub trait RunningProcess: Send + 'static {
    fn drive(
        self,
        limits: RunLimits,
        sinks: OutputSinks,
    ) -> impl Future<Output = io::Result<ProcessOutcome>> + Send;
}

/// Runs real child processes on the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    type Running = TokioProcess;

    #[instrument(skip_all, fields(program = %spec.program, workdir = %spec.workdir.display()))]
    fn spawn(&self, spec: &CommandSpec) -> Result<TokioProcess, SpawnError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.workdir)
            .envs(&spec.env)
            // Agents must never wait for interactive input.
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        debug!("spawning child process");
        let child = cmd.spawn().map_err(|source| {
            error!(err = %source, "failed to spawn command");
            SpawnError {
                program: spec.program.clone(),
                source,
            }
        })?;
        let group = ProcessGroup {
            leader: child.id(),
        };
        Ok(TokioProcess { child, group })
    }
}

/// Child spawned by [`TokioProcessRunner`].
#[derive(Debug)]
pub struct TokioProcess {
    child: Child,
    group: ProcessGroup,
}

/// Process group led by a spawned child. Killed at most once; dropping an
/// unkilled group kills it.
#[derive(Debug)]
struct ProcessGroup {
    leader: Option<u32>,
}

impl ProcessGroup {
    fn kill(&mut self) {
        if let Some(leader) = self.leader.take() {
            kill_group(leader);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_group(leader: u32) {
    let Ok(pgid) = libc::pid_t::try_from(leader) else {
        return;
    };
    if pgid <= 0 {
        return;
    }
    // SAFETY: killpg only delivers a signal to the group the child was
    // spawned into; it touches no memory owned by this process.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pgid, err = %err, "failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_leader: u32) {}

/// How long output readers may keep going once the group is gone. Only a
/// process that left the group can hold a pipe open that long.
const READER_GRACE: Duration = Duration::from_secs(1);

impl RunningProcess for TokioProcess {
    #[instrument(skip_all, fields(timeout_secs = limits.timeout.as_secs()))]
    async fn drive(mut self, limits: RunLimits, sinks: OutputSinks) -> io::Result<ProcessOutcome> {
        let stdout = self
            .child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout was not piped"))?;
        let stderr = self
            .child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr was not piped"))?;

        // Stdout is forwarded and counted, never kept.
        let stdout_reader = OutputReader::spawn(stdout, 0, sinks.stdout);
        let stderr_reader = OutputReader::spawn(stderr, limits.output_limit_bytes, sinks.stderr);

        let mut timed_out = false;
        let status = match tokio::time::timeout(limits.timeout, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    timeout_secs = limits.timeout.as_secs(),
                    "command timed out, killing"
                );
                timed_out = true;
                self.group.kill();
                self.child.start_kill()?;
                self.child.wait().await?
            }
        };
        self.group.kill();

        let deadline = Instant::now() + READER_GRACE;
        let stdout = stdout_reader.finish(deadline).await?;
        let stderr = stderr_reader.finish(deadline).await?;

        if stderr.truncated > 0 {
            warn!(stderr_truncated = stderr.truncated, "stderr truncated");
        }

        debug!(exit_code = ?status.code(), timed_out, "command finished");
        Ok(ProcessOutcome {
            exit_code: if timed_out { None } else { status.code() },
            timed_out,
            stdout_lines: stdout.lines,
            stderr: stderr.collected,
            stderr_truncated: stderr.truncated,
        })
    }
}

#[derive(Debug, Default)]
struct TeeOutput {
    collected: Vec<u8>,
    truncated: usize,
    lines: usize,
}

/// Background task teeing one output stream.
struct OutputReader {
    handle: JoinHandle<io::Result<TeeOutput>>,
    stop: oneshot::Sender<()>,
}

impl OutputReader {
    fn spawn<R>(reader: R, limit: usize, sink: Option<mpsc::Sender<String>>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(tee_lines(reader, limit, sink, stopped));
        Self { handle, stop }
    }

    /// Wait for EOF until `deadline`, then tell the reader to stop and keep
    /// what it has read so far.
    async fn finish(mut self, deadline: Instant) -> io::Result<TeeOutput> {
        let joined = match tokio::time::timeout_at(deadline, &mut self.handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("output still open after the process group exited");
                let _ = self.stop.send(());
                self.handle.await
            }
        };
        joined.map_err(|err| io::Error::other(format!("output reader task failed: {err}")))?
    }
}

/// Read a stream line by line, forwarding each line to `sink` and keeping at
/// most `limit` bytes.
///
/// Lines are forwarded without their terminator. A final line without a
/// newline is still forwarded at EOF. Reading ends early when `stop` fires
/// or its sender is dropped.
async fn tee_lines<R: AsyncRead + Unpin>(
    reader: R,
    limit: usize,
    mut sink: Option<mpsc::Sender<String>>,
    mut stop: oneshot::Receiver<()>,
) -> io::Result<TeeOutput> {
    let mut reader = BufReader::new(reader);
    let mut out = TeeOutput::default();
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = tokio::select! {
            read = reader.read_until(b'\n', &mut line) => read?,
            _ = &mut stop => {
                debug!("output reader stopped before EOF");
                break;
            }
        };
        if n == 0 {
            break;
        }
        out.lines += 1;

        if let Some(tx) = &sink {
            let text = String::from_utf8_lossy(trim_line_end(&line)).into_owned();
            if tx.send(text).await.is_err() {
                debug!("line receiver closed, draining without forwarding");
                sink = None;
            }
        }

        let remaining = limit.saturating_sub(out.collected.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            out.collected.extend_from_slice(&line[..keep]);
            out.truncated += n.saturating_sub(keep);
        } else {
            out.truncated += n;
        }
    }

    Ok(out)
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn limits() -> RunLimits {
        RunLimits {
            timeout: Duration::from_secs(10),
            output_limit_bytes: 1000,
        }
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", std::env::temp_dir()).args(["-c", script])
    }

    async fn collect(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        lines
    }

    #[tokio::test]
    async fn forwards_stdout_lines_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let process = TokioProcessRunner
            .spawn(&sh("printf 'one\\ntwo\\r\\nthree'; echo oops >&2"))
            .expect("spawn");
        let outcome = process
            .drive(
                limits(),
                OutputSinks {
                    stdout: Some(tx),
                    stderr: None,
                },
            )
            .await
            .expect("drive");

        assert_eq!(collect(&mut rx).await, vec!["one", "two", "three"]);
        assert!(outcome.success());
        assert_eq!(outcome.stdout_lines, 3);
        assert_eq!(outcome.stderr_text(), "oops\n");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_outcome() {
        let process = TokioProcessRunner.spawn(&sh("exit 3")).expect("spawn");
        let outcome = process
            .drive(limits(), OutputSinks::default())
            .await
            .expect("drive");
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let err = TokioProcessRunner
            .spawn(&CommandSpec::new(
                "agentbox-definitely-missing-binary",
                std::env::temp_dir(),
            ))
            .unwrap_err();
        assert_eq!(err.program, "agentbox-definitely-missing-binary");
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let process = TokioProcessRunner.spawn(&sh("exec sleep 30")).expect("spawn");
        let outcome = process
            .drive(
                RunLimits {
                    timeout: Duration::from_millis(200),
                    output_limit_bytes: 1000,
                },
                OutputSinks::default(),
            )
            .await
            .expect("drive");
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
    }

    #[tokio::test]
    async fn timeout_kills_grandchildren_holding_the_pipes() {
        let started = std::time::Instant::now();
        let process = TokioProcessRunner
            .spawn(&sh("sleep 30; echo late"))
            .expect("spawn");
        let outcome = process
            .drive(
                RunLimits {
                    timeout: Duration::from_millis(200),
                    output_limit_bytes: 1000,
                },
                OutputSinks::default(),
            )
            .await
            .expect("drive");
        assert!(outcome.timed_out);
        assert_eq!(outcome.stdout_lines, 0);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn background_leftovers_do_not_block_completion() {
        let started = std::time::Instant::now();
        let (tx, mut rx) = mpsc::channel(4);
        let process = TokioProcessRunner
            .spawn(&sh("sleep 30 & echo started"))
            .expect("spawn");
        let outcome = process
            .drive(
                limits(),
                OutputSinks {
                    stdout: Some(tx),
                    stderr: None,
                },
            )
            .await
            .expect("drive");
        assert!(outcome.success());
        assert_eq!(collect(&mut rx).await, vec!["started"]);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn dropping_a_running_process_kills_its_group() {
        let temp = tempfile::tempdir().expect("tempdir");
        let marker = temp.path().join("marker");
        let script = format!(
            "(sleep 1; touch '{}') & echo ready; wait",
            marker.display()
        );
        let (tx, mut rx) = mpsc::channel(4);
        let process = TokioProcessRunner.spawn(&sh(&script)).expect("spawn");
        let task = tokio::spawn(process.drive(
            limits(),
            OutputSinks {
                stdout: Some(tx),
                stderr: None,
            },
        ));

        assert_eq!(rx.recv().await.as_deref(), Some("ready"));
        task.abort();
        let _ = task.await;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn output_beyond_limit_is_counted() {
        let process = TokioProcessRunner
            .spawn(&sh("printf '0123456789' >&2"))
            .expect("spawn");
        let outcome = process
            .drive(
                RunLimits {
                    timeout: Duration::from_secs(10),
                    output_limit_bytes: 4,
                },
                OutputSinks::default(),
            )
            .await
            .expect("drive");
        assert_eq!(outcome.stderr, b"0123");
        assert_eq!(outcome.stderr_truncated, 6);
        assert!(outcome.stderr_text().contains("truncated 6 bytes"));
    }

    #[tokio::test]
    async fn env_overrides_reach_the_child() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut spec = sh("echo \"$AGENTBOX_TEST_VALUE\"");
        spec.env
            .insert("AGENTBOX_TEST_VALUE".to_string(), "present".to_string());
        let process = TokioProcessRunner.spawn(&spec).expect("spawn");
        process
            .drive(
                limits(),
                OutputSinks {
                    stdout: Some(tx),
                    stderr: None,
                },
            )
            .await
            .expect("drive");
        assert_eq!(collect(&mut rx).await, vec!["present"]);
    }
}
