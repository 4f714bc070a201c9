//! Supervised child processes.
//!
//! [`ProcessRunner`] spawns exactly one child per call, captures its stdout
//! and stderr as they arrive and enforces a wall-clock deadline. It knows
//! nothing about languages; adapters hand it a fully resolved
//! [`CommandSpec`].
//!
//! # Pipeline
//!
//! ```text
//! child stdout ──► pump ──┐
//!                         ├──► channel ──► capture ──► OutputEvent sink
//! child stderr ──► pump ──┘
//! ```
//!
//! Both pumps feed the same channel, so the order in which chunks are
//! captured is the order in which they were read from the pipes.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::config::{DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT, SandboxIdentity};
use crate::execute::OutputEvent;

/// Size of a single pipe read.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// POSIX resource limits applied to the child before exec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// `RLIMIT_AS`. Leave unset for runtimes that reserve large heaps up front.
    pub address_space_bytes: Option<u64>,
    /// `RLIMIT_FSIZE`.
    pub file_size_bytes: Option<u64>,
    /// `RLIMIT_CPU`.
    pub cpu_seconds: Option<u64>,
    /// `RLIMIT_NPROC`. Counted per user, so only meaningful under a
    /// dedicated sandbox identity.
    pub max_processes: Option<u64>,
}

impl ResourceLimits {
    #[cfg(unix)]
    fn apply(&self) -> io::Result<()> {
        macro_rules! set_limit {
            ($resource:expr, $value:expr) => {
                if let Some(value) = $value {
                    let limit = libc::rlimit {
                        rlim_cur: value as libc::rlim_t,
                        rlim_max: value as libc::rlim_t,
                    };
                    // SAFETY: setrlimit only reads the struct we pass and is
                    // async-signal-safe, so it may run between fork and exec.
                    if unsafe { libc::setrlimit($resource, &limit) } != 0 {
                        return Err(io::Error::last_os_error());
                    }
                }
            };
        }

        set_limit!(libc::RLIMIT_CORE, Some(0u64));
        set_limit!(libc::RLIMIT_AS, self.address_space_bytes);
        set_limit!(libc::RLIMIT_FSIZE, self.file_size_bytes);
        set_limit!(libc::RLIMIT_CPU, self.cpu_seconds);
        set_limit!(libc::RLIMIT_NPROC, self.max_processes);
        Ok(())
    }
}

/// A fully resolved invocation: explicit argv, cwd and environment.
///
/// No shell is ever involved, which also keeps the contract easy to wrap in
/// external isolation (namespaces, containers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Complete child environment; nothing is inherited from the host.
    pub env: Vec<(String, String)>,
    pub identity: Option<SandboxIdentity>,
    pub limits: ResourceLimits,
    /// File fed to the child's stdin; `/dev/null` when unset.
    pub stdin: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, cwd: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.as_ref().to_path_buf(),
            env: Vec::new(),
            identity: None,
            limits: ResourceLimits::default(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn identity(mut self, identity: Option<SandboxIdentity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn stdin_file(mut self, path: Option<PathBuf>) -> Self {
        self.stdin = path;
        self
    }

    /// Program name for log and error messages.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// How a supervised process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Normal exit with the given code.
    Exited(i32),
    /// Killed by a signal it did not handle (e.g. SIGSEGV).
    Signaled(i32),
    /// Wall-clock budget exceeded; the process group was killed.
    TimedOut,
    /// The program could not be spawned at all.
    LaunchFailed(String),
    /// The child was spawned but could not be waited on.
    Lost(String),
}

/// Everything observed about one supervised process.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub status: ProcessStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    /// Output beyond the runner's cap was dropped.
    pub truncated: bool,
}

impl ProcessReport {
    /// Exited normally with code 0.
    pub fn success(&self) -> bool {
        self.status == ProcessStatus::Exited(0)
    }

    /// Exit code, if the process exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            ProcessStatus::Exited(code) => Some(code),
            _ => None,
        }
    }

    fn without_output(status: ProcessStatus, elapsed: Duration) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: String::new(),
            elapsed,
            truncated: false,
        }
    }
}

/// Spawns and supervises child processes under a timeout.
#[derive(Debug)]
pub struct ProcessRunner {
    timeout: Duration,
    max_output_bytes: usize,
    spawned: AtomicU64,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_MAX_OUTPUT_BYTES)
    }
}

impl ProcessRunner {
    pub fn new(timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            timeout,
            max_output_bytes,
            spawned: AtomicU64::new(0),
        }
    }

    /// Wall-clock budget applied to every call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of spawn attempts made so far.
    pub fn spawn_count(&self) -> u64 {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Run to completion and return the buffered output.
    pub async fn run(&self, spec: &CommandSpec) -> ProcessReport {
        self.run_streaming(spec, None).await
    }

    /// Run to completion, forwarding each output chunk to `events` as it
    /// arrives. The returned report still carries the accumulated output.
    pub async fn run_streaming(
        &self,
        spec: &CommandSpec,
        events: Option<&mpsc::UnboundedSender<OutputEvent>>,
    ) -> ProcessReport {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.timeout;

        self.spawned.fetch_add(1, Ordering::SeqCst);

        let mut child = match build_command(spec).and_then(|mut command| command.spawn()) {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Failed to start {}: {}", spec.program.display(), e);
                let reason = format!("could not start `{}`: {}", spec.program_name(), e);
                return ProcessReport::without_output(
                    ProcessStatus::LaunchFailed(reason),
                    started.elapsed(),
                );
            }
        };
        let pid = child.id();
        tracing::debug!(pid, "Spawned {}", spec.program_name());

        let (tx, mut rx) = mpsc::unbounded_channel::<Chunk>();
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(stdout, Stream::Stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(stderr, Stream::Stderr, tx.clone())));
        }
        drop(tx);

        let mut capture = Capture::new(self.max_output_bytes, events);
        let mut timed_out = false;

        // Drain both pipes until they close or the deadline passes.
        loop {
            tokio::select! {
                chunk = rx.recv() => match chunk {
                    Some(chunk) => capture.push(chunk),
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    timed_out = true;
                    break;
                }
            }
        }

        let status = if timed_out {
            ProcessStatus::TimedOut
        } else {
            match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => classify(status),
                Ok(Err(e)) => {
                    tracing::error!("Failed to wait for {}: {}", spec.program_name(), e);
                    ProcessStatus::Lost(e.to_string())
                }
                Err(_) => ProcessStatus::TimedOut,
            }
        };

        if matches!(status, ProcessStatus::TimedOut | ProcessStatus::Lost(_)) {
            terminate(&mut child).await;
        }
        // Descendants that detached from the pipes must not outlive the call.
        kill_group(pid);
        for pump in pumps {
            pump.abort();
        }

        if capture.truncated {
            tracing::debug!(
                "Output of {} truncated at {} bytes",
                spec.program_name(),
                self.max_output_bytes
            );
        }

        ProcessReport {
            status,
            stdout: capture.stdout,
            stderr: capture.stderr,
            elapsed: started.elapsed(),
            truncated: capture.truncated,
        }
    }
}

fn build_command(spec: &CommandSpec) -> io::Result<Command> {
    let stdin = match &spec.stdin {
        Some(path) => Stdio::from(std::fs::File::open(path)?),
        None => Stdio::null(),
    };

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .env_clear()
        .envs(spec.env.iter().map(|(k, v)| (k, v)))
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    {
        // Own process group so a timeout can take down every descendant.
        command.process_group(0);

        if let Some(identity) = spec.identity {
            command.gid(identity.gid);
            command.uid(identity.uid);
        }

        let limits = spec.limits;
        // SAFETY: the closure only calls setrlimit, which is
        // async-signal-safe, and touches no shared state.
        unsafe {
            command.pre_exec(move || limits.apply());
        }
    }

    Ok(command)
}

fn classify(status: ExitStatus) -> ProcessStatus {
    if let Some(code) = status.code() {
        return ProcessStatus::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ProcessStatus::Signaled(signal);
        }
    }
    ProcessStatus::Exited(-1)
}

/// SIGKILL every process left in the group created for `pid` at spawn.
/// An already empty group (ESRCH) is fine.
fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // SAFETY: kill has no memory-safety preconditions. The negative pid
        // addresses the process group created for this child at spawn.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Kill the child's process group and reap the child.
async fn terminate(child: &mut Child) {
    kill_group(child.id());

    if let Err(e) = child.start_kill() {
        tracing::debug!("start_kill after group kill: {}", e);
    }
    if let Err(e) = child.wait().await {
        tracing::warn!("Failed to reap killed child: {}", e);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct Chunk {
    stream: Stream,
    text: String,
}

/// Read one pipe to EOF, sending decoded chunks down `tx`.
async fn pump<R>(mut reader: R, stream: Stream, tx: mpsc::UnboundedSender<Chunk>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let mut decoder = Utf8Decoder::default();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                if !text.is_empty() && tx.send(Chunk { stream, text }).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!("{:?} pipe read failed: {}", stream, e);
                break;
            }
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        let _ = tx.send(Chunk { stream, text: rest });
    }
}

/// Accumulates output under a byte cap and forwards it as events.
struct Capture<'a> {
    stdout: String,
    stderr: String,
    remaining: usize,
    truncated: bool,
    events: Option<&'a mpsc::UnboundedSender<OutputEvent>>,
}

impl<'a> Capture<'a> {
    fn new(limit: usize, events: Option<&'a mpsc::UnboundedSender<OutputEvent>>) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            remaining: limit,
            truncated: false,
            events,
        }
    }

    fn push(&mut self, chunk: Chunk) {
        if self.truncated {
            return;
        }

        let mut text = chunk.text;
        if text.len() > self.remaining {
            let mut cut = self.remaining;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            self.truncated = true;
        }
        self.remaining -= text.len();
        if text.is_empty() {
            return;
        }

        match chunk.stream {
            Stream::Stdout => {
                self.stdout.push_str(&text);
                self.forward(OutputEvent::Stdout(text));
            }
            Stream::Stderr => {
                self.stderr.push_str(&text);
                self.forward(OutputEvent::Stderr(text));
            }
        }
    }

    fn forward(&self, event: OutputEvent) {
        if let Some(events) = self.events {
            // A closed receiver means the consumer went away; keep capturing.
            let _ = events.send(event);
        }
    }
}

/// Incremental UTF-8 decoder that never splits a character across chunks.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
