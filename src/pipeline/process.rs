//! External tool invocation with a hard timeout.
//!
//! Both pipeline stages shell out to opaque binaries (LibreOffice, pdftoppm).
//! This module is the only place a process is launched:
//!
//! * arguments are an argument vector handed straight to the OS with no shell
//!   in between, so a filename is never interpreted;
//! * stdin is `/dev/null` (LibreOffice otherwise waits for a console on some
//!   platforms);
//! * stdout/stderr are drained concurrently into bounded tail buffers so a
//!   chatty tool can neither deadlock on a full pipe nor balloon memory;
//! * the tool runs in its own process group (Unix). LibreOffice's `soffice`
//!   is only a launcher for `oosplash` and `soffice.bin`, so killing the
//!   direct child is not enough: on timeout, on a dropped future and after a
//!   normal exit the whole group gets `SIGKILL`. No stage leaves a process
//!   behind.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bytes of stdout/stderr retained per stream (the tail end).
pub const CAPTURE_LIMIT: usize = 4 * 1024;

/// How long to wait for pipe readers after the process exited.
const PIPE_GRACE: Duration = Duration::from_secs(2);

/// A fully specified tool run.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Short program name for logs and error messages.
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// What a tool left behind after exiting on its own.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Why a tool run did not produce a [`ToolOutput`].
#[derive(Debug)]
pub enum ToolFailure {
    /// The OS refused to start the program.
    Spawn(std::io::Error),
    /// Waiting on the child failed.
    Wait(std::io::Error),
    /// The budget elapsed and the child was killed.
    TimedOut { elapsed: Duration },
}

/// Run a tool to completion or until its timeout.
pub async fn run_tool(inv: &ToolInvocation) -> Result<ToolOutput, ToolFailure> {
    let mut cmd = Command::new(&inv.program);
    cmd.args(&inv.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    if let Some(ref dir) = inv.cwd {
        cmd.current_dir(dir);
    }

    debug!("exec {} {:?}", inv.program.display(), inv.args);
    let start = Instant::now();
    let mut child = cmd.spawn().map_err(ToolFailure::Spawn)?;
    let mut group = GroupKill::new(child.id());

    let mut out_task = spawn_tail_reader(child.stdout.take());
    let mut err_task = spawn_tail_reader(child.stderr.take());

    match tokio::time::timeout(inv.timeout, child.wait()).await {
        Ok(Ok(status)) => {
            // Stragglers would otherwise keep the pipes (and the CPU) busy.
            group.kill_now();
            let stdout = collect(&mut out_task).await;
            let stderr = collect(&mut err_task).await;
            let elapsed = start.elapsed();
            debug!(
                "{} exited with {} after {}ms",
                inv.tool_name(),
                status,
                elapsed.as_millis()
            );
            Ok(ToolOutput {
                status,
                stdout,
                stderr,
                elapsed,
            })
        }
        Ok(Err(e)) => {
            out_task.abort();
            err_task.abort();
            Err(ToolFailure::Wait(e))
        }
        Err(_) => {
            warn!(
                "{} exceeded {}s budget; killing pid {:?}",
                inv.tool_name(),
                inv.timeout.as_secs_f64(),
                child.id()
            );
            group.kill_now();
            if let Err(e) = child.kill().await {
                warn!("failed to kill {}: {}", inv.tool_name(), e);
            }
            out_task.abort();
            err_task.abort();
            Err(ToolFailure::TimedOut {
                elapsed: start.elapsed(),
            })
        }
    }
}

// ── Process groups ───────────────────────────────────────────────────────

/// Sends `SIGKILL` to a child's process group once, at the latest on drop.
struct GroupKill {
    pgid: Option<u32>,
}

impl GroupKill {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn kill_now(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        self.kill_now();
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2) only takes integers; a negative pid addresses the group.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH: the group is already empty.
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!("failed to kill process group {}: {}", pgid, err);
        }
    } else {
        debug!("killed process group {}", pgid);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

// ── Output capture ───────────────────────────────────────────────────────

fn spawn_tail_reader<R>(reader: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return Vec::new();
        };
        let mut tail: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    tail.extend_from_slice(&chunk[..n]);
                    if tail.len() > CAPTURE_LIMIT {
                        let excess = tail.len() - CAPTURE_LIMIT;
                        tail.drain(..excess);
                    }
                }
            }
        }
        tail
    })
}

async fn collect(task: &mut JoinHandle<Vec<u8>>) -> String {
    match tokio::time::timeout(PIPE_GRACE, &mut *task).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Ok(Err(_)) => String::new(),
        Err(_) => {
            // A detached grandchild still holds the pipe.
            task.abort();
            String::new()
        }
    }
}

/// Replace every occurrence of `dir` in tool output with `<workspace>`, so
/// server paths never reach a client.
pub fn scrub_path(s: &str, dir: &Path) -> String {
    let mut out = s.to_string();
    let mut forms = vec![dir.to_string_lossy().into_owned()];
    if let Ok(canonical) = dir.canonicalize() {
        forms.push(canonical.to_string_lossy().into_owned());
    }
    // Longest first, so a canonical form that extends the given one wins.
    forms.sort_by_key(|f| std::cmp::Reverse(f.len()));
    for form in forms.iter().filter(|f| !f.is_empty()) {
        out = out.replace(form.as_str(), "<workspace>");
    }
    out
}

/// Last `max_chars` characters of `s`, prefixed with `…` when cut.
pub fn tail_snippet(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    let skip = count - max_chars;
    let tail: String = s.chars().skip(skip).collect();
    format!("\u{2026}{tail}")
}
