use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tether_api::{COOKIE_KEY, Handshake};
use tether_core::Liveness;

use crate::{LaunchConfig, LaunchError};

pub(crate) fn spawn(cfg: &LaunchConfig) -> Result<Child, LaunchError> {
    let mut cmd = Command::new(&cfg.command);
    cmd.args(&cfg.args);
    for (k, v) in &cfg.env {
        cmd.env(k, v);
    }
    cmd.env(COOKIE_KEY, &cfg.cookie);

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    debug!(target: "tether.launch", command = %cfg.command.display(), args = ?cfg.args, "spawning plugin");
    cmd.spawn().map_err(|source| LaunchError::Spawn {
        command: cfg.command.display().to_string(),
        source,
    })
}

/// Read the first stdout line and parse it as a handshake.
pub(crate) async fn read_handshake(
    child: &mut Child,
    lines: &mut Lines<BufReader<ChildStdout>>,
    timeout: Duration,
) -> Result<Handshake, LaunchError> {
    let line = match tokio::time::timeout(timeout, lines.next_line()).await {
        Err(_) => return Err(LaunchError::HandshakeTimeout(timeout)),
        Ok(Err(e)) => return Err(LaunchError::Io(e)),
        Ok(Ok(Some(line))) => line,
        Ok(Ok(None)) => {
            let status = match child.wait().await {
                Ok(status) => status.to_string(),
                Err(e) => format!("wait failed: {e}"),
            };
            return Err(LaunchError::ExitedEarly { status });
        }
    };

    debug!(target: "tether.launch", %line, "handshake received");
    Ok(Handshake::parse(&line)?)
}

/// Forward plugin output lines to the log until EOF.
pub(crate) fn forward_output<R>(plugin: String, stream: &'static str, mut lines: Lines<BufReader<R>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!(target: "tether.plugin", %plugin, stream, "{line}");
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(target: "tether.plugin", %plugin, stream, error = %e, "stopped reading plugin output");
                    break;
                }
            }
        }
    });
}

/// Own the child until it exits or `stop` fires, then fire `liveness`.
pub(crate) async fn monitor(
    mut child: Child,
    plugin: String,
    stop: CancellationToken,
    kill_grace: Duration,
    liveness: Liveness,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = stop.cancelled() => terminate(&mut child, kill_grace).await,
    };

    match status {
        Ok(status) if status.success() => {
            info!(target: "tether.launch", %plugin, "plugin exited")
        }
        Ok(status) => warn!(target: "tether.launch", %plugin, %status, "plugin exited"),
        Err(e) => warn!(target: "tether.launch", %plugin, error = %e, "failed to reap plugin"),
    }
    liveness.fire();
}

/// SIGTERM, wait up to `grace`, then SIGKILL and reap.
pub(crate) async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    if let Some(pid) = child.id() {
        send_sigterm(pid);
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(target: "tether.launch", ?grace, "plugin ignored SIGTERM; killing");
            child.kill().await?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        debug!(target: "tether.launch", pid, error = %std::io::Error::last_os_error(), "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) {}
