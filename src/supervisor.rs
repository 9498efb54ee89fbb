//! Development-server process supervision.
//!
//! A supervisor owns at most one dev-server process. The process is spawned
//! into its own process group so that it and anything it forks can be
//! signalled together. Stopping sends SIGTERM to the group, waits up to the
//! grace period, then always follows with SIGKILL.
//!
//! Callers must serialize `start`/`stop`/`restart`; the `&mut self`
//! receivers enforce this when the supervisor sits behind a lock.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::process::signal_group;

/// Lifecycle state of a dev server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DevServerState {
    #[default]
    Stopped,
    Starting,
    Running,
}

/// Handle to a spawned dev-server process.
struct ServerHandle {
    pid: u32,
    /// Flips to true once the process has been reaped.
    exited: watch::Receiver<bool>,
    /// Task that waits on the child and publishes its exit.
    monitor: JoinHandle<()>,
}

impl ServerHandle {
    fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }
}

/// Starts, stops, and restarts the dev server for one workspace.
pub struct DevServerSupervisor {
    workspace_root: PathBuf,
    port: u16,
    command: Vec<String>,
    log_path: PathBuf,
    startup_delay: Duration,
    grace_period: Duration,
    handle: Option<ServerHandle>,
    state: Arc<watch::Sender<DevServerState>>,
}

impl DevServerSupervisor {
    /// Creates a supervisor for a server in `workspace_root` on `port`.
    ///
    /// `command` is the program and its leading arguments; the port flags
    /// are appended at spawn time.
    pub fn new(workspace_root: impl Into<PathBuf>, port: u16, command: Vec<String>) -> Self {
        let workspace_root = workspace_root.into();
        let log_path = workspace_root.join(".sandbox").join("dev-server.log");
        let (state, _) = watch::channel(DevServerState::Stopped);

        Self {
            workspace_root,
            port,
            command,
            log_path,
            startup_delay: Duration::from_secs(3),
            grace_period: Duration::from_millis(500),
            handle: None,
            state: Arc::new(state),
        }
    }

    /// Sets how long `start` waits after spawning before returning.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Sets the wait between SIGTERM and SIGKILL.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DevServerState {
        *self.state.borrow()
    }

    /// Receiver that observes state changes, including crashes.
    pub fn subscribe(&self) -> watch::Receiver<DevServerState> {
        self.state.subscribe()
    }

    /// PID of the live process, if any.
    pub fn pid(&self) -> Option<u32> {
        self.handle
            .as_ref()
            .filter(|h| !h.has_exited())
            .map(|h| h.pid)
    }

    /// True iff a process was spawned and has not been observed to exit.
    pub fn is_alive(&self) -> bool {
        self.pid().is_some()
    }

    /// Spawns the dev server unless one is already running.
    pub async fn start(&mut self) -> Result<()> {
        if let Some(handle) = &self.handle {
            if !handle.has_exited() {
                tracing::debug!(pid = handle.pid, port = self.port, "dev server already running");
                return Ok(());
            }
        }
        if let Some(stale) = self.handle.take() {
            // Crashed since the last start; let its monitor finish publishing
            // before a new generation takes over the state channel.
            let _ = stale.monitor.await;
        }

        let (program, leading_args) = self
            .command
            .split_first()
            .ok_or_else(|| Error::DevServer("dev server command is empty".to_string()))?;

        if let Some(log_dir) = self.log_path.parent() {
            tokio::fs::create_dir_all(log_dir).await?;
        }

        // Stdio::from requires std::fs::File.
        let mut log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(
            log_file,
            "--- starting dev server on port {} at {} ---",
            self.port,
            chrono::Utc::now().to_rfc3339()
        )?;
        let log_file_err = log_file.try_clone()?;

        let port = self.port.to_string();
        let mut cmd = Command::new(program);
        cmd.args(leading_args)
            .args(["--port", port.as_str(), "--strictPort", "--host", "127.0.0.1"])
            .env("PORT", &port)
            .current_dir(&self.workspace_root)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_file_err))
            .process_group(0);

        self.state.send_replace(DevServerState::Starting);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.state.send_replace(DevServerState::Stopped);
                return Err(Error::DevServer(format!(
                    "failed to spawn '{}': {}",
                    program, e
                )));
            }
        };
        // Release our copies of the log descriptors.
        drop(cmd);

        let Some(pid) = child.id() else {
            self.state.send_replace(DevServerState::Stopped);
            return Err(Error::DevServer("dev server exited during spawn".to_string()));
        };

        let (exited_tx, exited_rx) = watch::channel(false);
        let state = Arc::clone(&self.state);
        let port_num = self.port;
        let monitor = tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::info!(pid, port = port_num, %status, "dev server exited"),
                Err(e) => tracing::warn!(pid, error = %e, "failed to wait on dev server"),
            }
            let _ = exited_tx.send(true);
            state.send_replace(DevServerState::Stopped);
        });

        self.handle = Some(ServerHandle {
            pid,
            exited: exited_rx,
            monitor,
        });

        tracing::info!(
            pid,
            port = self.port,
            log = ?self.log_path,
            "spawned dev server"
        );

        tokio::time::sleep(self.startup_delay).await;

        // Only promote if the process survived the startup window.
        self.state.send_if_modified(|s| {
            if *s == DevServerState::Starting {
                *s = DevServerState::Running;
                true
            } else {
                false
            }
        });

        Ok(())
    }

    /// Terminates the dev server's process group. Always ends stopped.
    pub async fn stop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        let pid = handle.pid;

        tracing::info!(pid, port = self.port, "stopping dev server");

        if signal_group(pid, Signal::SIGTERM) {
            let mut exited = handle.exited.clone();
            let _ = tokio::time::timeout(self.grace_period, exited.wait_for(|done| *done)).await;
        }

        // Children of the server may outlive it; always finish with SIGKILL.
        signal_group(pid, Signal::SIGKILL);

        let reap_timeout = self.grace_period.max(Duration::from_secs(1));
        if tokio::time::timeout(reap_timeout, &mut handle.monitor)
            .await
            .is_err()
        {
            tracing::warn!(pid, "dev server not reaped after SIGKILL");
            handle.monitor.abort();
        }

        self.state.send_replace(DevServerState::Stopped);
    }

    /// Stops and then starts the dev server.
    pub async fn restart(&mut self) -> Result<()> {
        self.stop().await;
        self.start().await
    }
}

impl Drop for DevServerSupervisor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.has_exited() {
                tracing::warn!(pid = handle.pid, "supervisor dropped with live dev server");
                signal_group(handle.pid, Signal::SIGKILL);
            }
        }
    }
}
