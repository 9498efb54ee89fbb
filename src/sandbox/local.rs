//! Sandbox backed by a local workspace directory and dev server.

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

use crate::command::{shell_escape, CommandResult, CommandRunner};
use crate::config::SandboxConfig;
use crate::error::Result;
use crate::scaffold::Scaffolder;
use crate::supervisor::{DevServerState, DevServerSupervisor};
use crate::workspace::ScopedWorkspace;

use super::provider::{ProviderKind, SandboxDescriptor, SandboxProvider};

/// A scaffolded workspace with its own port and supervised dev server.
pub struct LocalSandbox {
    descriptor: SandboxDescriptor,
    workspace: ScopedWorkspace,
    runner: CommandRunner,
    install_command: String,
    supervisor: Mutex<DevServerSupervisor>,
    /// Mirrors the supervisor state without taking its lock.
    server_state: watch::Receiver<DevServerState>,
}

impl LocalSandbox {
    /// Creates the workspace directory and wires up the sandbox's parts.
    ///
    /// Nothing is scaffolded or started yet.
    pub async fn new(id: &str, port: u16, config: &SandboxConfig) -> Result<Self> {
        let workspace =
            ScopedWorkspace::create(config.sandbox_root.join(id), config.excluded_dirs.clone())
                .await?;
        let runner = CommandRunner::new().with_timeout(config.command_timeout());
        let supervisor =
            DevServerSupervisor::new(workspace.root(), port, config.dev_command.clone())
                .with_startup_delay(config.startup_delay())
                .with_grace_period(config.grace_period());
        let server_state = supervisor.subscribe();
        let descriptor = SandboxDescriptor::new(
            id,
            port,
            ProviderKind::Local,
            workspace.root().to_path_buf(),
        );

        Ok(Self {
            descriptor,
            workspace,
            runner,
            install_command: config.install_command.clone(),
            supervisor: Mutex::new(supervisor),
            server_state,
        })
    }

    /// Creates, scaffolds, and starts a sandbox.
    ///
    /// If scaffolding or the first start fails, the dev server is stopped
    /// before the error is returned.
    pub async fn provision(id: &str, port: u16, config: &SandboxConfig) -> Result<Self> {
        let sandbox = Self::new(id, port, config).await?;

        if let Err(e) = sandbox.initialize().await {
            tracing::error!(sandbox_id = %id, error = %e, "initialization failed, rolling back");
            if let Err(stop_err) = sandbox.terminate().await {
                tracing::warn!(sandbox_id = %id, error = %stop_err, "rollback failed");
            }
            return Err(e);
        }

        tracing::info!(
            sandbox_id = %id,
            url = %sandbox.descriptor.url,
            root = ?sandbox.workspace.root(),
            "sandbox ready"
        );
        Ok(sandbox)
    }

    async fn initialize(&self) -> Result<()> {
        let scaffolder = Scaffolder::new(self.install_command.clone(), self.runner.clone());
        scaffolder
            .scaffold(&self.workspace, self.descriptor.port)
            .await?;
        self.supervisor.lock().await.start().await
    }

    pub fn workspace(&self) -> &ScopedWorkspace {
        &self.workspace
    }

    /// Current dev-server state.
    pub fn server_state(&self) -> DevServerState {
        *self.server_state.borrow()
    }
}

#[async_trait]
impl SandboxProvider for LocalSandbox {
    fn descriptor(&self) -> &SandboxDescriptor {
        &self.descriptor
    }

    fn is_alive(&self) -> bool {
        self.server_state() != DevServerState::Stopped
    }

    async fn run_command(&self, command: &str) -> CommandResult {
        self.runner.run(command, self.workspace.root()).await
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        self.workspace.write_file(path, content).await
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        self.workspace.read_file(path).await
    }

    async fn list_files(&self, directory: Option<&str>) -> Result<Vec<String>> {
        self.workspace.list_files(directory).await
    }

    async fn install_packages(&self, packages: &[String]) -> CommandResult {
        if packages.is_empty() {
            return CommandResult::empty_success();
        }

        let names: Vec<String> = packages.iter().map(|p| shell_escape(p)).collect();
        let command = format!("{} {}", self.install_command, names.join(" "));

        tracing::info!(
            sandbox_id = %self.descriptor.id,
            packages = ?packages,
            "installing packages"
        );
        self.run_command(&command).await
    }

    async fn restart_dev_server(&self) -> Result<()> {
        tracing::info!(sandbox_id = %self.descriptor.id, "restarting dev server");
        self.supervisor.lock().await.restart().await
    }

    async fn dev_server_log(&self, max_lines: usize) -> Result<String> {
        let path = self.supervisor.lock().await.log_path().to_path_buf();

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
            Err(e) => return Err(e.into()),
        };

        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        Ok(lines[start..].join("\n"))
    }

    async fn terminate(&self) -> Result<()> {
        self.supervisor.lock().await.stop().await;
        tracing::info!(sandbox_id = %self.descriptor.id, "sandbox terminated");
        Ok(())
    }
}
