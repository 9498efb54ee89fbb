//! Boundary surface used by callers to create and drive sandboxes.
//!
//! A [`SandboxHost`] owns the configuration and an injected
//! [`SandboxRegistry`]; every per-sandbox call is routed through the registry
//! by identifier.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::command::CommandResult;
use crate::config::{SandboxConfig, Validate};
use crate::error::{Error, Result};
use crate::port::find_available_port_excluding;
use crate::registry::SandboxRegistry;
use crate::sandbox::{SandboxDescriptor, SandboxProvider};

/// Creates sandboxes and routes operations to them.
pub struct SandboxHost {
    config: SandboxConfig,
    registry: Arc<SandboxRegistry>,
    /// Ports picked by creations that have not registered yet.
    pending_ports: Mutex<HashSet<u16>>,
}

impl SandboxHost {
    /// Creates a host after validating `config`.
    pub fn new(config: SandboxConfig, registry: Arc<SandboxRegistry>) -> Result<Self> {
        for warning in config.validate().into_result()? {
            tracing::warn!(warning = %warning, "sandbox config warning");
        }

        Ok(Self {
            config,
            registry,
            pending_ports: Mutex::new(HashSet::new()),
        })
    }

    /// Provisions a new sandbox: port, workspace, scaffold, dev server.
    ///
    /// Nothing is registered unless every step succeeds.
    pub async fn create_sandbox(&self) -> Result<SandboxDescriptor> {
        let id = generate_sandbox_id();
        let reservation = self.reserve_port().await?;
        let port = reservation.port;

        tracing::info!(
            sandbox_id = %id,
            port,
            provider = %self.config.provider,
            "creating sandbox"
        );

        let sandbox = match self.config.provider.provision(&id, port, &self.config).await {
            Ok(sandbox) => sandbox,
            Err(e) => {
                // Sequential reuse must never see a half-created entry.
                if self.registry.remove(&id).await.is_some() {
                    tracing::warn!(sandbox_id = %id, "removed partial registration");
                }
                tracing::error!(sandbox_id = %id, error = %e, "sandbox creation failed");
                return Err(e);
            }
        };

        let descriptor = sandbox.descriptor().clone();
        self.registry.register(id, sandbox).await;
        // The port stays pending until the registry holds it.
        drop(reservation);
        Ok(descriptor)
    }

    /// Picks a bindable port not held or being claimed by another sandbox.
    ///
    /// A creation only releases its pending port after registering, so a
    /// port missing from the pending set at pick time is visible in the
    /// registry by the time it is re-checked.
    async fn reserve_port(&self) -> Result<PortReservation<'_>> {
        let mut taken = self.registry.ports().await;

        loop {
            let port = {
                let mut pending = self.pending_ports.lock().unwrap_or_else(|e| e.into_inner());
                let mut excluded = taken.clone();
                excluded.extend(pending.iter().copied());

                let port = find_available_port_excluding(
                    self.config.base_port,
                    self.config.port_range,
                    &excluded,
                )?;
                pending.insert(port);
                port
            };
            let reservation = PortReservation {
                pending: &self.pending_ports,
                port,
            };

            let registered = self.registry.ports().await;
            if !registered.contains(&port) {
                return Ok(reservation);
            }
            tracing::debug!(port, "port registered while reserving, retrying");
            taken.extend(registered);
        }
    }

    async fn sandbox(&self, id: &str) -> Result<Arc<dyn SandboxProvider>> {
        self.registry
            .get(id)
            .await
            .ok_or_else(|| Error::WorkspaceNotInitialized(id.to_string()))
    }

    pub async fn run_command(&self, id: &str, command: &str) -> Result<CommandResult> {
        Ok(self.sandbox(id).await?.run_command(command).await)
    }

    pub async fn write_file(&self, id: &str, path: &str, content: &str) -> Result<()> {
        self.sandbox(id).await?.write_file(path, content).await
    }

    pub async fn read_file(&self, id: &str, path: &str) -> Result<String> {
        self.sandbox(id).await?.read_file(path).await
    }

    pub async fn list_files(&self, id: &str, directory: Option<&str>) -> Result<Vec<String>> {
        self.sandbox(id).await?.list_files(directory).await
    }

    pub async fn install_packages(&self, id: &str, packages: &[String]) -> Result<CommandResult> {
        Ok(self.sandbox(id).await?.install_packages(packages).await)
    }

    pub async fn restart_dev_server(&self, id: &str) -> Result<()> {
        self.sandbox(id).await?.restart_dev_server().await
    }

    /// Returns the tail of a sandbox's dev-server log.
    pub async fn dev_server_log(&self, id: &str, max_lines: usize) -> Result<String> {
        self.sandbox(id).await?.dev_server_log(max_lines).await
    }

    pub async fn terminate_sandbox(&self, id: &str) -> Result<()> {
        self.registry.terminate(id).await
    }

    pub async fn terminate_all_sandboxes(&self) {
        self.registry.terminate_all().await;
    }

    pub async fn sandbox_url(&self, id: &str) -> Option<String> {
        self.registry.get(id).await.map(|s| s.url().to_string())
    }

    pub async fn is_alive(&self, id: &str) -> bool {
        match self.registry.get(id).await {
            Some(sandbox) => sandbox.is_alive(),
            None => false,
        }
    }

    /// Descriptor of the most recently created sandbox, if still registered.
    pub async fn active_sandbox(&self) -> Option<SandboxDescriptor> {
        self.registry
            .active()
            .await
            .map(|s| s.descriptor().clone())
    }
}

/// A port held in the pending set until dropped.
struct PortReservation<'a> {
    pending: &'a Mutex<HashSet<u16>>,
    port: u16,
}

impl Drop for PortReservation<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.port);
    }
}

/// Generates `sandbox-<unix millis>-<8 hex chars>`.
fn generate_sandbox_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "sandbox-{}-{}",
        chrono::Utc::now().timestamp_millis(),
        &suffix[..8]
    )
}
