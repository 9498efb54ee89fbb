//! Sandbox provider trait and types.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::CommandResult;
use crate::config::SandboxConfig;
use crate::error::Result;

use super::local::LocalSandbox;

/// The closed set of sandbox implementations.
///
/// Chosen once when a host is configured, never per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Workspace directory and dev server on the local host.
    #[default]
    Local,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
        }
    }

    /// Provisions a fully initialized sandbox of this kind.
    ///
    /// On failure nothing is left running; the workspace directory is kept.
    pub async fn provision(
        &self,
        id: &str,
        port: u16,
        config: &SandboxConfig,
    ) -> Result<Arc<dyn SandboxProvider>> {
        match self {
            ProviderKind::Local => {
                let sandbox = LocalSandbox::provision(id, port, config).await?;
                Ok(Arc::new(sandbox))
            }
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable identity of a created sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxDescriptor {
    pub id: String,
    /// Base URL of the dev server, `http://127.0.0.1:<port>`.
    pub url: String,
    pub provider: ProviderKind,
    pub created_at: DateTime<Utc>,
    pub workspace_root: PathBuf,
    pub port: u16,
}

impl SandboxDescriptor {
    pub fn new(
        id: impl Into<String>,
        port: u16,
        provider: ProviderKind,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            id: id.into(),
            url: format!("http://127.0.0.1:{}", port),
            provider,
            created_at: Utc::now(),
            workspace_root,
            port,
        }
    }
}

/// Capabilities every sandbox exposes to callers.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Returns the descriptor assigned at creation.
    fn descriptor(&self) -> &SandboxDescriptor;

    fn id(&self) -> &str {
        &self.descriptor().id
    }

    fn url(&self) -> &str {
        &self.descriptor().url
    }

    /// True while the dev server process is up.
    fn is_alive(&self) -> bool;

    /// Runs a shell command at the workspace root.
    async fn run_command(&self, command: &str) -> CommandResult;

    async fn write_file(&self, path: &str, content: &str) -> Result<()>;

    async fn read_file(&self, path: &str) -> Result<String>;

    /// Lists workspace files under `directory`, or the whole workspace.
    async fn list_files(&self, directory: Option<&str>) -> Result<Vec<String>>;

    /// Installs packages; an empty list succeeds without running anything.
    async fn install_packages(&self, packages: &[String]) -> CommandResult;

    async fn restart_dev_server(&self) -> Result<()>;

    /// Returns up to `max_lines` trailing lines of the dev-server log.
    async fn dev_server_log(&self, max_lines: usize) -> Result<String>;

    /// Stops the dev server. Safe to call more than once.
    async fn terminate(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_url_uses_loopback_port() {
        let descriptor =
            SandboxDescriptor::new("sandbox-1", 5176, ProviderKind::Local, PathBuf::from("/tmp/x"));

        assert_eq!(descriptor.url, "http://127.0.0.1:5176");
        assert_eq!(descriptor.port, 5176);
    }

    #[test]
    fn descriptor_serializes_camel_case() {
        let descriptor =
            SandboxDescriptor::new("sandbox-1", 5173, ProviderKind::Local, PathBuf::from("/tmp/x"));
        let json = serde_json::to_value(&descriptor).unwrap();

        assert_eq!(json["provider"], "local");
        assert_eq!(json["workspaceRoot"], "/tmp/x");
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn provider_kind_serializes_to_lowercase() {
        assert_eq!(serde_json::to_string(&ProviderKind::Local).unwrap(), "\"local\"");
        assert_eq!(ProviderKind::Local.to_string(), "local");
    }
}
