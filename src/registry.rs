//! Catalogue of live sandboxes.
//!
//! The registry is an ordinary owned value, shared via `Arc` with whatever
//! serves requests. It also remembers the most recently registered sandbox
//! as the "active" one for callers that only ever deal with a single sandbox.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::sandbox::{SandboxDescriptor, SandboxProvider};

/// Thread-safe map from sandbox identifier to sandbox.
#[derive(Default)]
pub struct SandboxRegistry {
    sandboxes: RwLock<HashMap<String, Arc<dyn SandboxProvider>>>,
    active: RwLock<Option<String>>,
}

impl SandboxRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sandbox` under `id` and makes it the active sandbox.
    ///
    /// A sandbox already registered under `id` is replaced.
    pub async fn register(&self, id: impl Into<String>, sandbox: Arc<dyn SandboxProvider>) {
        let id = id.into();
        let replaced = self.sandboxes.write().await.insert(id.clone(), sandbox);
        if replaced.is_some() {
            tracing::warn!(sandbox_id = %id, "replaced existing sandbox registration");
        }
        *self.active.write().await = Some(id.clone());
        tracing::debug!(sandbox_id = %id, "registered sandbox");
    }

    /// Looks up a sandbox by identifier.
    pub async fn get(&self, id: &str) -> Option<Arc<dyn SandboxProvider>> {
        self.sandboxes.read().await.get(id).cloned()
    }

    /// Returns the most recently registered sandbox that is still present.
    pub async fn active(&self) -> Option<Arc<dyn SandboxProvider>> {
        let active = self.active.read().await.clone()?;
        self.get(&active).await
    }

    /// Removes a sandbox without terminating it.
    pub async fn remove(&self, id: &str) -> Option<Arc<dyn SandboxProvider>> {
        let removed = self.sandboxes.write().await.remove(id);
        let mut active = self.active.write().await;
        if active.as_deref() == Some(id) {
            *active = None;
        }
        removed
    }

    /// Terminates a single sandbox and removes it.
    pub async fn terminate(&self, id: &str) -> Result<()> {
        let sandbox = self
            .remove(id)
            .await
            .ok_or_else(|| Error::WorkspaceNotInitialized(id.to_string()))?;
        sandbox.terminate().await
    }

    /// Terminates every sandbox and empties the registry.
    ///
    /// The table is cleared before any termination runs, and individual
    /// failures are logged rather than returned, so a misbehaving sandbox
    /// cannot keep the others alive or leave stale entries behind.
    pub async fn terminate_all(&self) {
        let drained: Vec<(String, Arc<dyn SandboxProvider>)> =
            self.sandboxes.write().await.drain().collect();
        *self.active.write().await = None;

        if drained.is_empty() {
            return;
        }
        tracing::info!(count = drained.len(), "terminating all sandboxes");

        let mut tasks = JoinSet::new();
        for (id, sandbox) in drained {
            tasks.spawn(async move {
                let result = sandbox.terminate().await;
                (id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((id, Err(e))) => {
                    tracing::error!(sandbox_id = %id, error = %e, "failed to terminate sandbox");
                }
                Err(e) => {
                    tracing::error!(error = %e, "sandbox termination task panicked");
                }
            }
        }
    }

    /// Descriptors of all registered sandboxes.
    pub async fn descriptors(&self) -> Vec<SandboxDescriptor> {
        self.sandboxes
            .read()
            .await
            .values()
            .map(|s| s.descriptor().clone())
            .collect()
    }

    /// Ports held by registered sandboxes.
    pub async fn ports(&self) -> HashSet<u16> {
        self.sandboxes
            .read()
            .await
            .values()
            .map(|s| s.descriptor().port)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sandboxes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sandboxes.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandResult;
    use crate::sandbox::ProviderKind;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory sandbox whose termination can be made to fail.
    struct FakeSandbox {
        descriptor: SandboxDescriptor,
        alive: AtomicBool,
        fail_terminate: bool,
    }

    impl FakeSandbox {
        fn new(id: &str, port: u16, fail_terminate: bool) -> Arc<Self> {
            Arc::new(Self {
                descriptor: SandboxDescriptor::new(
                    id,
                    port,
                    ProviderKind::Local,
                    PathBuf::from("/tmp").join(id),
                ),
                alive: AtomicBool::new(true),
                fail_terminate,
            })
        }
    }

    #[async_trait]
    impl SandboxProvider for FakeSandbox {
        fn descriptor(&self) -> &SandboxDescriptor {
            &self.descriptor
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn run_command(&self, _command: &str) -> CommandResult {
            CommandResult::empty_success()
        }

        async fn write_file(&self, _path: &str, _content: &str) -> Result<()> {
            Ok(())
        }

        async fn read_file(&self, path: &str) -> Result<String> {
            Err(Error::NotFound(path.into()))
        }

        async fn list_files(&self, _directory: Option<&str>) -> Result<Vec<String>> {
            Ok(vec![])
        }

        async fn install_packages(&self, _packages: &[String]) -> CommandResult {
            CommandResult::empty_success()
        }

        async fn restart_dev_server(&self) -> Result<()> {
            Ok(())
        }

        async fn dev_server_log(&self, _max_lines: usize) -> Result<String> {
            Ok(String::new())
        }

        async fn terminate(&self) -> Result<()> {
            if self.fail_terminate {
                return Err(Error::DevServer("stuck".to_string()));
            }
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let registry = SandboxRegistry::new();
        registry.register("a", FakeSandbox::new("a", 5173, false)).await;

        assert!(registry.get("a").await.is_some());
        assert!(registry.get("missing").await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn active_tracks_latest_registration() {
        let registry = SandboxRegistry::new();
        assert!(registry.active().await.is_none());

        registry.register("a", FakeSandbox::new("a", 5173, false)).await;
        registry.register("b", FakeSandbox::new("b", 5174, false)).await;

        assert_eq!(registry.active().await.unwrap().id(), "b");

        registry.remove("b").await;
        assert!(registry.active().await.is_none());
        assert!(registry.get("a").await.is_some());
    }

    #[tokio::test]
    async fn terminate_removes_single_sandbox() {
        let registry = SandboxRegistry::new();
        let a = FakeSandbox::new("a", 5173, false);
        registry.register("a", a.clone()).await;

        registry.terminate("a").await.unwrap();

        assert!(!a.is_alive());
        assert!(registry.is_empty().await);
        assert!(matches!(
            registry.terminate("a").await,
            Err(Error::WorkspaceNotInitialized(_))
        ));
    }

    #[tokio::test]
    async fn terminate_all_tolerates_failures() {
        let registry = SandboxRegistry::new();
        let a = FakeSandbox::new("a", 5173, false);
        let stuck = FakeSandbox::new("stuck", 5174, true);
        let c = FakeSandbox::new("c", 5175, false);
        registry.register("a", a.clone()).await;
        registry.register("stuck", stuck.clone()).await;
        registry.register("c", c.clone()).await;

        registry.terminate_all().await;

        assert!(registry.is_empty().await);
        assert!(registry.active().await.is_none());
        assert!(!a.is_alive());
        assert!(!c.is_alive());
    }

    #[tokio::test]
    async fn registry_is_reusable_after_terminate_all() {
        let registry = SandboxRegistry::new();
        registry.register("old", FakeSandbox::new("old", 5173, true)).await;
        registry.terminate_all().await;

        registry.register("new", FakeSandbox::new("new", 5173, false)).await;

        let ids: Vec<String> = registry.descriptors().await.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["new".to_string()]);
        assert_eq!(registry.active().await.unwrap().id(), "new");
    }

    #[tokio::test]
    async fn concurrent_registration_keeps_every_entry() {
        let registry = Arc::new(SandboxRegistry::new());

        let mut tasks = JoinSet::new();
        for i in 0..16u16 {
            let registry = Arc::clone(&registry);
            tasks.spawn(async move {
                let id = format!("sb-{}", i);
                registry.register(id.clone(), FakeSandbox::new(&id, 6000 + i, false)).await;
            });
        }
        while tasks.join_next().await.is_some() {}

        assert_eq!(registry.len().await, 16);
        assert_eq!(registry.ports().await.len(), 16);
    }
}
