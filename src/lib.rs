//! Local Sandbox - ephemeral web-app workspaces with supervised dev servers
//!
//! This library provisions isolated local workspaces, each with a scaffolded
//! project, a dynamically allocated loopback port, and a supervised
//! development-server process. All file access is confined to the sandbox's
//! workspace root, and dev servers are torn down by process group.

pub mod command;
pub mod config;
pub mod error;
pub mod host;
pub mod port;
mod process;
pub mod registry;
pub mod sandbox;
pub mod scaffold;
pub mod supervisor;
pub mod workspace;

pub use command::{CommandResult, CommandRunner};
pub use config::{SandboxConfig, Validate, ValidationResult};
pub use error::{Error, Result};
pub use host::SandboxHost;
pub use port::{find_available_port, find_available_port_excluding};
pub use registry::SandboxRegistry;
pub use sandbox::{LocalSandbox, ProviderKind, SandboxDescriptor, SandboxProvider};
pub use scaffold::{ScaffoldOutcome, Scaffolder};
pub use supervisor::{DevServerState, DevServerSupervisor};
pub use workspace::ScopedWorkspace;
