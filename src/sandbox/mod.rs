//! Sandbox module for isolated web-app workspaces.
//!
//! This module provides the [`SandboxProvider`] capability trait shared by
//! every sandbox implementation and the [`LocalSandbox`] implementation that
//! runs a scaffolded project under a supervised local dev server.

mod local;
mod provider;

pub use local::LocalSandbox;
pub use provider::{ProviderKind, SandboxDescriptor, SandboxProvider};
