//! Local Sandbox CLI
//!
//! Creates a single sandbox, prints its URL, and tears it down on Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use local_sandbox::{SandboxConfig, SandboxHost, SandboxRegistry};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Parse args (basic for now)
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "-h" || a == "--help") {
        eprintln!("Usage: local-sandbox [config.toml|config.yaml]");
        eprintln!("\nCreates a sandboxed web-app workspace and runs its dev server");
        eprintln!("until interrupted with Ctrl-C.");
        std::process::exit(0);
    }

    let config = match args.get(1) {
        Some(path) => match SandboxConfig::load(&PathBuf::from(path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => SandboxConfig::default(),
    };

    let registry = Arc::new(SandboxRegistry::new());
    let host = match SandboxHost::new(config, Arc::clone(&registry)) {
        Ok(host) => host,
        Err(e) => {
            eprintln!("Invalid config: {}", e);
            std::process::exit(1);
        }
    };

    let descriptor = match host.create_sandbox().await {
        Ok(descriptor) => descriptor,
        Err(e) => {
            eprintln!("Sandbox creation failed: {}", e);
            host.terminate_all_sandboxes().await;
            std::process::exit(1);
        }
    };

    println!("\n{}", "=".repeat(60));
    println!("Sandbox Ready: {}", descriptor.id);
    println!("{}", "=".repeat(60));
    println!();
    println!("URL:       {}", descriptor.url);
    println!("Workspace: {}", descriptor.workspace_root.display());
    println!();
    println!("Press Ctrl-C to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
    }

    tracing::info!("shutting down");
    host.terminate_all_sandboxes().await;
}
