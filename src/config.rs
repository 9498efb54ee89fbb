//! Host configuration and validation.
//!
//! Configuration is read once at startup from a TOML or YAML file and is
//! never re-read while sandboxes are live.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sandbox::ProviderKind;

/// Directory names skipped when enumerating workspace files.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    ".next",
    ".vite",
    ".cache",
    ".sandbox",
];

/// Configuration shared by every sandbox created by a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Directory under which each sandbox gets its own workspace.
    #[serde(default = "default_sandbox_root")]
    pub sandbox_root: PathBuf,

    /// First port probed for a dev server.
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    /// Number of ports after `base_port` to probe (inclusive).
    #[serde(default = "default_port_range")]
    pub port_range: u16,

    /// Delay after spawning a dev server before it is considered up.
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,

    /// Time between the graceful and forceful termination signals.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Optional wall-clock limit for commands run inside a sandbox.
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,

    /// Directory names skipped by file listing.
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,

    /// Shell command that installs project dependencies.
    #[serde(default = "default_install_command")]
    pub install_command: String,

    /// Program and leading arguments that launch the dev server.
    #[serde(default = "default_dev_command")]
    pub dev_command: Vec<String>,

    /// Which sandbox implementation to provision.
    #[serde(default)]
    pub provider: ProviderKind,
}

fn default_sandbox_root() -> PathBuf {
    std::env::temp_dir().join("local-sandboxes")
}

fn default_base_port() -> u16 {
    5173
}

fn default_port_range() -> u16 {
    100
}

fn default_startup_delay_ms() -> u64 {
    3000
}

fn default_grace_period_ms() -> u64 {
    500
}

fn default_excluded_dirs() -> Vec<String> {
    DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect()
}

fn default_install_command() -> String {
    "npm install".to_string()
}

fn default_dev_command() -> Vec<String> {
    vec![
        "npm".to_string(),
        "run".to_string(),
        "dev".to_string(),
        "--".to_string(),
    ]
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            sandbox_root: default_sandbox_root(),
            base_port: default_base_port(),
            port_range: default_port_range(),
            startup_delay_ms: default_startup_delay_ms(),
            grace_period_ms: default_grace_period_ms(),
            command_timeout_secs: None,
            excluded_dirs: default_excluded_dirs(),
            install_command: default_install_command(),
            dev_command: default_dev_command(),
            provider: ProviderKind::default(),
        }
    }
}

impl SandboxConfig {
    /// Loads configuration from a file.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, anything else
    /// as TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid TOML config: {}", e)))
    }

    /// Sets the sandbox root directory.
    pub fn with_sandbox_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sandbox_root = root.into();
        self
    }

    /// Sets the port scan window.
    pub fn with_ports(mut self, base_port: u16, port_range: u16) -> Self {
        self.base_port = base_port;
        self.port_range = port_range;
        self
    }

    /// Sets the dev-server startup delay.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the command timeout, rounded up to whole seconds.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout_secs =
            timeout.map(|t| t.as_secs() + u64::from(t.subsec_nanos() > 0));
        self
    }

    /// Sets the dependency install command.
    pub fn with_install_command(mut self, command: impl Into<String>) -> Self {
        self.install_command = command.into();
        self
    }

    /// Sets the dev-server launch command.
    pub fn with_dev_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dev_command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for SandboxConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.base_port.checked_add(self.port_range).is_none() {
            result.add_error(format!(
                "base_port {} + port_range {} exceeds 65535",
                self.base_port, self.port_range
            ));
        }

        if self.dev_command.is_empty() {
            result.add_error("dev_command cannot be empty");
        }

        if self.install_command.trim().is_empty() {
            result.add_error("install_command cannot be empty");
        }

        if self.command_timeout_secs == Some(0) {
            result.add_error("command_timeout_secs must be at least 1 (omit it for no limit)");
        }

        if self.base_port < 1024 {
            result.add_warning(format!(
                "base_port {} is a privileged port and may fail to bind",
                self.base_port
            ));
        }

        if self.startup_delay_ms == 0 {
            result.add_warning("startup_delay_ms = 0 gives the dev server no time to bind");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_config_has_sensible_defaults() {
        let config = SandboxConfig::default();

        assert_eq!(config.base_port, 5173);
        assert_eq!(config.port_range, 100);
        assert_eq!(config.startup_delay(), Duration::from_secs(3));
        assert_eq!(config.command_timeout(), None);
        assert!(config.excluded_dirs.contains(&"node_modules".to_string()));
        assert!(config.excluded_dirs.contains(&".git".to_string()));
        assert_eq!(config.provider, ProviderKind::Local);
        assert!(config.validate().is_valid());
    }

    #[test]
    fn sandbox_config_deserializes_from_toml() {
        let toml = r#"
            sandbox_root = "/var/tmp/boxes"
            base_port = 6000
            port_range = 5
            command_timeout_secs = 60
            dev_command = ["pnpm", "dev"]
        "#;

        let config = SandboxConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.sandbox_root, PathBuf::from("/var/tmp/boxes"));
        assert_eq!(config.base_port, 6000);
        assert_eq!(config.port_range, 5);
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.dev_command, vec!["pnpm", "dev"]);
        // Unspecified fields keep their defaults
        assert_eq!(config.install_command, "npm install");
    }

    #[test]
    fn sandbox_config_loads_yaml_by_extension() {
        let dir = tempfile::TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("sandbox.yaml");
        std::fs::write(&path, "base_port: 7000\nprovider: local\n")
            .expect("failed to write config");

        let config = SandboxConfig::load(&path).unwrap();
        assert_eq!(config.base_port, 7000);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = SandboxConfig::from_toml_str("base_port = \"nope\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validation_rejects_port_overflow() {
        let config = SandboxConfig::default().with_ports(65530, 10);
        let result = config.validate();

        assert!(!result.is_valid());
        assert!(result.errors[0].contains("exceeds 65535"));
    }

    #[test]
    fn validation_rejects_empty_dev_command() {
        let config = SandboxConfig::default().with_dev_command(Vec::<String>::new());
        assert!(config.validate().into_result().is_err());
    }

    #[test]
    fn command_timeout_builder_rounds_up_to_whole_seconds() {
        let config =
            SandboxConfig::default().with_command_timeout(Some(Duration::from_millis(500)));
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(1)));
        assert!(config.validate().is_valid());

        let config = SandboxConfig::default().with_command_timeout(Some(Duration::from_secs(30)));
        assert_eq!(config.command_timeout_secs, Some(30));

        let config = SandboxConfig::default().with_command_timeout(None);
        assert_eq!(config.command_timeout(), None);
    }

    #[test]
    fn validation_rejects_zero_command_timeout() {
        let config = SandboxConfig::from_toml_str("command_timeout_secs = 0")
            .expect("failed to parse config");
        let result = config.validate();

        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("command_timeout_secs")));

        let config = SandboxConfig::default().with_command_timeout(Some(Duration::ZERO));
        assert!(config.validate().into_result().is_err());
    }

    #[test]
    fn validation_warns_on_privileged_port() {
        let config = SandboxConfig::default().with_ports(80, 10);
        let result = config.validate();

        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("privileged")));
    }
}
