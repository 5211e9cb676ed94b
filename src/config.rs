//! Configuration management for vpnsync

use crate::error::{VpnsyncError, VpnsyncResult};
use crate::orchestrator::OrchestratorSettings;
use crate::store::{ManagedNameSource, ProfileKind};
use crate::validation::{validate_jitter_fraction, validate_period, validate_profile_name};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the daemon configuration
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vpnsync/vpnsync.toml";

/// Main vpnsync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VpnsyncConfig {
    #[serde(default)]
    pub reconcile: ReconcileSettings,
    #[serde(default)]
    pub profiles: ProfileNames,
    #[serde(default)]
    pub paths: ConfigPaths,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSettings {
    /// Base period between reconciliation cycles (seconds)
    #[serde(default = "default_base_period")]
    pub base_period_secs: u64,
    /// Fraction of the base period the delay may vary by
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,
    /// Apply create/update while a connection outside the managed set is up
    #[serde(default)]
    pub allow_updates_with_unmanaged_connections: bool,
    /// Defer create/update when the connection list cannot be read
    #[serde(default = "default_true")]
    pub strict_connection_check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileNames {
    /// Device tunnel profile
    #[serde(default)]
    pub machine: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub user_backup: Option<String>,
    /// Directory of declarative documents describing the desired profiles
    #[serde(default = "default_desired_dir")]
    pub desired_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigPaths {
    /// Directory the installed profiles live in
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// JSON array of currently connected profile names
    #[serde(default = "default_connections_file")]
    pub connections_file: PathBuf,
}

fn default_base_period() -> u64 {
    300
}

fn default_jitter_fraction() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_desired_dir() -> PathBuf {
    PathBuf::from("/etc/vpnsync/desired")
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("/var/lib/vpnsync/profiles")
}

fn default_connections_file() -> PathBuf {
    PathBuf::from("/run/vpnsync/connections.json")
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            base_period_secs: default_base_period(),
            jitter_fraction: default_jitter_fraction(),
            allow_updates_with_unmanaged_connections: false,
            strict_connection_check: true,
        }
    }
}

impl Default for ProfileNames {
    fn default() -> Self {
        Self {
            machine: None,
            user: None,
            user_backup: None,
            desired_dir: default_desired_dir(),
        }
    }
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            connections_file: default_connections_file(),
        }
    }
}

impl From<&ReconcileSettings> for OrchestratorSettings {
    fn from(settings: &ReconcileSettings) -> Self {
        Self {
            base_period_secs: settings.base_period_secs,
            jitter_fraction: settings.jitter_fraction,
            allow_updates_with_unmanaged_connections: settings.allow_updates_with_unmanaged_connections,
            strict_connection_check: settings.strict_connection_check,
        }
    }
}

impl VpnsyncConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> VpnsyncResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| VpnsyncError::Config(format!("Failed to read config {:?}: {}", path.as_ref(), e)))?;
        Self::parse(&content)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> VpnsyncResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> VpnsyncResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VpnsyncError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| VpnsyncError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> VpnsyncResult<()> {
        validate_period(self.reconcile.base_period_secs)?;
        validate_jitter_fraction(self.reconcile.jitter_fraction)?;
        for kind in ProfileKind::ALL {
            if let Some(name) = self.get_managed_profile_name(kind) {
                validate_profile_name(&name)
                    .map_err(|e| VpnsyncError::Config(format!("profiles.{}: {}", kind, e)))?;
            }
        }
        Ok(())
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings::from(&self.reconcile)
    }
}

impl ManagedNameSource for VpnsyncConfig {
    fn get_managed_profile_name(&self, kind: ProfileKind) -> Option<String> {
        let name = match kind {
            ProfileKind::Machine => self.profiles.machine.as_ref(),
            ProfileKind::User => self.profiles.user.as_ref(),
            ProfileKind::UserBackup => self.profiles.user_backup.as_ref(),
        };
        name.map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }
}
