//! Boundary contracts consumed by the orchestrator
//!
//! The platform calls that install profiles and report live connections are
//! behind these traits. The implementations in this module are what the
//! daemon and the tests run against:
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │               Orchestrator                │
//! └─────┬───────────────┬───────────────┬─────┘
//!       │               │               │
//!       ▼               ▼               ▼
//!  ProfileStore   ConnectionMonitor  ManagedNameSource
//!   ├─ memory       ├─ memory          ├─ VpnsyncConfig
//!   ├─ directory    └─ file            └─ HashMap
//!   └─ fault (decorator)
//! ```

pub mod directory;
pub mod fault;
pub mod memory;

pub use directory::{DirectoryProfileStore, FileConnectionMonitor};
pub use fault::{FaultInjectingStore, FaultTarget};
pub use memory::{MemoryConnectionMonitor, MemoryProfileStore};

use crate::error::{ApplyError, VpnsyncResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Installs, removes and enumerates profiles on the platform
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Install `document` as profile `name`, replacing any existing profile
    async fn create_or_update(&self, name: &str, document: &str) -> Result<(), ApplyError>;

    /// Remove profile `name`; removing an absent profile succeeds
    async fn remove(&self, name: &str) -> Result<(), ApplyError>;

    /// Every installed profile as `(name, live-state document)`
    async fn list(&self) -> Result<Vec<(String, String)>, ApplyError>;
}

/// One mutation issued against a store, as recorded by the test stores
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    CreateOrUpdate(String),
    Remove(String),
}

impl StoreCall {
    pub fn profile_name(&self) -> &str {
        match self {
            StoreCall::CreateOrUpdate(name) | StoreCall::Remove(name) => name,
        }
    }
}

/// Reports which VPN connections are currently up
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionMonitor: Send + Sync {
    async fn list_active_connection_names(&self) -> VpnsyncResult<HashSet<String>>;
}

/// Which managed profile slot a name belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProfileKind {
    Machine,
    User,
    UserBackup,
}

impl ProfileKind {
    pub const ALL: [ProfileKind; 3] = [ProfileKind::Machine, ProfileKind::User, ProfileKind::UserBackup];
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProfileKind::Machine => "machine",
            ProfileKind::User => "user",
            ProfileKind::UserBackup => "user_backup",
        };
        f.pad(s)
    }
}

/// Supplies the names of the profiles this system manages
pub trait ManagedNameSource: Send + Sync {
    fn get_managed_profile_name(&self, kind: ProfileKind) -> Option<String>;

    /// All configured names, skipping unset slots
    fn managed_profile_names(&self) -> HashSet<String> {
        ProfileKind::ALL
            .iter()
            .filter_map(|kind| self.get_managed_profile_name(*kind))
            .collect()
    }
}

impl ManagedNameSource for HashMap<ProfileKind, String> {
    fn get_managed_profile_name(&self, kind: ProfileKind) -> Option<String> {
        self.get(&kind).filter(|name| !name.trim().is_empty()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_names_skip_blank_slots() {
        let mut names = HashMap::new();
        names.insert(ProfileKind::Machine, "Device".to_string());
        names.insert(ProfileKind::User, "  ".to_string());

        assert_eq!(names.get_managed_profile_name(ProfileKind::Machine).as_deref(), Some("Device"));
        assert_eq!(names.get_managed_profile_name(ProfileKind::User), None);
        assert_eq!(names.get_managed_profile_name(ProfileKind::UserBackup), None);
        assert_eq!(names.managed_profile_names().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_monitor() {
        let mut monitor = MockConnectionMonitor::new();
        monitor
            .expect_list_active_connection_names()
            .returning(|| Ok(HashSet::from(["Contoso VPN".to_string()])));
        let active = monitor.list_active_connection_names().await.unwrap();
        assert!(active.contains("Contoso VPN"));
    }
}
