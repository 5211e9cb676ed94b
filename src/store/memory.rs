//! In-memory profile store and connection monitor
//!
//! Stands in for the platform in tests and dry runs. Installed profiles are
//! kept as live-state documents so that `list()` answers the way the real
//! query does.

use super::{ConnectionMonitor, ProfileStore, StoreCall};
use crate::decode::{DocumentDecoder, LiveProfile, ProfileDecoder};
use crate::error::{ApplyError, VpnsyncError, VpnsyncResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct MemoryProfileStore {
    profiles: Arc<RwLock<BTreeMap<String, String>>>,
    log: Arc<RwLock<Vec<StoreCall>>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a live-state document directly, bypassing the log
    pub async fn insert_live(&self, name: &str, live_document: &str) {
        let mut profiles = self.profiles.write().await;
        profiles.insert(name.to_string(), live_document.to_string());
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.profiles.read().await.contains_key(name)
    }

    /// Live-state document of an installed profile
    pub async fn get(&self, name: &str) -> Option<String> {
        self.profiles.read().await.get(name).cloned()
    }

    /// Successful mutations, oldest first
    pub async fn operations(&self) -> Vec<StoreCall> {
        self.log.read().await.clone()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn create_or_update(&self, name: &str, document: &str) -> Result<(), ApplyError> {
        let profile = DocumentDecoder
            .decode(document)
            .map_err(|e| ApplyError::PlatformRejected(e.to_string()))?;

        let live = LiveProfile::encode(&profile);
        let replaced = self.profiles.write().await.insert(name.to_string(), live).is_some();
        self.log.write().await.push(StoreCall::CreateOrUpdate(name.to_string()));

        if replaced {
            info!("Updated profile '{}'", name);
        } else {
            info!("Created profile '{}'", name);
        }
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), ApplyError> {
        if self.profiles.write().await.remove(name).is_some() {
            info!("Removed profile '{}'", name);
        } else {
            debug!("Profile '{}' already absent", name);
        }
        self.log.write().await.push(StoreCall::Remove(name.to_string()));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(String, String)>, ApplyError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// Connection monitor whose answer is set by the caller
#[derive(Debug, Clone, Default)]
pub struct MemoryConnectionMonitor {
    active: Arc<RwLock<HashSet<String>>>,
    failure: Arc<RwLock<Option<String>>>,
}

impl MemoryConnectionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_active<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.active.write().await = names.into_iter().map(Into::into).collect();
    }

    /// Make every query fail with `reason` until cleared with `None`
    pub async fn set_failure(&self, reason: Option<&str>) {
        *self.failure.write().await = reason.map(str::to_string);
    }
}

#[async_trait]
impl ConnectionMonitor for MemoryConnectionMonitor {
    async fn list_active_connection_names(&self) -> VpnsyncResult<HashSet<String>> {
        if let Some(reason) = self.failure.read().await.as_ref() {
            return Err(VpnsyncError::NotFound(format!("Connection list unavailable: {}", reason)));
        }
        Ok(self.active.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::LiveStateDecoder;

    const DOC: &str = "<VPNProfile><ProfileName>Contoso</ProfileName>\
        <NativeProfile><Servers>vpn.contoso.com</Servers></NativeProfile></VPNProfile>";

    #[tokio::test]
    async fn test_create_stores_live_document() {
        let store = MemoryProfileStore::new();
        store.create_or_update("Contoso", DOC).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        let live = LiveStateDecoder.decode(&listed[0].1).unwrap();
        assert!(live.servers().contains("vpn.contoso.com"));
    }

    #[tokio::test]
    async fn test_undecodable_document_is_rejected() {
        let store = MemoryProfileStore::new();
        let err = store.create_or_update("Broken", "<VPNProfile>").await.unwrap_err();
        assert!(matches!(err, ApplyError::PlatformRejected(_)));
        assert!(store.operations().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = MemoryProfileStore::new();
        store.create_or_update("Contoso", DOC).await.unwrap();
        store.remove("Contoso").await.unwrap();
        store.remove("Contoso").await.unwrap();
        assert!(!store.contains("Contoso").await);
        assert_eq!(
            store.operations().await,
            vec![
                StoreCall::CreateOrUpdate("Contoso".into()),
                StoreCall::Remove("Contoso".into()),
                StoreCall::Remove("Contoso".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_monitor_failure() {
        let monitor = MemoryConnectionMonitor::new();
        monitor.set_active(["Contoso"]).await;
        assert_eq!(monitor.list_active_connection_names().await.unwrap().len(), 1);

        monitor.set_failure(Some("service stopped")).await;
        assert!(monitor.list_active_connection_names().await.is_err());
        monitor.set_failure(None).await;
        assert!(monitor.list_active_connection_names().await.is_ok());
    }
}
