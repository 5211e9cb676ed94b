//! Fault-injecting `ProfileStore` decorator
//!
//! Wraps any store and fails scripted calls before they reach it. Every
//! attempt is recorded, including the ones that failed, so tests can assert
//! on ordering and retries.

use super::{ProfileStore, StoreCall};
use crate::error::ApplyError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Which call a scripted fault applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultTarget {
    CreateOrUpdate,
    Remove,
}

#[derive(Default)]
struct FaultScript {
    queued: HashMap<(FaultTarget, String), VecDeque<ApplyError>>,
    delay: Option<Duration>,
    attempts: Vec<StoreCall>,
}

pub struct FaultInjectingStore<S> {
    inner: S,
    script: Mutex<FaultScript>,
}

impl<S: ProfileStore> FaultInjectingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            script: Mutex::new(FaultScript::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail the next `target` call for `name` with `error`
    ///
    /// Calls queue up: scripting twice fails the next two attempts.
    pub async fn fail_next(&self, target: FaultTarget, name: &str, error: ApplyError) {
        let mut script = self.script.lock().await;
        script
            .queued
            .entry((target, name.to_string()))
            .or_default()
            .push_back(error);
    }

    /// Delay every mutation, simulating a slow platform call
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.script.lock().await.delay = delay;
    }

    /// Every mutation attempted, successful or not, oldest first
    pub async fn attempts(&self) -> Vec<StoreCall> {
        self.script.lock().await.attempts.clone()
    }

    async fn intercept(&self, target: FaultTarget, call: StoreCall) -> Result<(), ApplyError> {
        let (delay, fault) = {
            let mut script = self.script.lock().await;
            let fault = script
                .queued
                .get_mut(&(target, call.profile_name().to_string()))
                .and_then(VecDeque::pop_front);
            script.attempts.push(call);
            (script.delay, fault)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match fault {
            Some(error) => {
                debug!("Injected fault: {}", error);
                Err(error)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<S: ProfileStore> ProfileStore for FaultInjectingStore<S> {
    async fn create_or_update(&self, name: &str, document: &str) -> Result<(), ApplyError> {
        self.intercept(FaultTarget::CreateOrUpdate, StoreCall::CreateOrUpdate(name.to_string()))
            .await?;
        self.inner.create_or_update(name, document).await
    }

    async fn remove(&self, name: &str) -> Result<(), ApplyError> {
        self.intercept(FaultTarget::Remove, StoreCall::Remove(name.to_string()))
            .await?;
        self.inner.remove(name).await
    }

    async fn list(&self) -> Result<Vec<(String, String)>, ApplyError> {
        self.inner.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryProfileStore;

    const DOC: &str = "<VPNProfile><ProfileName>Contoso</ProfileName></VPNProfile>";

    #[tokio::test]
    async fn test_scripted_faults_fire_once_each() {
        let store = FaultInjectingStore::new(MemoryProfileStore::new());
        store
            .fail_next(FaultTarget::CreateOrUpdate, "Contoso", ApplyError::Transient("locked".into()))
            .await;

        let first = store.create_or_update("Contoso", DOC).await;
        assert_eq!(first, Err(ApplyError::Transient("locked".into())));
        assert!(!store.inner().contains("Contoso").await);

        store.create_or_update("Contoso", DOC).await.unwrap();
        assert!(store.inner().contains("Contoso").await);
        assert_eq!(store.attempts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_faults_are_per_target() {
        let store = FaultInjectingStore::new(MemoryProfileStore::new());
        store
            .fail_next(FaultTarget::Remove, "Contoso", ApplyError::PlatformRejected("in use".into()))
            .await;

        store.create_or_update("Contoso", DOC).await.unwrap();
        assert!(store.remove("Contoso").await.is_err());
        assert!(store.remove("Contoso").await.is_ok());
    }
}
