//! Reconciliation orchestrator
//!
//! Owns the pending update queue and the last known connection state, and
//! drives queued mutations into a [`ProfileStore`]:
//!
//! ```text
//!  add_profile_update ─┐                     ┌─► remove        (first)
//!  remove_profile ─────┼─► UpdateQueue ─► available ─┤
//!  sync_desired ───────┘        ▲            └─► create/update (unless connected)
//!                               │
//!                      failed entries stay queued
//! ```
//!
//! Queue mutation is a short critical section under one lock. A cycle holds
//! a separate apply lock for its whole duration, so at most one mutation is
//! in flight per profile name and cycles never overlap. A write made while a
//! cycle is applying either lands in that cycle's snapshot or stays queued
//! for the next one: entries are only dropped when their sequence number is
//! unchanged since the snapshot.

use crate::compare::live_matches;
use crate::decode::{DocumentDecoder, LiveStateDecoder, ProfileDecoder};
use crate::error::{ApplyError, DecodeError, VpnsyncError, VpnsyncResult};
use crate::profile::CanonicalProfile;
use crate::queue::{ManagedProfile, PendingChange, UpdateQueue};
use crate::schedule::JitteredInterval;
use crate::store::{ConnectionMonitor, ManagedNameSource, ProfileStore, StoreCall};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub base_period_secs: u64,
    pub jitter_fraction: f64,
    /// When false, any active connection outside the managed set blocks
    /// every create/update
    pub allow_updates_with_unmanaged_connections: bool,
    /// When true, a failed connection query defers every create/update;
    /// otherwise the last successful answer is reused
    pub strict_connection_check: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            base_period_secs: 300,
            jitter_fraction: 0.5,
            allow_updates_with_unmanaged_connections: false,
            strict_connection_check: true,
        }
    }
}

/// What the orchestrator believes is connected right now
#[derive(Debug, Clone)]
enum ConnectionSnapshot {
    Known(HashSet<String>),
    /// The last query failed in strict mode
    Unavailable,
}

/// One failed apply attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyFailure {
    pub call: StoreCall,
    pub error: ApplyError,
    pub failed_at: DateTime<Utc>,
}

/// Outcome of one reconciliation cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    /// Mutations that succeeded, in the order they were applied
    pub applied: Vec<StoreCall>,
    /// Names left queued because applying them now is unsafe
    pub deferred: Vec<String>,
    pub failed: Vec<ApplyFailure>,
    /// The cycle stopped early on cancellation
    pub cancelled: bool,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            applied: Vec::new(),
            deferred: Vec::new(),
            failed: Vec::new(),
            cancelled: false,
        }
    }
}

/// Outcome of reconciling a set of desired documents against the store
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Profiles queued for create/update
    pub enqueued: Vec<String>,
    /// Profiles already matching the desired document
    pub unchanged: Vec<String>,
    /// Managed profiles queued for removal
    pub removals: Vec<String>,
    /// Documents that could not be decoded, by position in the input
    pub errors: Vec<(usize, DecodeError)>,
}

pub struct Orchestrator {
    settings: OrchestratorSettings,
    store: Arc<dyn ProfileStore>,
    monitor: Arc<dyn ConnectionMonitor>,
    names: Arc<dyn ManagedNameSource>,
    cancel: CancellationToken,
    queue: Mutex<UpdateQueue>,
    connections: RwLock<ConnectionSnapshot>,
    /// Managed profiles known to be installed, lowercase name to name
    managed: RwLock<BTreeMap<String, String>>,
    durable_failures: Mutex<Vec<ApplyFailure>>,
    apply_lock: Mutex<()>,
    interval: Mutex<JitteredInterval>,
}

impl Orchestrator {
    /// Create an orchestrator and scan the current state
    ///
    /// The scan records which managed profiles are installed and which
    /// connections are up. It never queues anything: only explicit calls
    /// create demand.
    pub async fn new(
        settings: OrchestratorSettings,
        store: Arc<dyn ProfileStore>,
        monitor: Arc<dyn ConnectionMonitor>,
        names: Arc<dyn ManagedNameSource>,
        cancel: CancellationToken,
    ) -> Self {
        let interval = JitteredInterval::new(
            Duration::from_secs(settings.base_period_secs),
            settings.jitter_fraction,
        );

        let orchestrator = Self {
            settings,
            store,
            monitor,
            names,
            cancel,
            queue: Mutex::new(UpdateQueue::new()),
            connections: RwLock::new(ConnectionSnapshot::Known(HashSet::new())),
            managed: RwLock::new(BTreeMap::new()),
            durable_failures: Mutex::new(Vec::new()),
            apply_lock: Mutex::new(()),
            interval: Mutex::new(interval),
        };

        if let Err(e) = orchestrator.refresh_managed_profiles().await {
            warn!("Initial profile scan failed: {}", e);
        }
        orchestrator.refresh_connections().await;

        info!(
            "Orchestrator ready: {} managed profile(s) installed, base period {}s",
            orchestrator.managed.read().await.len(),
            orchestrator.settings.base_period_secs
        );
        orchestrator
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Queue a create/update for the profile the document describes
    ///
    /// Supersedes any pending change for the same name. Returns the name
    /// the update is queued under: the installed spelling for a managed
    /// profile, otherwise the document's.
    pub async fn add_profile_update(&self, document: &str) -> Result<String, DecodeError> {
        let profile = DocumentDecoder.decode(document)?;
        let name = self.installed_spelling(profile.name()).await;
        self.enqueue_update(&name, document.to_string()).await;
        Ok(name)
    }

    /// The name as the installed managed profile spells it, if there is one
    async fn installed_spelling(&self, name: &str) -> String {
        self.managed
            .read()
            .await
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    async fn enqueue_update(&self, name: &str, document: String) {
        let mut queue = self.queue.lock().await;
        match queue.enqueue_update(name, document) {
            Some(previous) if previous.is_removal() => {
                info!("Profile '{}': update supersedes pending removal", name)
            }
            Some(_) => info!("Profile '{}': replaced pending update", name),
            None => info!("Profile '{}': queued update", name),
        }
    }

    /// Queue removal of a profile, superseding any pending change
    pub async fn remove_profile(&self, name: &str) -> VpnsyncResult<()> {
        if name.trim().is_empty() {
            return Err(VpnsyncError::InvalidParameter("Profile name cannot be empty".to_string()));
        }
        let name = self.installed_spelling(name).await;
        let name = name.as_str();
        let mut queue = self.queue.lock().await;
        match queue.enqueue_removal(name) {
            Some(previous) if !previous.is_removal() => {
                info!("Profile '{}': removal supersedes pending update", name)
            }
            Some(_) => debug!("Profile '{}': removal already pending", name),
            None => info!("Profile '{}': queued removal", name),
        }
        Ok(())
    }

    pub async fn pending_updates(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn pending_state(&self, name: &str) -> PendingChange {
        self.queue.lock().await.state(name)
    }

    /// Managed profiles currently installed, sorted
    pub async fn get_managed_profile_list(&self) -> Vec<String> {
        self.managed.read().await.values().cloned().collect()
    }

    /// Rejected mutations, the durable failure signal
    pub async fn durable_failures(&self) -> Vec<ApplyFailure> {
        self.durable_failures.lock().await.clone()
    }

    /// Re-read the connection list from the monitor
    pub async fn refresh_connections(&self) {
        match self.monitor.list_active_connection_names().await {
            Ok(active) => {
                debug!("{} active connection(s)", active.len());
                *self.connections.write().await = ConnectionSnapshot::Known(active);
            }
            Err(e) if self.settings.strict_connection_check => {
                warn!("Connection query failed, deferring create/update: {}", e);
                *self.connections.write().await = ConnectionSnapshot::Unavailable;
            }
            Err(e) => {
                warn!("Connection query failed, reusing last known connections: {}", e);
                let mut snapshot = self.connections.write().await;
                if matches!(*snapshot, ConnectionSnapshot::Unavailable) {
                    *snapshot = ConnectionSnapshot::Known(HashSet::new());
                }
            }
        }
    }

    /// Re-scan the store for installed managed profiles
    pub async fn refresh_managed_profiles(&self) -> VpnsyncResult<()> {
        let installed = self.store.list().await?;
        self.record_scan(&installed).await;
        Ok(())
    }

    async fn record_scan(&self, installed: &[(String, String)]) {
        let configured = self.configured_names();
        let installed_names: HashMap<String, &String> = installed
            .iter()
            .map(|(name, _)| (name.to_lowercase(), name))
            .collect();

        // Configured names join on sight; names installed by this
        // orchestrator only leave once they are gone from the store
        let mut managed = self.managed.write().await;
        managed.retain(|key, _| installed_names.contains_key(key));
        for (key, name) in installed_names {
            if configured.contains(&key) {
                managed.entry(key).or_insert_with(|| name.clone());
            }
        }
    }

    fn configured_names(&self) -> HashSet<String> {
        self.names
            .managed_profile_names()
            .into_iter()
            .map(|n| n.to_lowercase())
            .collect()
    }

    /// Every name this orchestrator is responsible for, lowercased
    async fn managed_names(&self) -> HashSet<String> {
        let mut names = self.configured_names();
        names.extend(self.managed.read().await.keys().cloned());
        names.extend(
            self.queue
                .lock()
                .await
                .snapshot()
                .into_iter()
                .map(|e| e.profile_name.to_lowercase()),
        );
        names
    }

    /// Queued entries that are safe to apply now, removals first
    ///
    /// Refreshes the connection list first. A create/update is held back
    /// while its profile is connected, while the connection list is
    /// unavailable in strict mode, or while an unmanaged connection is up
    /// and that is not allowed. Removals are always available.
    pub async fn get_available_updates(&self) -> Vec<ManagedProfile> {
        self.refresh_connections().await;
        let (available, _) = self.partition_pending().await;
        available
    }

    async fn partition_pending(&self) -> (Vec<ManagedProfile>, Vec<ManagedProfile>) {
        let managed = self.managed_names().await;
        let connected: Option<HashSet<String>> = match &*self.connections.read().await {
            ConnectionSnapshot::Known(active) => Some(active.iter().map(|n| n.to_lowercase()).collect()),
            ConnectionSnapshot::Unavailable => None,
        };

        let unmanaged_blocking = match &connected {
            Some(active) if !self.settings.allow_updates_with_unmanaged_connections => {
                let unmanaged: Vec<&String> = active.iter().filter(|n| !managed.contains(*n)).collect();
                if !unmanaged.is_empty() {
                    debug!("Unmanaged connection(s) active: {:?}", unmanaged);
                }
                !unmanaged.is_empty()
            }
            _ => false,
        };

        let snapshot = self.queue.lock().await.snapshot();
        snapshot.into_iter().partition(|entry| {
            if entry.is_removal() {
                return true;
            }
            match &connected {
                None => false,
                Some(_) if unmanaged_blocking => false,
                Some(active) => !active.contains(&entry.profile_name.to_lowercase()),
            }
        })
    }

    async fn apply(&self, entry: &ManagedProfile) -> Result<(), ApplyError> {
        let work = async {
            match &entry.payload {
                Some(document) => self.store.create_or_update(&entry.profile_name, document).await,
                None => self.store.remove(&entry.profile_name).await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ApplyError::Cancelled),
            result = work => result,
        }
    }

    /// Run one reconciliation cycle
    ///
    /// Applies the available entries one at a time. A failed entry never
    /// stops the rest of the batch: transient failures stay queued,
    /// rejected ones are dropped and recorded as durable failures.
    /// Cancellation stops the cycle and leaves the current entry queued.
    pub async fn handle_profile_updates(&self) -> CycleReport {
        let _cycle = self.apply_lock.lock().await;
        let mut report = CycleReport::new();
        let cycle_id = report.cycle_id;

        self.refresh_connections().await;
        let (available, deferred) = self.partition_pending().await;
        report.deferred = deferred.into_iter().map(|e| e.profile_name).collect();

        if available.is_empty() && report.deferred.is_empty() {
            debug!("[cycle {}] Nothing to apply", cycle_id);
            return report;
        }
        info!(
            "[cycle {}] Applying {} update(s), {} deferred",
            cycle_id,
            available.len(),
            report.deferred.len()
        );
        for name in &report.deferred {
            info!("[cycle {}] Profile '{}': create/update deferred", cycle_id, name);
        }

        for entry in available {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let call = match entry.payload {
                Some(_) => StoreCall::CreateOrUpdate(entry.profile_name.clone()),
                None => StoreCall::Remove(entry.profile_name.clone()),
            };

            match self.apply(&entry).await {
                Ok(()) => {
                    self.queue.lock().await.complete(&entry);
                    self.record_applied(&entry).await;
                    info!("[cycle {}] Applied {}", cycle_id, entry);
                    report.applied.push(call);
                }
                Err(ApplyError::Cancelled) => {
                    warn!("[cycle {}] Cancelled while applying {}, left queued", cycle_id, entry);
                    report.cancelled = true;
                    break;
                }
                Err(e) if e.is_retryable() => {
                    warn!("[cycle {}] Failed to apply {}, will retry: {}", cycle_id, entry, e);
                    report.failed.push(ApplyFailure {
                        call,
                        error: e,
                        failed_at: Utc::now(),
                    });
                }
                Err(e) => {
                    error!("[cycle {}] Platform rejected {}, dropping it: {}", cycle_id, entry, e);
                    self.queue.lock().await.complete(&entry);
                    let failure = ApplyFailure {
                        call,
                        error: e,
                        failed_at: Utc::now(),
                    };
                    self.durable_failures.lock().await.push(failure.clone());
                    report.failed.push(failure);
                }
            }
        }

        info!(
            "[cycle {}] Done: {} applied, {} failed, {} deferred, {} pending{}",
            cycle_id,
            report.applied.len(),
            report.failed.len(),
            report.deferred.len(),
            self.pending_updates().await,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        report
    }

    async fn record_applied(&self, entry: &ManagedProfile) {
        let mut managed = self.managed.write().await;
        let key = entry.profile_name.to_lowercase();
        if entry.is_removal() {
            managed.remove(&key);
        } else {
            managed.entry(key).or_insert_with(|| entry.profile_name.clone());
        }
    }

    /// Queue whatever it takes to make the store match `documents`
    ///
    /// Each document is compared with the installed profile of the same
    /// name; only missing or differing profiles are queued, under the
    /// installed spelling of the name when one exists. Installed managed
    /// profiles with no document are queued for removal. A document that
    /// fails to decode is reported and skipped, and its profile is never
    /// removed; if its name cannot be read, no removals are queued at all.
    pub async fn sync_desired_profiles(&self, documents: &[String]) -> VpnsyncResult<SyncOutcome> {
        let installed = self.store.list().await?;
        self.record_scan(&installed).await;

        let mut live: HashMap<String, (String, Option<CanonicalProfile>)> = HashMap::new();
        for (name, raw) in installed {
            let decoded = match LiveStateDecoder.decode(&raw) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!("Installed profile '{}' could not be decoded: {}", name, e);
                    None
                }
            };
            live.insert(name.to_lowercase(), (name, decoded));
        }

        let mut outcome = SyncOutcome::default();
        let mut desired = HashSet::new();
        let mut unnamed_errors = false;

        for (index, document) in documents.iter().enumerate() {
            let profile = match DocumentDecoder.decode(document) {
                Ok(profile) => profile,
                Err(e) => {
                    warn!("Desired document #{} could not be decoded: {}", index, e);
                    // A broken document still claims its profile
                    match DocumentDecoder::profile_name(document) {
                        Some(name) => {
                            desired.insert(name.to_lowercase());
                        }
                        None => unnamed_errors = true,
                    }
                    outcome.errors.push((index, e));
                    continue;
                }
            };
            let key = profile.name().to_lowercase();
            desired.insert(key.clone());

            // Queue under the installed spelling
            let (name, current) = match live.get(&key) {
                Some((installed, current)) => (installed.clone(), current.as_ref()),
                None => (profile.name().to_string(), None),
            };
            match current {
                Some(current) if live_matches(&profile, current) => {
                    debug!("Profile '{}' is up to date", name);
                    outcome.unchanged.push(name);
                }
                _ => {
                    self.enqueue_update(&name, document.clone()).await;
                    outcome.enqueued.push(name);
                }
            }
        }

        if unnamed_errors {
            warn!("Skipping stale profile removal: a desired document has no readable name");
            self.log_sync(&outcome);
            return Ok(outcome);
        }

        let mut stale: Vec<String> = self.configured_names().into_iter().collect();
        stale.extend(self.managed.read().await.keys().cloned());
        stale.retain(|key| live.contains_key(key) && !desired.contains(key));
        stale.sort();
        stale.dedup();
        for key in &stale {
            if let Some((name, _)) = live.get(key) {
                self.remove_profile(name).await?;
                outcome.removals.push(name.clone());
            }
        }

        self.log_sync(&outcome);
        Ok(outcome)
    }

    fn log_sync(&self, outcome: &SyncOutcome) {
        info!(
            "Desired state sync: {} queued, {} unchanged, {} removal(s), {} error(s)",
            outcome.enqueued.len(),
            outcome.unchanged.len(),
            outcome.removals.len(),
            outcome.errors.len()
        );
    }

    /// Next jittered delay between cycles
    pub async fn next_delay(&self) -> Duration {
        self.interval.lock().await.next_delay()
    }

    /// Run cycles on the jittered interval until cancelled
    pub async fn run(&self) {
        info!("Reconciliation loop started");
        loop {
            let delay = self.next_delay().await;
            debug!("Next reconciliation cycle in {:?}", delay);

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            self.handle_profile_updates().await;
        }
        info!("Reconciliation loop stopped");
    }

    /// Stop the run loop and cancel any apply in flight
    pub fn shutdown(&self) {
        info!("Orchestrator shutting down");
        self.cancel.cancel();
    }
}
