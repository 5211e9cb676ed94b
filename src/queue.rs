//! Pending profile mutations
//!
//! At most one entry exists per profile name. Names are matched
//! case-insensitively, as the platform does. Writing an entry for a name
//! replaces the previous one and moves it to the back of the queue, so
//! queue order is the order of the latest writes.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::fmt;

/// Per-name state of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingChange {
    NoPendingChange,
    PendingRemoval,
    PendingCreateOrUpdate,
}

/// One queued mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedProfile {
    pub profile_name: String,
    /// Declarative document to install; `None` removes the profile
    pub payload: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    /// Monotonic write counter, used to detect supersession during an apply
    pub sequence: u64,
}

impl ManagedProfile {
    pub fn is_removal(&self) -> bool {
        self.payload.is_none()
    }

    pub fn change(&self) -> PendingChange {
        if self.is_removal() {
            PendingChange::PendingRemoval
        } else {
            PendingChange::PendingCreateOrUpdate
        }
    }
}

impl fmt::Display for ManagedProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = if self.is_removal() { "remove" } else { "create/update" };
        write!(f, "{} '{}' (#{})", action, self.profile_name, self.sequence)
    }
}

#[derive(Debug, Default)]
pub struct UpdateQueue {
    entries: IndexMap<String, ManagedProfile>,
    next_sequence: u64,
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: &str, payload: Option<String>) -> Option<ManagedProfile> {
        self.next_sequence += 1;
        let entry = ManagedProfile {
            profile_name: name.to_string(),
            payload,
            enqueued_at: Utc::now(),
            sequence: self.next_sequence,
        };
        let k = key(name);
        let previous = self.entries.shift_remove(&k);
        self.entries.insert(k, entry);
        previous
    }

    /// Queue a create/update, returning the entry it supersedes
    pub fn enqueue_update(&mut self, name: &str, payload: String) -> Option<ManagedProfile> {
        self.push(name, Some(payload))
    }

    /// Queue a removal, returning the entry it supersedes
    pub fn enqueue_removal(&mut self, name: &str) -> Option<ManagedProfile> {
        self.push(name, None)
    }

    pub fn state(&self, name: &str) -> PendingChange {
        self.entries
            .get(&key(name))
            .map(ManagedProfile::change)
            .unwrap_or(PendingChange::NoPendingChange)
    }

    pub fn get(&self, name: &str) -> Option<&ManagedProfile> {
        self.entries.get(&key(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry, removals first, each group in write order
    pub fn snapshot(&self) -> Vec<ManagedProfile> {
        let removals = self.entries.values().filter(|e| e.is_removal());
        let updates = self.entries.values().filter(|e| !e.is_removal());
        removals.chain(updates).cloned().collect()
    }

    /// Drop `entry` once it has been handled
    ///
    /// Nothing is dropped if the name was rewritten after the snapshot was
    /// taken; the newer entry stays for the next cycle. Returns whether the
    /// entry was dropped.
    pub fn complete(&mut self, entry: &ManagedProfile) -> bool {
        let k = key(&entry.profile_name);
        match self.entries.get(&k) {
            Some(current) if current.sequence == entry.sequence => {
                self.entries.shift_remove(&k);
                true
            }
            _ => false,
        }
    }
}
