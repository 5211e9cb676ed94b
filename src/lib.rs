//! vpnsync - VPN Profile Reconciliation Library
//!
//! Keeps the VPN profiles installed on an endpoint in line with the profiles
//! it is supposed to have:
//! - Canonical profile model independent of source representation
//! - Decoders for declarative XML documents and live-state JSON
//! - Semantic comparison with a complete field-level diff
//! - Update queue and orchestrator that never disrupts a connected profile

pub mod error;
pub mod validation;
pub mod profile;
pub mod decode;
pub mod compare;
pub mod store;
pub mod queue;
pub mod schedule;
pub mod orchestrator;
pub mod config;

// Re-export commonly used types
pub use error::{ApplyError, DecodeError, VpnsyncError, VpnsyncResult};
pub use profile::{CanonicalProfile, ProfileParts};
pub use decode::{decoder_for, DocumentDecoder, LiveProfile, LiveStateDecoder, ProfileDecoder};
pub use compare::{compare_live, diff, equals, live_matches, FieldDiff};
pub use store::{
    ConnectionMonitor, DirectoryProfileStore, FaultInjectingStore, FaultTarget,
    FileConnectionMonitor, ManagedNameSource, MemoryConnectionMonitor, MemoryProfileStore,
    ProfileKind, ProfileStore, StoreCall,
};
pub use queue::{ManagedProfile, PendingChange, UpdateQueue};
pub use schedule::JitteredInterval;
pub use orchestrator::{ApplyFailure, CycleReport, Orchestrator, OrchestratorSettings, SyncOutcome};
pub use config::VpnsyncConfig;
