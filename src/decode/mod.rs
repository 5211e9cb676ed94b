//! Profile decoders
//!
//! Two independent translators turn the external representations of a VPN
//! profile into a [`CanonicalProfile`]:
//!
//! ```text
//!  declarative document (XML) ──► DocumentDecoder ──┐
//!                                                   ├──► CanonicalProfile
//!  live-state query (JSON)    ──► LiveStateDecoder ─┘
//! ```
//!
//! Decoders report structural problems only. Business rules (a profile
//! without routes, an unreachable server) are validated elsewhere.

pub mod document;
pub mod live;
pub mod normalize;
pub mod xml;

pub use document::DocumentDecoder;
pub use live::{LiveProfile, LiveStateDecoder};

use crate::error::DecodeError;
use crate::profile::CanonicalProfile;

/// Capability shared by every source representation
pub trait ProfileDecoder: Send + Sync {
    /// Short name of the representation, used in log lines
    fn name(&self) -> &str;

    /// Decode one raw profile
    fn decode(&self, raw: &str) -> Result<CanonicalProfile, DecodeError>;
}

/// Pick a decoder by sniffing the first meaningful character
///
/// Used by tooling that accepts either representation from a file.
pub fn decoder_for(raw: &str) -> Box<dyn ProfileDecoder> {
    let first = raw.trim_start_matches('\u{feff}').trim_start().chars().next();
    match first {
        Some('{') => Box::new(LiveStateDecoder),
        _ => Box::new(DocumentDecoder),
    }
}
