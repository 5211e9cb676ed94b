//! Text normalization shared by the decoders
//!
//! Both representations carry the same values with different formatting
//! noise; everything here maps that noise onto one canonical spelling.

use crate::profile::{AuthMethod, FilterDirection, Protocol, TunnelType};
use std::collections::BTreeSet;
use std::net::IpAddr;

/// Invisible characters that show up when thumbprints are copied out of
/// certificate dialogs
const INVISIBLE: [char; 4] = ['\u{200b}', '\u{200e}', '\u{200f}', '\u{feff}'];

fn is_noise(c: char) -> bool {
    c.is_control() || INVISIBLE.contains(&c)
}

/// Trim, drop control characters and collapse inner whitespace runs to a
/// single space
pub fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for c in raw.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if is_noise(c) {
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// Split a joined list into a set of cleaned entries
///
/// Empty entries vanish and duplicates collapse.
pub fn split_list(raw: &str, separators: &[char]) -> BTreeSet<String> {
    raw.split(|c| separators.contains(&c))
        .map(clean_text)
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Split a case-insensitive list (hosts, suffixes, addresses)
pub fn split_folded(raw: &str, separators: &[char]) -> BTreeSet<String> {
    split_list(raw, separators)
        .into_iter()
        .map(|entry| entry.to_lowercase())
        .collect()
}

/// Server and DNS lists accept either separator
pub fn split_hosts(raw: &str) -> BTreeSet<String> {
    split_folded(raw, &[';', ','])
}

/// Domain suffix, compared case-insensitively; a leading `.` is kept
pub fn normalize_suffix(raw: &str) -> String {
    clean_text(raw).to_lowercase()
}

/// Canonical spelling of an address: parsed IPs print in their standard
/// form, anything else folds to lower case
pub fn normalize_address(raw: &str) -> String {
    let cleaned = clean_text(raw);
    match cleaned.parse::<IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => cleaned.to_lowercase(),
    }
}

/// Strip whitespace, control and invisible characters and upper-case
///
/// Idempotent: normalizing an already normalized value is a no-op.
pub fn normalize_thumbprint(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !is_noise(*c))
        .flat_map(char::to_uppercase)
        .collect()
}

/// Whether a value is a SHA-1 or SHA-256 hex digest once normalized
pub fn looks_like_thumbprint(raw: &str) -> bool {
    let normalized = normalize_thumbprint(raw);
    matches!(normalized.len(), 40 | 64) && normalized.chars().all(|c| c.is_ascii_hexdigit())
}

/// Identifier compared case-insensitively (crypto transforms, app ids)
pub fn normalize_identifier(raw: &str) -> String {
    clean_text(raw).to_uppercase()
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match clean_text(raw).to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

pub fn parse_u32(raw: &str) -> Option<u32> {
    clean_text(raw).parse().ok()
}

pub fn parse_protocol(raw: &str) -> Option<Protocol> {
    match clean_text(raw).to_ascii_lowercase().as_str() {
        "automatic" | "auto" => Some(Protocol::Automatic),
        "ikev2" => Some(Protocol::Ikev2),
        "sstp" => Some(Protocol::Sstp),
        "pptp" => Some(Protocol::Pptp),
        "l2tp" => Some(Protocol::L2tp),
        _ => None,
    }
}

pub fn parse_tunnel_type(raw: &str) -> Option<TunnelType> {
    match clean_text(raw).to_ascii_lowercase().as_str() {
        "splittunnel" => Some(TunnelType::SplitTunnel),
        "forcetunnel" => Some(TunnelType::ForceTunnel),
        _ => None,
    }
}

pub fn parse_auth_method(raw: &str) -> Option<AuthMethod> {
    match clean_text(raw).to_ascii_lowercase().as_str() {
        "" | "none" => Some(AuthMethod::None),
        "eap" => Some(AuthMethod::Eap),
        "mschapv2" => Some(AuthMethod::Mschapv2),
        "certificate" => Some(AuthMethod::Certificate),
        _ => None,
    }
}

pub fn parse_direction(raw: &str) -> Option<FilterDirection> {
    match clean_text(raw).to_ascii_lowercase().as_str() {
        "outbound" => Some(FilterDirection::Outbound),
        "inbound" => Some(FilterDirection::Inbound),
        _ => None,
    }
}

/// Traffic filter protocol: a number, or a well known name; empty means any
pub fn parse_filter_protocol(raw: &str) -> Option<u8> {
    let cleaned = clean_text(raw).to_ascii_lowercase();
    match cleaned.as_str() {
        "" | "any" => None,
        "tcp" => Some(6),
        "udp" => Some(17),
        "icmp" => Some(1),
        other => other.parse().ok(),
    }
}
