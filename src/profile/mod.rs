//! Canonical VPN profile model
//!
//! A representation-independent description of one VPN profile. Values are
//! built once from [`ProfileParts`] by a decoder and never mutated afterwards;
//! any change produces a new [`CanonicalProfile`].
//!
//! The model deliberately carries no `PartialEq`: semantic equality lives in
//! [`crate::compare`], where formatting noise and representation quirks are
//! accounted for.

mod types;

pub use types::{
    AuthMethod, Authentication, CryptographySuite, DomainNameInfo, EapConfiguration,
    FilterDirection, ProfileFlags, Protocol, ProxyKind, ProxySettings, Route, RouteKey,
    StrategyPreference, TrafficFilter, TunnelType,
};

use crate::error::DecodeError;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Loose collection of decoded fields, turned into a [`CanonicalProfile`]
/// by [`CanonicalProfile::from_parts`]
#[derive(Debug, Clone, Default)]
pub struct ProfileParts {
    pub name: String,
    pub servers: BTreeSet<String>,
    pub tunnel_type: TunnelType,
    pub protocol: Protocol,
    pub strategy: Option<StrategyPreference>,
    pub authentication: Authentication,
    pub cryptography_suite: Option<CryptographySuite>,
    pub routes: Vec<Route>,
    pub domain_name_info: Vec<DomainNameInfo>,
    pub dns_suffixes: BTreeSet<String>,
    pub trusted_network_suffixes: BTreeSet<String>,
    pub traffic_filters: Vec<TrafficFilter>,
    pub flags: ProfileFlags,
    pub proxy: Option<ProxySettings>,
    pub mtu: Option<u32>,
    pub interface_metric: Option<u32>,
    pub network_outage_time: Option<u32>,
}

/// Immutable, normalized VPN profile
#[derive(Debug, Clone)]
pub struct CanonicalProfile {
    name: String,
    servers: BTreeSet<String>,
    tunnel_type: TunnelType,
    protocol: Protocol,
    strategy: StrategyPreference,
    authentication: Authentication,
    cryptography_suite: Option<CryptographySuite>,
    routes: BTreeMap<RouteKey, Route>,
    domain_name_info: BTreeMap<String, DomainNameInfo>,
    dns_suffixes: BTreeSet<String>,
    trusted_network_suffixes: BTreeSet<String>,
    traffic_filters: BTreeSet<TrafficFilter>,
    flags: ProfileFlags,
    proxy: Option<ProxySettings>,
    mtu: Option<u32>,
    interface_metric: Option<u32>,
    network_outage_time: Option<u32>,
}

impl CanonicalProfile {
    /// Build a profile, enforcing the model invariants
    ///
    /// Routes collapse on their identity (metric excluded); the first metric
    /// seen for a route wins. Domain entries collapse on their suffix, keeping
    /// the first. A device tunnel never carries a user authentication method.
    pub fn from_parts(parts: ProfileParts) -> Result<Self, DecodeError> {
        let name = parts.name.trim().to_string();
        if name.is_empty() {
            return Err(DecodeError::MissingName);
        }

        let mut routes = BTreeMap::new();
        for route in parts.routes {
            let metric = route.metric;
            routes
                .entry(route.key())
                .and_modify(|existing: &mut Route| {
                    if existing.metric.is_none() {
                        existing.metric = metric;
                    }
                })
                .or_insert(route);
        }

        let mut domain_name_info = BTreeMap::new();
        for info in parts.domain_name_info {
            if domain_name_info.contains_key(&info.suffix) {
                warn!("Profile '{}': duplicate domain name entry '{}' ignored", name, info.suffix);
                continue;
            }
            domain_name_info.insert(info.suffix.clone(), info);
        }

        let mut authentication = parts.authentication;
        if parts.flags.device_tunnel && authentication.user_method != AuthMethod::None {
            warn!(
                "Profile '{}': device tunnel ignores user authentication method {:?}",
                name, authentication.user_method
            );
            authentication.user_method = AuthMethod::None;
        }

        let strategy = parts
            .strategy
            .unwrap_or_else(|| StrategyPreference::derive(parts.protocol, None, &[]));

        Ok(Self {
            name,
            servers: parts.servers,
            tunnel_type: parts.tunnel_type,
            protocol: parts.protocol,
            strategy,
            authentication,
            cryptography_suite: parts.cryptography_suite,
            routes,
            domain_name_info,
            dns_suffixes: parts.dns_suffixes,
            trusted_network_suffixes: parts.trusted_network_suffixes,
            traffic_filters: parts.traffic_filters.into_iter().collect(),
            flags: parts.flags,
            proxy: parts.proxy,
            mtu: parts.mtu,
            interface_metric: parts.interface_metric,
            network_outage_time: parts.network_outage_time,
        })
    }

    /// Copy of this profile with the device tunnel flag replaced
    ///
    /// Returns `None` when the result would be a device tunnel that carries a
    /// user authentication method.
    pub fn with_device_tunnel(&self, device_tunnel: bool) -> Option<Self> {
        if device_tunnel && self.authentication.user_method != AuthMethod::None {
            return None;
        }
        let mut copy = self.clone();
        copy.flags.device_tunnel = device_tunnel;
        Some(copy)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn servers(&self) -> &BTreeSet<String> {
        &self.servers
    }

    pub fn tunnel_type(&self) -> TunnelType {
        self.tunnel_type
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn strategy(&self) -> &StrategyPreference {
        &self.strategy
    }

    pub fn authentication(&self) -> &Authentication {
        &self.authentication
    }

    /// Present only when custom cryptography is configured
    pub fn cryptography_suite(&self) -> Option<&CryptographySuite> {
        self.cryptography_suite.as_ref()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn route_keys(&self) -> BTreeSet<&RouteKey> {
        self.routes.keys().collect()
    }

    pub fn domain_name_info(&self) -> impl Iterator<Item = &DomainNameInfo> {
        self.domain_name_info.values()
    }

    pub fn domain_name_entry(&self, suffix: &str) -> Option<&DomainNameInfo> {
        self.domain_name_info.get(suffix)
    }

    pub fn dns_suffixes(&self) -> &BTreeSet<String> {
        &self.dns_suffixes
    }

    pub fn trusted_network_suffixes(&self) -> &BTreeSet<String> {
        &self.trusted_network_suffixes
    }

    pub fn traffic_filters(&self) -> &BTreeSet<TrafficFilter> {
        &self.traffic_filters
    }

    pub fn flags(&self) -> &ProfileFlags {
        &self.flags
    }

    pub fn proxy(&self) -> Option<&ProxySettings> {
        self.proxy.as_ref()
    }

    pub fn mtu(&self) -> Option<u32> {
        self.mtu
    }

    pub fn interface_metric(&self) -> Option<u32> {
        self.interface_metric
    }

    pub fn network_outage_time(&self) -> Option<u32> {
        self.network_outage_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(address: &str, prefix: u8, metric: Option<u32>) -> Route {
        Route {
            address: address.to_string(),
            prefix_size: prefix,
            exclusion: false,
            metric,
        }
    }

    #[test]
    fn test_empty_name_rejected() {
        let parts = ProfileParts {
            name: "   ".to_string(),
            ..Default::default()
        };
        assert_eq!(CanonicalProfile::from_parts(parts).unwrap_err(), DecodeError::MissingName);
    }

    #[test]
    fn test_routes_collapse_on_identity() {
        let parts = ProfileParts {
            name: "Contoso".to_string(),
            routes: vec![
                route("10.0.0.0", 8, None),
                route("10.0.0.0", 8, Some(5)),
                route("192.168.0.0", 16, None),
            ],
            ..Default::default()
        };
        let profile = CanonicalProfile::from_parts(parts).unwrap();
        let routes: Vec<&Route> = profile.routes().collect();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].metric, Some(5));
    }

    #[test]
    fn test_device_tunnel_drops_user_method() {
        let parts = ProfileParts {
            name: "Device".to_string(),
            authentication: Authentication {
                user_method: AuthMethod::Eap,
                machine_method: AuthMethod::Certificate,
                eap_configuration: None,
            },
            flags: ProfileFlags {
                device_tunnel: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let profile = CanonicalProfile::from_parts(parts).unwrap();
        assert_eq!(profile.authentication().user_method, AuthMethod::None);
        assert_eq!(profile.authentication().machine_method, AuthMethod::Certificate);
    }

    #[test]
    fn test_with_device_tunnel_respects_invariant() {
        let parts = ProfileParts {
            name: "User".to_string(),
            authentication: Authentication {
                user_method: AuthMethod::Mschapv2,
                ..Default::default()
            },
            ..Default::default()
        };
        let profile = CanonicalProfile::from_parts(parts).unwrap();
        assert!(profile.with_device_tunnel(true).is_none());
        assert!(profile.with_device_tunnel(false).is_some());
    }

    #[test]
    fn test_default_strategy_follows_protocol() {
        let parts = ProfileParts {
            name: "Sstp".to_string(),
            protocol: Protocol::Sstp,
            ..Default::default()
        };
        let profile = CanonicalProfile::from_parts(parts).unwrap();
        assert_eq!(profile.strategy(), &StrategyPreference::Only(Protocol::Sstp));
    }
}
