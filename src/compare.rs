//! Semantic comparison of canonical profiles
//!
//! [`diff`] walks every field of two profiles and reports each difference;
//! [`equals`] is defined as "no differences", so the two can never disagree.
//! Every rule is applied the same way to both sides, which keeps comparison
//! symmetric.
//!
//! Equality rules:
//! - lists that the platform treats as sets (servers, suffixes, routes,
//!   filters, domain entries) compare as sets
//! - route metric is not part of route identity
//! - the EAP blob compares by containment of its normalized leaves: one
//!   side may carry extra platform-filled entries
//! - an absent cryptography suite differs from any present one, even one
//!   holding only defaults
//! - unset optional scalars differ from zero

use crate::profile::{CanonicalProfile, EapConfiguration};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// One differing field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    /// Slash separated location of the field, e.g. `NativeProfile/Servers`
    pub path: String,
    pub description: String,
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.description)
    }
}

#[derive(Default)]
struct Differ {
    diffs: Vec<FieldDiff>,
}

impl Differ {
    fn push(&mut self, path: &str, description: String) {
        self.diffs.push(FieldDiff {
            path: path.to_string(),
            description,
        });
    }

    fn value<T: PartialEq + fmt::Debug>(&mut self, path: &str, left: T, right: T) {
        if left != right {
            self.push(path, format!("left {:?}, right {:?}", left, right));
        }
    }

    fn optional(&mut self, path: &str, left: Option<u32>, right: Option<u32>) {
        let show = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_else(|| "unset".to_string());
        if left != right {
            self.push(path, format!("left {}, right {}", show(left), show(right)));
        }
    }

    fn set<T: Ord + fmt::Display>(&mut self, path: &str, left: &BTreeSet<T>, right: &BTreeSet<T>) {
        for item in left.difference(right) {
            self.push(path, format!("{} only in left", item));
        }
        for item in right.difference(left) {
            self.push(path, format!("{} only in right", item));
        }
    }
}

/// Semantic equality of two profiles
pub fn equals(left: &CanonicalProfile, right: &CanonicalProfile) -> bool {
    diff(left, right).is_empty()
}

/// Every differing field, in a stable order; empty iff [`equals`]
pub fn diff(left: &CanonicalProfile, right: &CanonicalProfile) -> Vec<FieldDiff> {
    let mut d = Differ::default();

    if !left.name().eq_ignore_ascii_case(right.name()) {
        d.push("ProfileName", format!("left '{}', right '{}'", left.name(), right.name()));
    }

    d.set("NativeProfile/Servers", left.servers(), right.servers());
    d.value("NativeProfile/RoutingPolicyType", left.tunnel_type(), right.tunnel_type());
    d.value("NativeProfile/NativeProtocolType", left.protocol(), right.protocol());
    if left.strategy() != right.strategy() {
        d.push(
            "NativeProfile/Strategy",
            format!("left {}, right {}", left.strategy(), right.strategy()),
        );
    }

    let (la, ra) = (left.authentication(), right.authentication());
    d.value("NativeProfile/Authentication/UserMethod", la.user_method, ra.user_method);
    d.value("NativeProfile/Authentication/MachineMethod", la.machine_method, ra.machine_method);
    diff_eap(&mut d, la.eap_configuration.as_ref(), ra.eap_configuration.as_ref());

    match (left.cryptography_suite(), right.cryptography_suite()) {
        (None, None) => {}
        (Some(_), None) => d.push("NativeProfile/CryptographySuite", "custom cryptography only in left".into()),
        (None, Some(_)) => d.push("NativeProfile/CryptographySuite", "custom cryptography only in right".into()),
        (Some(l), Some(r)) => {
            let base = "NativeProfile/CryptographySuite";
            d.value(&format!("{}/AuthenticationTransformConstants", base), &l.auth_transform, &r.auth_transform);
            d.value(&format!("{}/CipherTransformConstants", base), &l.cipher_transform, &r.cipher_transform);
            d.value(&format!("{}/PfsGroup", base), &l.pfs_group, &r.pfs_group);
            d.value(&format!("{}/DHGroup", base), &l.dh_group, &r.dh_group);
            d.value(&format!("{}/IntegrityCheckMethod", base), &l.integrity_method, &r.integrity_method);
            d.value(&format!("{}/EncryptionMethod", base), &l.encryption_method, &r.encryption_method);
        }
    }

    d.set("Route", &left.route_keys(), &right.route_keys());
    diff_domain_info(&mut d, left, right);
    d.set("DnsSuffix", left.dns_suffixes(), right.dns_suffixes());
    d.set(
        "TrustedNetworkDetection",
        left.trusted_network_suffixes(),
        right.trusted_network_suffixes(),
    );
    d.set("TrafficFilter", left.traffic_filters(), right.traffic_filters());

    for ((name, l), (_, r)) in left.flags().entries().into_iter().zip(right.flags().entries()) {
        d.value(name, l, r);
    }

    match (left.proxy(), right.proxy()) {
        (None, None) => {}
        (Some(_), None) => d.push("Proxy", "proxy only in left".into()),
        (None, Some(_)) => d.push("Proxy", "proxy only in right".into()),
        (Some(l), Some(r)) => {
            d.value("Proxy/Type", l.kind, r.kind);
            d.value("Proxy/Value", &l.value, &r.value);
            d.value("Proxy/BypassForLocal", l.bypass_for_local, r.bypass_for_local);
            d.set("Proxy/ExcludeList", &l.exclude_list, &r.exclude_list);
        }
    }

    d.optional("Mtu", left.mtu(), right.mtu());
    d.optional("IPv4InterfaceMetric", left.interface_metric(), right.interface_metric());
    d.optional("NetworkOutageTime", left.network_outage_time(), right.network_outage_time());

    d.diffs
}

fn diff_eap(d: &mut Differ, left: Option<&EapConfiguration>, right: Option<&EapConfiguration>) {
    const PATH: &str = "NativeProfile/Authentication/Eap/Configuration";
    match (left, right) {
        (None, None) => {}
        (Some(_), None) => d.push(PATH, "EAP configuration only in left".into()),
        (None, Some(_)) => d.push(PATH, "EAP configuration only in right".into()),
        (Some(l), Some(r)) => {
            let (l, r) = (l.leaves(), r.leaves());
            if l.is_subset(r) || r.is_subset(l) {
                return;
            }
            for leaf in l.difference(r) {
                d.push(PATH, format!("{} only in left", leaf));
            }
            for leaf in r.difference(l) {
                d.push(PATH, format!("{} only in right", leaf));
            }
        }
    }
}

fn diff_domain_info(d: &mut Differ, left: &CanonicalProfile, right: &CanonicalProfile) {
    let left_suffixes: BTreeSet<&str> = left.domain_name_info().map(|i| i.suffix.as_str()).collect();
    let right_suffixes: BTreeSet<&str> = right.domain_name_info().map(|i| i.suffix.as_str()).collect();
    d.set("DomainNameInformation", &left_suffixes, &right_suffixes);

    for suffix in left_suffixes.intersection(&right_suffixes) {
        let (Some(l), Some(r)) = (left.domain_name_entry(suffix), right.domain_name_entry(suffix)) else {
            continue;
        };
        let base = format!("DomainNameInformation[{}]", suffix);
        d.set(&format!("{}/DnsServers", base), &l.dns_servers, &r.dns_servers);
        d.set(&format!("{}/WebProxyServers", base), &l.web_proxy_servers, &r.web_proxy_servers);
        d.value(&format!("{}/AutoTrigger", base), l.auto_trigger, r.auto_trigger);
    }
}

/// Compare a desired profile with the one reported by the live system
///
/// The live query misreports the device tunnel flag, so the desired value
/// is substituted into the live profile before comparing. When the
/// substitution would produce an impossible profile the live value stands.
pub fn compare_live(desired: &CanonicalProfile, live: &CanonicalProfile) -> Vec<FieldDiff> {
    let wanted = desired.flags().device_tunnel;
    if live.flags().device_tunnel != wanted {
        if let Some(adjusted) = live.with_device_tunnel(wanted) {
            debug!(
                "Profile '{}': overriding live DeviceTunnel={} before comparison",
                live.name(),
                live.flags().device_tunnel
            );
            return diff(desired, &adjusted);
        }
    }
    diff(desired, live)
}

/// Whether the live profile already matches the desired one
pub fn live_matches(desired: &CanonicalProfile, live: &CanonicalProfile) -> bool {
    compare_live(desired, live).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{CryptographySuite, ProfileFlags, ProfileParts, Route};

    fn profile(parts: ProfileParts) -> CanonicalProfile {
        CanonicalProfile::from_parts(parts).unwrap()
    }

    fn named(name: &str) -> ProfileParts {
        ProfileParts {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_reflexive() {
        let a = profile(named("Contoso"));
        assert!(equals(&a, &a));
        assert!(diff(&a, &a).is_empty());
    }

    #[test]
    fn test_name_is_case_insensitive() {
        assert!(equals(&profile(named("Contoso VPN")), &profile(named("contoso vpn"))));
    }

    #[test]
    fn test_reports_every_field() {
        let a = profile(ProfileParts {
            mtu: Some(1400),
            flags: ProfileFlags {
                always_on: true,
                ..Default::default()
            },
            ..named("Contoso")
        });
        let b = profile(named("Contoso"));
        let diffs = diff(&a, &b);
        let paths: Vec<&str> = diffs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["AlwaysOn", "Mtu"]);
        assert_eq!(diff(&b, &a).len(), 2);
    }

    #[test]
    fn test_unset_differs_from_zero() {
        let a = profile(ProfileParts {
            network_outage_time: Some(0),
            ..named("Contoso")
        });
        let b = profile(named("Contoso"));
        assert!(!equals(&a, &b));
        assert_eq!(diff(&a, &b)[0].description, "left 0, right unset");
    }

    #[test]
    fn test_absent_crypto_differs_from_default_crypto() {
        let a = profile(ProfileParts {
            cryptography_suite: Some(CryptographySuite::default()),
            ..named("Contoso")
        });
        let b = profile(named("Contoso"));
        assert!(!equals(&a, &b));
        assert!(!equals(&b, &a));
    }

    #[test]
    fn test_route_metric_ignored() {
        let route = |metric| Route {
            address: "10.0.0.0".into(),
            prefix_size: 8,
            exclusion: false,
            metric,
        };
        let a = profile(ProfileParts {
            routes: vec![route(Some(3))],
            ..named("Contoso")
        });
        let b = profile(ProfileParts {
            routes: vec![route(None)],
            ..named("Contoso")
        });
        assert!(equals(&a, &b));
    }

    #[test]
    fn test_compare_live_overrides_device_tunnel() {
        let desired = profile(ProfileParts {
            flags: ProfileFlags {
                device_tunnel: true,
                ..Default::default()
            },
            ..named("Device")
        });
        let live = profile(named("Device"));
        assert!(!equals(&desired, &live));
        assert!(live_matches(&desired, &live));
    }
}
