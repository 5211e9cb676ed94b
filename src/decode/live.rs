//! Live-state decoder
//!
//! The platform reports an installed profile as a flat JSON property bag:
//! authentication methods sit directly on `NativeProfile`, repeated blocks
//! are `*List` arrays and the EAP blob is a string. [`LiveProfile`] mirrors
//! that shape; [`LiveStateDecoder`] turns it into a [`CanonicalProfile`] and
//! [`LiveProfile::from_canonical`] renders a profile back into it.
//!
//! The device tunnel flag is taken literally from the query even though the
//! platform is known to misreport it; see [`crate::compare::compare_live`].

use super::normalize::*;
use super::xml::eap_leaves;
use super::ProfileDecoder;
use crate::error::DecodeError;
use crate::profile::{
    Authentication, CanonicalProfile, CryptographySuite, DomainNameInfo, EapConfiguration,
    ProfileFlags, ProfileParts, Protocol, ProxyKind, ProxySettings, Route, StrategyPreference,
    TrafficFilter,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Strategy code the platform uses for an explicit protocol list
const STRATEGY_PROTOCOL_LIST: u32 = 14;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LiveProfile {
    pub profile_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub always_on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_tunnel: Option<bool>,
    #[serde(rename = "RegisterDNS", skip_serializing_if = "Option::is_none")]
    pub register_dns: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_credentials: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_advanced_options_edit_button: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_disconnect_button: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_ras_credentials: Option<bool>,
    #[serde(rename = "RequireVpnClientAppUI", skip_serializing_if = "Option::is_none")]
    pub require_vpn_client_app_ui: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_network_detection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(rename = "IPv4InterfaceMetric", skip_serializing_if = "Option::is_none")]
    pub ipv4_interface_metric: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_outage_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_profile: Option<LiveNativeProfile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub route_list: Vec<LiveRoute>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domain_name_information_list: Vec<LiveDomainNameInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub traffic_filter_list: Vec<LiveTrafficFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<LiveProxy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LiveNativeProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_policy_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_protocol_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpn_strategy: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub protocol_list: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eap_configuration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cryptography_suite: Option<LiveCryptographySuite>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_class_based_default_route: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_crypto_binding: Option<bool>,
    #[serde(rename = "DisableIKEv2Fragmentation", skip_serializing_if = "Option::is_none")]
    pub disable_ikev2_fragmentation: Option<bool>,
    #[serde(rename = "PlumbIKEv2TSAsRoutes", skip_serializing_if = "Option::is_none")]
    pub plumb_ikev2_ts_as_routes: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LiveCryptographySuite {
    pub authentication_transform_constants: String,
    pub cipher_transform_constants: String,
    pub pfs_group: String,
    #[serde(rename = "DHGroup")]
    pub dh_group: String,
    pub integrity_check_method: String,
    pub encryption_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LiveRoute {
    pub address: String,
    pub prefix_size: u8,
    #[serde(default)]
    pub exclusion_route: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LiveDomainNameInfo {
    pub domain_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_servers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_proxy_servers: Option<String>,
    #[serde(default)]
    pub auto_trigger: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LiveTrafficFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_address_ranges: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_address_ranges: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_port_ranges: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_port_ranges: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_policy_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LiveProxy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_config_url: Option<String>,
    pub bypass_for_local: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_list: Option<String>,
}

/// Decoder for the JSON live-state representation
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveStateDecoder;

impl ProfileDecoder for LiveStateDecoder {
    fn name(&self) -> &str {
        "live"
    }

    fn decode(&self, raw: &str) -> Result<CanonicalProfile, DecodeError> {
        let live: LiveProfile = serde_json::from_str(raw)
            .map_err(|e| DecodeError::Malformed(format!("Invalid live-state JSON: {}", e)))?;
        live.into_canonical()
    }
}

fn unknown(field: &str, raw: &str) -> DecodeError {
    DecodeError::Malformed(format!("{} has unknown value '{}'", field, raw))
}

fn parse_opt<T>(
    field: &str,
    raw: Option<&str>,
    parser: fn(&str) -> Option<T>,
) -> Result<Option<T>, DecodeError> {
    match raw.filter(|r| !clean_text(r).is_empty()) {
        None => Ok(None),
        Some(r) => parser(r).map(Some).ok_or_else(|| unknown(field, r)),
    }
}

fn joined(set: &BTreeSet<String>, separator: &str) -> Option<String> {
    if set.is_empty() {
        None
    } else {
        Some(set.iter().map(String::as_str).collect::<Vec<_>>().join(separator))
    }
}

impl LiveProfile {
    /// Normalize the reported property bag into a canonical profile
    pub fn into_canonical(self) -> Result<CanonicalProfile, DecodeError> {
        let defaults = ProfileFlags::default();
        let native = self.native_profile.unwrap_or_default();

        let list = native
            .protocol_list
            .iter()
            .map(|raw| parse_protocol(raw).ok_or_else(|| unknown("ProtocolList", raw)))
            .collect::<Result<Vec<Protocol>, DecodeError>>()?;
        let protocol = match native.native_protocol_type.as_deref() {
            Some(raw) if clean_text(raw).eq_ignore_ascii_case("ProtocolList") => Protocol::Automatic,
            other => parse_opt("NativeProtocolType", other, parse_protocol)?.unwrap_or_default(),
        };

        let eap_configuration = match native.eap_configuration.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(EapConfiguration::new(raw.to_string(), eap_leaves(raw)?)),
            _ => None,
        };

        let mut traffic_filters = Vec::with_capacity(self.traffic_filter_list.len());
        for filter in self.traffic_filter_list {
            traffic_filters.push(filter.into_canonical()?);
        }

        let proxy = self.proxy.and_then(|proxy| {
            let (kind, value) = match (proxy.server, proxy.auto_config_url) {
                (Some(server), _) if !clean_text(&server).is_empty() => {
                    (ProxyKind::Manual, clean_text(&server).to_lowercase())
                }
                (_, Some(url)) if !clean_text(&url).is_empty() => (ProxyKind::Pac, clean_text(&url)),
                _ => return None,
            };
            Some(ProxySettings {
                kind,
                value,
                bypass_for_local: proxy.bypass_for_local,
                exclude_list: proxy
                    .exclude_list
                    .as_deref()
                    .map(|l| split_folded(l, &[';', ',']))
                    .unwrap_or_default(),
            })
        });

        let parts = ProfileParts {
            name: self.profile_name.as_deref().map(clean_text).unwrap_or_default(),
            servers: native.servers.as_deref().map(split_hosts).unwrap_or_default(),
            tunnel_type: parse_opt("RoutingPolicyType", native.routing_policy_type.as_deref(), parse_tunnel_type)?
                .unwrap_or_default(),
            protocol,
            strategy: Some(StrategyPreference::derive(protocol, native.vpn_strategy, &list)),
            authentication: Authentication {
                user_method: parse_opt("UserMethod", native.user_method.as_deref(), parse_auth_method)?
                    .unwrap_or_default(),
                machine_method: parse_opt("MachineMethod", native.machine_method.as_deref(), parse_auth_method)?
                    .unwrap_or_default(),
                eap_configuration,
            },
            cryptography_suite: native.cryptography_suite.map(|suite| CryptographySuite {
                auth_transform: normalize_identifier(&suite.authentication_transform_constants),
                cipher_transform: normalize_identifier(&suite.cipher_transform_constants),
                pfs_group: normalize_identifier(&suite.pfs_group),
                dh_group: normalize_identifier(&suite.dh_group),
                integrity_method: normalize_identifier(&suite.integrity_check_method),
                encryption_method: normalize_identifier(&suite.encryption_method),
            }),
            routes: self
                .route_list
                .into_iter()
                .map(|route| Route {
                    address: normalize_address(&route.address),
                    prefix_size: route.prefix_size,
                    exclusion: route.exclusion_route,
                    metric: route.metric,
                })
                .collect(),
            domain_name_info: self
                .domain_name_information_list
                .into_iter()
                .map(|info| DomainNameInfo {
                    suffix: normalize_suffix(&info.domain_name),
                    dns_servers: info.dns_servers.as_deref().map(split_hosts).unwrap_or_default(),
                    web_proxy_servers: info.web_proxy_servers.as_deref().map(split_hosts).unwrap_or_default(),
                    auto_trigger: info.auto_trigger,
                })
                .collect(),
            dns_suffixes: self
                .dns_suffix
                .as_deref()
                .map(|s| split_folded(s, &[',', ';']))
                .unwrap_or_default(),
            trusted_network_suffixes: self
                .trusted_network_detection
                .as_deref()
                .map(|s| split_folded(s, &[',', ';']))
                .unwrap_or_default(),
            traffic_filters,
            flags: ProfileFlags {
                always_on: self.always_on.unwrap_or(defaults.always_on),
                // Literal query answer, intentionally not corrected here
                device_tunnel: self.device_tunnel.unwrap_or(defaults.device_tunnel),
                register_dns: self.register_dns.unwrap_or(defaults.register_dns),
                remember_credentials: self.remember_credentials.unwrap_or(defaults.remember_credentials),
                disable_class_based_default_route: native
                    .disable_class_based_default_route
                    .unwrap_or(defaults.disable_class_based_default_route),
                require_crypto_binding: native.require_crypto_binding.unwrap_or(defaults.require_crypto_binding),
                disable_advanced_options_edit_button: self
                    .disable_advanced_options_edit_button
                    .unwrap_or(defaults.disable_advanced_options_edit_button),
                disable_disconnect_button: self
                    .disable_disconnect_button
                    .unwrap_or(defaults.disable_disconnect_button),
                disable_ikev2_fragmentation: native
                    .disable_ikev2_fragmentation
                    .unwrap_or(defaults.disable_ikev2_fragmentation),
                plumb_ikev2_ts_as_routes: native
                    .plumb_ikev2_ts_as_routes
                    .unwrap_or(defaults.plumb_ikev2_ts_as_routes),
                use_ras_credentials: self.use_ras_credentials.unwrap_or(defaults.use_ras_credentials),
                require_vpn_client_app_ui: self
                    .require_vpn_client_app_ui
                    .unwrap_or(defaults.require_vpn_client_app_ui),
            },
            proxy,
            mtu: self.mtu,
            interface_metric: self.ipv4_interface_metric,
            network_outage_time: self.network_outage_time,
        };

        debug!("Decoded live profile '{}'", parts.name);
        CanonicalProfile::from_parts(parts)
    }

    /// Render a canonical profile the way the platform would report it
    pub fn from_canonical(profile: &CanonicalProfile) -> Self {
        let flags = profile.flags();
        let auth = profile.authentication();
        let (vpn_strategy, protocol_list) = strategy_code(profile.strategy());

        let native = LiveNativeProfile {
            servers: joined(profile.servers(), ";"),
            routing_policy_type: Some(profile.tunnel_type().as_str().to_string()),
            native_protocol_type: Some(profile.protocol().as_str().to_string()),
            vpn_strategy,
            protocol_list,
            user_method: Some(auth.user_method.as_str().to_string()),
            machine_method: Some(auth.machine_method.as_str().to_string()),
            eap_configuration: auth.eap_configuration.as_ref().map(|eap| eap.raw().to_string()),
            cryptography_suite: profile.cryptography_suite().map(|suite| LiveCryptographySuite {
                authentication_transform_constants: suite.auth_transform.clone(),
                cipher_transform_constants: suite.cipher_transform.clone(),
                pfs_group: suite.pfs_group.clone(),
                dh_group: suite.dh_group.clone(),
                integrity_check_method: suite.integrity_method.clone(),
                encryption_method: suite.encryption_method.clone(),
            }),
            disable_class_based_default_route: Some(flags.disable_class_based_default_route),
            require_crypto_binding: Some(flags.require_crypto_binding),
            disable_ikev2_fragmentation: Some(flags.disable_ikev2_fragmentation),
            plumb_ikev2_ts_as_routes: Some(flags.plumb_ikev2_ts_as_routes),
        };

        Self {
            profile_name: Some(profile.name().to_string()),
            always_on: Some(flags.always_on),
            device_tunnel: Some(flags.device_tunnel),
            register_dns: Some(flags.register_dns),
            remember_credentials: Some(flags.remember_credentials),
            disable_advanced_options_edit_button: Some(flags.disable_advanced_options_edit_button),
            disable_disconnect_button: Some(flags.disable_disconnect_button),
            use_ras_credentials: Some(flags.use_ras_credentials),
            require_vpn_client_app_ui: Some(flags.require_vpn_client_app_ui),
            dns_suffix: joined(profile.dns_suffixes(), ","),
            trusted_network_detection: joined(profile.trusted_network_suffixes(), ","),
            mtu: profile.mtu(),
            ipv4_interface_metric: profile.interface_metric(),
            network_outage_time: profile.network_outage_time(),
            native_profile: Some(native),
            route_list: profile
                .routes()
                .map(|route| LiveRoute {
                    address: route.address.clone(),
                    prefix_size: route.prefix_size,
                    exclusion_route: route.exclusion,
                    metric: route.metric,
                })
                .collect(),
            domain_name_information_list: profile
                .domain_name_info()
                .map(|info| LiveDomainNameInfo {
                    domain_name: info.suffix.clone(),
                    dns_servers: joined(&info.dns_servers, ","),
                    web_proxy_servers: joined(&info.web_proxy_servers, ","),
                    auto_trigger: info.auto_trigger,
                })
                .collect(),
            traffic_filter_list: profile.traffic_filters().iter().map(LiveTrafficFilter::from_canonical).collect(),
            proxy: profile.proxy().map(|proxy| LiveProxy {
                server: (proxy.kind == ProxyKind::Manual).then(|| proxy.value.clone()),
                auto_config_url: (proxy.kind == ProxyKind::Pac).then(|| proxy.value.clone()),
                bypass_for_local: proxy.bypass_for_local,
                exclude_list: joined(&proxy.exclude_list, ";"),
            }),
        }
    }

    /// Serialized live-state document for a canonical profile
    pub fn encode(profile: &CanonicalProfile) -> String {
        // Plain data with string keys: serialization cannot fail
        serde_json::to_string_pretty(&Self::from_canonical(profile)).unwrap_or_default()
    }
}

impl LiveTrafficFilter {
    fn into_canonical(self) -> Result<TrafficFilter, DecodeError> {
        let addresses = |raw: Option<String>| -> BTreeSet<String> {
            raw.as_deref()
                .map(|r| split_list(r, &[',']).iter().map(|a| normalize_address(a)).collect())
                .unwrap_or_default()
        };
        let ports = |raw: Option<String>| -> BTreeSet<String> {
            raw.as_deref().map(|r| split_list(r, &[','])).unwrap_or_default()
        };
        Ok(TrafficFilter {
            id: self.id.as_deref().map(|id| clean_text(id).to_lowercase()).filter(|id| !id.is_empty()),
            direction: parse_opt("Direction", self.direction.as_deref(), parse_direction)?.unwrap_or_default(),
            protocol: self.protocol,
            local_addresses: addresses(self.local_address_ranges),
            remote_addresses: addresses(self.remote_address_ranges),
            local_ports: ports(self.local_port_ranges),
            remote_ports: ports(self.remote_port_ranges),
            routing_policy_type: parse_opt(
                "TrafficFilter RoutingPolicyType",
                self.routing_policy_type.as_deref(),
                parse_tunnel_type,
            )?
            .unwrap_or_default(),
            app_id: self.app_id.as_deref().map(|id| clean_text(id).to_lowercase()).filter(|id| !id.is_empty()),
        })
    }

    fn from_canonical(filter: &TrafficFilter) -> Self {
        Self {
            id: filter.id.clone(),
            app_id: filter.app_id.clone(),
            protocol: filter.protocol,
            local_address_ranges: joined(&filter.local_addresses, ","),
            remote_address_ranges: joined(&filter.remote_addresses, ","),
            local_port_ranges: joined(&filter.local_ports, ","),
            remote_port_ranges: joined(&filter.remote_ports, ","),
            routing_policy_type: Some(filter.routing_policy_type.as_str().to_string()),
            direction: Some(filter.direction.as_str().to_string()),
        }
    }
}

/// Vendor strategy code (and explicit list, when no code fits) for a strategy
fn strategy_code(strategy: &StrategyPreference) -> (Option<u32>, Vec<String>) {
    let pinned = |p: Protocol| -> Option<u32> {
        match p {
            Protocol::Pptp => Some(1),
            Protocol::L2tp => Some(3),
            Protocol::Sstp => Some(5),
            Protocol::Ikev2 => Some(7),
            Protocol::Automatic => None,
        }
    };

    match strategy {
        StrategyPreference::Only(p) => (pinned(*p), Vec::new()),
        StrategyPreference::Ordered(list) => {
            // "X first" codes are the pinned code plus one
            let first_code = list
                .first()
                .and_then(|first| pinned(*first))
                .map(|code| code + 1)
                .filter(|code| StrategyPreference::derive(Protocol::Automatic, Some(*code), &[]) == *strategy);
            match first_code {
                Some(code) => (Some(code), Vec::new()),
                None => (
                    Some(STRATEGY_PROTOCOL_LIST),
                    list.iter().map(|p| p.as_str().to_string()).collect(),
                ),
            }
        }
    }
}
