//! Declarative configuration document decoder
//!
//! Reads the hierarchical `<VPNProfile>` document a policy compiler produces:
//! - top-level flags, suffix lists and optional scalars
//! - `<NativeProfile>` with servers, protocol, strategy, authentication and
//!   the optional custom cryptography suite
//! - repeated `<Route>`, `<DomainNameInformation>` and `<TrafficFilter>` blocks
//! - an optional `<Proxy>` block
//!
//! Absent optional elements map to platform defaults.

use super::normalize::*;
use super::xml::{eap_leaves, parse_document, XmlElement};
use super::ProfileDecoder;
use crate::error::DecodeError;
use crate::profile::{
    Authentication, CanonicalProfile, CryptographySuite, DomainNameInfo, EapConfiguration,
    ProfileFlags, ProfileParts, Protocol, ProxyKind, ProxySettings, Route, StrategyPreference,
    TrafficFilter,
};
use std::collections::BTreeSet;
use tracing::debug;

const ROOT_ELEMENT: &str = "VPNProfile";

/// Decoder for the declarative `<VPNProfile>` document
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentDecoder;

impl DocumentDecoder {
    /// Profile name of a document whose body may not decode
    ///
    /// Needs well-formed XML with a `<VPNProfile>` root and a non-blank
    /// `<ProfileName>`; every other element is ignored.
    pub fn profile_name(raw: &str) -> Option<String> {
        let root = parse_document(raw).ok()?;
        if !root.name.eq_ignore_ascii_case(ROOT_ELEMENT) {
            return None;
        }
        root.child_text("ProfileName")
            .map(clean_text)
            .filter(|name| !name.is_empty())
    }
}

impl ProfileDecoder for DocumentDecoder {
    fn name(&self) -> &str {
        "document"
    }

    fn decode(&self, raw: &str) -> Result<CanonicalProfile, DecodeError> {
        let root = parse_document(raw)?;
        if !root.name.eq_ignore_ascii_case(ROOT_ELEMENT) {
            return Err(DecodeError::Malformed(format!(
                "Expected <{}> root element, found <{}>",
                ROOT_ELEMENT, root.name
            )));
        }

        let parts = decode_parts(&root)?;
        debug!("Decoded profile document '{}'", parts.name);
        CanonicalProfile::from_parts(parts)
    }
}

/// Text of an optional child; empty text counts as absent
fn text<'a>(el: &'a XmlElement, name: &str) -> Option<&'a str> {
    el.child_text(name).filter(|t| !clean_text(t).is_empty())
}

fn flag(el: &XmlElement, name: &str, default: bool) -> Result<bool, DecodeError> {
    match text(el, name) {
        None => Ok(default),
        Some(raw) => parse_bool(raw)
            .ok_or_else(|| DecodeError::Malformed(format!("<{}> is not a boolean: '{}'", name, raw))),
    }
}

fn number(el: &XmlElement, name: &str) -> Result<Option<u32>, DecodeError> {
    match text(el, name) {
        None => Ok(None),
        Some(raw) => parse_u32(raw)
            .map(Some)
            .ok_or_else(|| DecodeError::Malformed(format!("<{}> is not a number: '{}'", name, raw))),
    }
}

fn parsed<T>(
    el: &XmlElement,
    name: &str,
    parser: fn(&str) -> Option<T>,
) -> Result<Option<T>, DecodeError> {
    match text(el, name) {
        None => Ok(None),
        Some(raw) => parser(raw)
            .map(Some)
            .ok_or_else(|| DecodeError::Malformed(format!("<{}> has unknown value '{}'", name, raw))),
    }
}

fn required<'a>(el: &'a XmlElement, name: &str) -> Result<&'a str, DecodeError> {
    text(el, name).ok_or_else(|| {
        DecodeError::Malformed(format!("<{}> is missing <{}>", el.name, name))
    })
}

fn decode_parts(root: &XmlElement) -> Result<ProfileParts, DecodeError> {
    let mut parts = ProfileParts {
        name: root.child_text("ProfileName").map(clean_text).unwrap_or_default(),
        ..Default::default()
    };

    parts.dns_suffixes = text(root, "DnsSuffix").map(|s| split_folded(s, &[',', ';'])).unwrap_or_default();
    parts.trusted_network_suffixes = text(root, "TrustedNetworkDetection")
        .map(|s| split_folded(s, &[',', ';']))
        .unwrap_or_default();
    parts.mtu = number(root, "Mtu")?;
    parts.interface_metric = number(root, "IPv4InterfaceMetric")?;
    parts.network_outage_time = number(root, "NetworkOutageTime")?;

    let defaults = ProfileFlags::default();
    let native = root.child("NativeProfile");
    let native_flag = |name: &str, default: bool| -> Result<bool, DecodeError> {
        match native {
            Some(n) => flag(n, name, default),
            None => Ok(default),
        }
    };
    parts.flags = ProfileFlags {
        always_on: flag(root, "AlwaysOn", defaults.always_on)?,
        device_tunnel: flag(root, "DeviceTunnel", defaults.device_tunnel)?,
        register_dns: flag(root, "RegisterDNS", defaults.register_dns)?,
        remember_credentials: flag(root, "RememberCredentials", defaults.remember_credentials)?,
        disable_advanced_options_edit_button: flag(
            root,
            "DisableAdvancedOptionsEditButton",
            defaults.disable_advanced_options_edit_button,
        )?,
        disable_disconnect_button: flag(root, "DisableDisconnectButton", defaults.disable_disconnect_button)?,
        use_ras_credentials: flag(root, "UseRasCredentials", defaults.use_ras_credentials)?,
        require_vpn_client_app_ui: flag(root, "RequireVpnClientAppUI", defaults.require_vpn_client_app_ui)?,
        disable_class_based_default_route: native_flag(
            "DisableClassBasedDefaultRoute",
            defaults.disable_class_based_default_route,
        )?,
        require_crypto_binding: native_flag("RequireCryptoBinding", defaults.require_crypto_binding)?,
        disable_ikev2_fragmentation: native_flag(
            "DisableIKEv2Fragmentation",
            defaults.disable_ikev2_fragmentation,
        )?,
        plumb_ikev2_ts_as_routes: native_flag("PlumbIKEv2TSAsRoutes", defaults.plumb_ikev2_ts_as_routes)?,
    };

    if let Some(native) = native {
        decode_native(native, &mut parts)?;
    } else {
        parts.strategy = Some(StrategyPreference::derive(parts.protocol, None, &[]));
    }

    for route in root.children_named("Route") {
        parts.routes.push(decode_route(route)?);
    }
    for info in root.children_named("DomainNameInformation") {
        parts.domain_name_info.push(decode_domain_info(info)?);
    }
    for filter in root.children_named("TrafficFilter") {
        parts.traffic_filters.push(decode_traffic_filter(filter)?);
    }
    parts.proxy = match root.child("Proxy") {
        Some(proxy) => decode_proxy(proxy)?,
        None => None,
    };

    Ok(parts)
}

fn decode_native(native: &XmlElement, parts: &mut ProfileParts) -> Result<(), DecodeError> {
    parts.servers = text(native, "Servers").map(split_hosts).unwrap_or_default();
    parts.tunnel_type = parsed(native, "RoutingPolicyType", parse_tunnel_type)?.unwrap_or_default();

    // "ProtocolList" is not a protocol of its own: it defers to <ProtocolList>
    let list = protocol_list(native)?;
    parts.protocol = match text(native, "NativeProtocolType") {
        Some(raw) if clean_text(raw).eq_ignore_ascii_case("ProtocolList") => Protocol::Automatic,
        _ => parsed(native, "NativeProtocolType", parse_protocol)?.unwrap_or_default(),
    };
    let code = number(native, "VpnStrategy")?;
    parts.strategy = Some(StrategyPreference::derive(parts.protocol, code, &list));

    if let Some(auth) = native.child("Authentication") {
        parts.authentication = decode_authentication(auth)?;
    }
    if let Some(suite) = native.child("CryptographySuite") {
        parts.cryptography_suite = Some(decode_crypto_suite(suite));
    }
    Ok(())
}

fn protocol_list(native: &XmlElement) -> Result<Vec<Protocol>, DecodeError> {
    let Some(list) = native.child("ProtocolList") else {
        return Ok(Vec::new());
    };
    let mut protocols = Vec::new();
    for entry in &list.children {
        let raw = entry.child_text("Type").unwrap_or(entry.text.as_str());
        let protocol = parse_protocol(raw).ok_or_else(|| {
            DecodeError::Malformed(format!("<ProtocolList> has unknown protocol '{}'", raw))
        })?;
        protocols.push(protocol);
    }
    Ok(protocols)
}

fn decode_authentication(auth: &XmlElement) -> Result<Authentication, DecodeError> {
    let eap_configuration = match auth.child("Eap").and_then(|eap| eap.child("Configuration")) {
        Some(config) => decode_eap(config)?,
        None => None,
    };
    Ok(Authentication {
        user_method: parsed(auth, "UserMethod", parse_auth_method)?.unwrap_or_default(),
        machine_method: parsed(auth, "MachineMethod", parse_auth_method)?.unwrap_or_default(),
        eap_configuration,
    })
}

/// The EAP blob is either embedded markup or escaped text
fn decode_eap(config: &XmlElement) -> Result<Option<EapConfiguration>, DecodeError> {
    if let Some(embedded) = config.children.first() {
        return Ok(Some(EapConfiguration::new(embedded.render(), embedded.leaves())));
    }
    let raw = config.text.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    Ok(Some(EapConfiguration::new(raw.to_string(), eap_leaves(raw)?)))
}

fn decode_crypto_suite(suite: &XmlElement) -> CryptographySuite {
    let field = |name: &str| suite.child_text(name).map(normalize_identifier).unwrap_or_default();
    CryptographySuite {
        auth_transform: field("AuthenticationTransformConstants"),
        cipher_transform: field("CipherTransformConstants"),
        pfs_group: field("PfsGroup"),
        dh_group: field("DHGroup"),
        integrity_method: field("IntegrityCheckMethod"),
        encryption_method: field("EncryptionMethod"),
    }
}

fn decode_route(route: &XmlElement) -> Result<Route, DecodeError> {
    let prefix_raw = required(route, "PrefixSize")?;
    let prefix_size = clean_text(prefix_raw).parse::<u8>().map_err(|_| {
        DecodeError::Malformed(format!("<PrefixSize> is not a prefix length: '{}'", prefix_raw))
    })?;
    Ok(Route {
        address: normalize_address(required(route, "Address")?),
        prefix_size,
        exclusion: flag(route, "ExclusionRoute", false)?,
        metric: number(route, "Metric")?,
    })
}

fn decode_domain_info(info: &XmlElement) -> Result<DomainNameInfo, DecodeError> {
    Ok(DomainNameInfo {
        suffix: normalize_suffix(required(info, "DomainName")?),
        dns_servers: text(info, "DnsServers").map(split_hosts).unwrap_or_default(),
        web_proxy_servers: text(info, "WebProxyServers").map(split_hosts).unwrap_or_default(),
        auto_trigger: flag(info, "AutoTrigger", false)?,
    })
}

fn address_set(el: &XmlElement, name: &str) -> BTreeSet<String> {
    text(el, name)
        .map(|raw| split_list(raw, &[',']).iter().map(|a| normalize_address(a)).collect())
        .unwrap_or_default()
}

fn decode_traffic_filter(filter: &XmlElement) -> Result<TrafficFilter, DecodeError> {
    let app_id = filter
        .child("App")
        .and_then(|app| text(app, "Id"))
        .map(|id| clean_text(id).to_lowercase());
    let protocol = match text(filter, "Protocol") {
        None => None,
        Some(raw) => {
            let cleaned = clean_text(raw);
            match parse_filter_protocol(&cleaned) {
                Some(p) => Some(p),
                None if cleaned.eq_ignore_ascii_case("any") => None,
                None => {
                    return Err(DecodeError::Malformed(format!(
                        "<Protocol> is not a protocol number: '{}'",
                        raw
                    )))
                }
            }
        }
    };

    Ok(TrafficFilter {
        id: text(filter, "Id").map(|id| clean_text(id).to_lowercase()),
        direction: parsed(filter, "Direction", parse_direction)?.unwrap_or_default(),
        protocol,
        local_addresses: address_set(filter, "LocalAddressRanges"),
        remote_addresses: address_set(filter, "RemoteAddressRanges"),
        local_ports: text(filter, "LocalPortRanges").map(|p| split_list(p, &[','])).unwrap_or_default(),
        remote_ports: text(filter, "RemotePortRanges").map(|p| split_list(p, &[','])).unwrap_or_default(),
        routing_policy_type: parsed(filter, "RoutingPolicyType", parse_tunnel_type)?.unwrap_or_default(),
        app_id,
    })
}

fn decode_proxy(proxy: &XmlElement) -> Result<Option<ProxySettings>, DecodeError> {
    let (kind, value) = if let Some(server) = proxy.child("Manual").and_then(|m| text(m, "Server")) {
        (ProxyKind::Manual, clean_text(server).to_lowercase())
    } else if let Some(url) = text(proxy, "AutoConfigUrl") {
        (ProxyKind::Pac, clean_text(url))
    } else {
        return Ok(None);
    };

    Ok(Some(ProxySettings {
        kind,
        value,
        bypass_for_local: flag(proxy, "BypassForLocal", false)?,
        exclude_list: text(proxy, "ExcludeList").map(|l| split_folded(l, &[';', ','])).unwrap_or_default(),
    }))
}
