//! Value types the canonical profile is built from

use std::collections::BTreeSet;
use std::fmt;

/// Routing policy of the tunnel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TunnelType {
    #[default]
    SplitTunnel,
    ForceTunnel,
}

impl TunnelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelType::SplitTunnel => "SplitTunnel",
            TunnelType::ForceTunnel => "ForceTunnel",
        }
    }
}

/// Native VPN protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    #[default]
    Automatic,
    Ikev2,
    Sstp,
    Pptp,
    L2tp,
}

impl Protocol {
    /// Order the platform tries protocols in when left to choose
    pub const AUTOMATIC_ORDER: [Protocol; 4] =
        [Protocol::Ikev2, Protocol::Sstp, Protocol::L2tp, Protocol::Pptp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Automatic => "Automatic",
            Protocol::Ikev2 => "IKEv2",
            Protocol::Sstp => "Sstp",
            Protocol::Pptp => "Pptp",
            Protocol::L2tp => "L2tp",
        }
    }
}

/// Which protocols the platform may negotiate, and in what order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StrategyPreference {
    /// Exactly one protocol, no fallback
    Only(Protocol),
    /// Try protocols in this order
    Ordered(Vec<Protocol>),
}

impl StrategyPreference {
    /// Derive the strategy from the native protocol, an optional vendor
    /// strategy code and an explicit protocol list
    ///
    /// An explicit list wins over the code, and the code wins over the
    /// protocol. Codes: 1/3/5/7 pin PPTP/L2TP/SSTP/IKEv2, 2/4/6/8 try that
    /// protocol first and then the automatic order. Unknown codes and 0 fall
    /// back to the protocol.
    pub fn derive(protocol: Protocol, code: Option<u32>, list: &[Protocol]) -> Self {
        let explicit: Vec<Protocol> = list
            .iter()
            .copied()
            .filter(|p| *p != Protocol::Automatic)
            .fold(Vec::new(), |mut acc, p| {
                if !acc.contains(&p) {
                    acc.push(p);
                }
                acc
            });
        if !explicit.is_empty() {
            return Self::ordered(explicit);
        }

        let from_code = match code.unwrap_or(0) {
            1 => Some(Self::Only(Protocol::Pptp)),
            2 => Some(Self::first(Protocol::Pptp)),
            3 => Some(Self::Only(Protocol::L2tp)),
            4 => Some(Self::first(Protocol::L2tp)),
            5 => Some(Self::Only(Protocol::Sstp)),
            6 => Some(Self::first(Protocol::Sstp)),
            7 => Some(Self::Only(Protocol::Ikev2)),
            8 => Some(Self::first(Protocol::Ikev2)),
            _ => None,
        };
        if let Some(strategy) = from_code {
            return strategy;
        }

        match protocol {
            Protocol::Automatic => Self::Ordered(Protocol::AUTOMATIC_ORDER.to_vec()),
            other => Self::Only(other),
        }
    }

    fn first(protocol: Protocol) -> Self {
        let mut order = vec![protocol];
        order.extend(Protocol::AUTOMATIC_ORDER.iter().copied().filter(|p| *p != protocol));
        Self::Ordered(order)
    }

    fn ordered(list: Vec<Protocol>) -> Self {
        if list.len() == 1 {
            Self::Only(list[0])
        } else {
            Self::Ordered(list)
        }
    }

    /// Protocols in negotiation order
    pub fn protocols(&self) -> Vec<Protocol> {
        match self {
            Self::Only(p) => vec![*p],
            Self::Ordered(list) => list.clone(),
        }
    }
}

impl fmt::Display for StrategyPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Only(p) => write!(f, "{} only", p.as_str()),
            Self::Ordered(list) => {
                let names: Vec<&str> = list.iter().map(|p| p.as_str()).collect();
                write!(f, "{}", names.join(" > "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthMethod {
    #[default]
    None,
    Eap,
    Mschapv2,
    Certificate,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "None",
            AuthMethod::Eap => "Eap",
            AuthMethod::Mschapv2 => "MSChapv2",
            AuthMethod::Certificate => "Certificate",
        }
    }
}

/// EAP configuration blob together with its normalized leaf set
///
/// Each leaf is `path/of/elements=value` with namespace prefixes removed,
/// whitespace cleaned and thumbprints normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapConfiguration {
    raw: String,
    leaves: BTreeSet<String>,
}

impl EapConfiguration {
    pub fn new(raw: String, leaves: BTreeSet<String>) -> Self {
        Self { raw, leaves }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn leaves(&self) -> &BTreeSet<String> {
        &self.leaves
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authentication {
    pub user_method: AuthMethod,
    pub machine_method: AuthMethod,
    pub eap_configuration: Option<EapConfiguration>,
}

/// Custom IKEv2 cryptography, values normalized to upper case
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CryptographySuite {
    pub auth_transform: String,
    pub cipher_transform: String,
    pub pfs_group: String,
    pub dh_group: String,
    pub integrity_method: String,
    pub encryption_method: String,
}

/// Route identity: the metric is not part of it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteKey {
    pub address: String,
    pub prefix_size: u8,
    pub exclusion: bool,
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_size)?;
        if self.exclusion {
            write!(f, " (excluded)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub address: String,
    pub prefix_size: u8,
    pub exclusion: bool,
    pub metric: Option<u32>,
}

impl Route {
    pub fn key(&self) -> RouteKey {
        RouteKey {
            address: self.address.clone(),
            prefix_size: self.prefix_size,
            exclusion: self.exclusion,
        }
    }
}

/// Name resolution policy for one domain suffix
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DomainNameInfo {
    pub suffix: String,
    pub dns_servers: BTreeSet<String>,
    pub web_proxy_servers: BTreeSet<String>,
    pub auto_trigger: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterDirection {
    #[default]
    Outbound,
    Inbound,
}

impl FilterDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterDirection::Outbound => "Outbound",
            FilterDirection::Inbound => "Inbound",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrafficFilter {
    pub id: Option<String>,
    pub direction: FilterDirection,
    /// IANA protocol number, `None` means any
    pub protocol: Option<u8>,
    pub local_addresses: BTreeSet<String>,
    pub remote_addresses: BTreeSet<String>,
    pub local_ports: BTreeSet<String>,
    pub remote_ports: BTreeSet<String>,
    pub routing_policy_type: TunnelType,
    pub app_id: Option<String>,
}

impl fmt::Display for TrafficFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.direction.as_str())?;
        if let Some(app) = &self.app_id {
            write!(f, " app={}", app)?;
        }
        match self.protocol {
            Some(p) => write!(f, " proto={}", p)?,
            None => write!(f, " proto=any")?,
        }
        let lists = [
            ("local", &self.local_addresses),
            ("remote", &self.remote_addresses),
            ("lports", &self.local_ports),
            ("rports", &self.remote_ports),
        ];
        for (label, set) in lists {
            if !set.is_empty() {
                let list: Vec<&str> = set.iter().map(String::as_str).collect();
                write!(f, " {}={}", label, list.join(","))?;
            }
        }
        if self.routing_policy_type == TunnelType::ForceTunnel {
            write!(f, " force")?;
        }
        if let Some(id) = &self.id {
            write!(f, " id={}", id)?;
        }
        Ok(())
    }
}

/// Boolean switches, each defaulting to the platform default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFlags {
    pub always_on: bool,
    pub device_tunnel: bool,
    pub register_dns: bool,
    pub remember_credentials: bool,
    pub disable_class_based_default_route: bool,
    pub require_crypto_binding: bool,
    pub disable_advanced_options_edit_button: bool,
    pub disable_disconnect_button: bool,
    pub disable_ikev2_fragmentation: bool,
    pub plumb_ikev2_ts_as_routes: bool,
    pub use_ras_credentials: bool,
    pub require_vpn_client_app_ui: bool,
}

impl Default for ProfileFlags {
    fn default() -> Self {
        Self {
            always_on: false,
            device_tunnel: false,
            register_dns: false,
            remember_credentials: false,
            disable_class_based_default_route: false,
            require_crypto_binding: false,
            disable_advanced_options_edit_button: false,
            disable_disconnect_button: false,
            disable_ikev2_fragmentation: false,
            plumb_ikev2_ts_as_routes: false,
            use_ras_credentials: true,
            require_vpn_client_app_ui: false,
        }
    }
}

impl ProfileFlags {
    /// Named view over every flag, in a stable order
    pub fn entries(&self) -> [(&'static str, bool); 12] {
        [
            ("AlwaysOn", self.always_on),
            ("DeviceTunnel", self.device_tunnel),
            ("RegisterDNS", self.register_dns),
            ("RememberCredentials", self.remember_credentials),
            ("DisableClassBasedDefaultRoute", self.disable_class_based_default_route),
            ("RequireCryptoBinding", self.require_crypto_binding),
            ("DisableAdvancedOptionsEditButton", self.disable_advanced_options_edit_button),
            ("DisableDisconnectButton", self.disable_disconnect_button),
            ("DisableIKEv2Fragmentation", self.disable_ikev2_fragmentation),
            ("PlumbIKEv2TSAsRoutes", self.plumb_ikev2_ts_as_routes),
            ("UseRasCredentials", self.use_ras_credentials),
            ("RequireVpnClientAppUI", self.require_vpn_client_app_ui),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    Manual,
    Pac,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub kind: ProxyKind,
    /// Proxy server for `Manual`, auto-config URL for `Pac`
    pub value: String,
    pub bypass_for_local: bool,
    pub exclude_list: BTreeSet<String>,
}
