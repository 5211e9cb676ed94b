//! Decoder and comparator properties
//!
//! Profiles decoded from either representation must compare the way the
//! orchestrator relies on: reflexive, symmetric, tolerant of formatting
//! noise, and consistent between `equals` and `diff`.

use libvpnsync::*;

fn decode(xml: &str) -> CanonicalProfile {
    DocumentDecoder.decode(xml).unwrap()
}

fn profile_with_native(native: &str, extra: &str) -> CanonicalProfile {
    decode(&format!(
        "<VPNProfile><ProfileName>Contoso VPN</ProfileName>{}<NativeProfile>{}</NativeProfile></VPNProfile>",
        extra, native
    ))
}

const FULL: &str = r#"
<VPNProfile>
  <ProfileName>Contoso VPN</ProfileName>
  <AlwaysOn>true</AlwaysOn>
  <RegisterDNS>true</RegisterDNS>
  <DnsSuffix>corp.contoso.com,.contoso.com</DnsSuffix>
  <TrustedNetworkDetection>contoso.com</TrustedNetworkDetection>
  <Mtu>1400</Mtu>
  <NativeProfile>
    <Servers>vpn1.contoso.com;vpn2.contoso.com</Servers>
    <RoutingPolicyType>SplitTunnel</RoutingPolicyType>
    <NativeProtocolType>IKEv2</NativeProtocolType>
    <Authentication>
      <UserMethod>Eap</UserMethod>
      <Eap><Configuration>
        <EapHostConfig xmlns="http://www.microsoft.com/provisioning/EapHostConfig">
          <EapMethod><Type>13</Type></EapMethod>
          <Config><Eap><Type>13</Type>
            <TrustedRootCA>27 AC 93 69 FA F2 57 D3 5C 13 A4 3E 82 26 26 5E 5D 9E 2E 2F</TrustedRootCA>
          </Eap></Config>
        </EapHostConfig>
      </Configuration></Eap>
    </Authentication>
    <CryptographySuite>
      <AuthenticationTransformConstants>GCMAES256</AuthenticationTransformConstants>
      <CipherTransformConstants>GCMAES256</CipherTransformConstants>
      <PfsGroup>ECP384</PfsGroup>
      <DHGroup>ECP384</DHGroup>
      <IntegrityCheckMethod>SHA384</IntegrityCheckMethod>
      <EncryptionMethod>GCMAES256</EncryptionMethod>
    </CryptographySuite>
    <DisableClassBasedDefaultRoute>true</DisableClassBasedDefaultRoute>
  </NativeProfile>
  <Route><Address>10.0.0.0</Address><PrefixSize>8</PrefixSize></Route>
  <Route><Address>192.168.10.0</Address><PrefixSize>24</PrefixSize><ExclusionRoute>true</ExclusionRoute></Route>
  <DomainNameInformation>
    <DomainName>.corp.contoso.com</DomainName>
    <DnsServers>10.0.0.53,10.0.0.54</DnsServers>
    <AutoTrigger>true</AutoTrigger>
  </DomainNameInformation>
  <TrafficFilter>
    <App><Id>%ProgramFiles%\Contoso\app.exe</Id></App>
    <Protocol>6</Protocol>
    <RemotePortRanges>443</RemotePortRanges>
  </TrafficFilter>
  <Proxy><AutoConfigUrl>http://wpad.contoso.com/wpad.dat</AutoConfigUrl></Proxy>
</VPNProfile>
"#;

#[test]
fn test_reflexive_and_symmetric() {
    let full = decode(FULL);
    let minimal = decode("<VPNProfile><ProfileName>Contoso VPN</ProfileName></VPNProfile>");
    let samples = [full, minimal];

    for a in &samples {
        assert!(equals(a, a));
        for b in &samples {
            assert_eq!(equals(a, b), equals(b, a));
            assert_eq!(diff(a, b).is_empty(), equals(a, b));
            assert_eq!(diff(a, b).len(), diff(b, a).len());
        }
    }
}

#[test]
fn test_diff_reports_every_difference() {
    let a = decode(FULL);
    let b = decode(
        &FULL
            .replace("<Mtu>1400</Mtu>", "")
            .replace("<AlwaysOn>true</AlwaysOn>", "<AlwaysOn>false</AlwaysOn>")
            .replace("vpn2.contoso.com", "vpn3.contoso.com"),
    );

    let diffs = diff(&a, &b);
    let paths: Vec<&str> = diffs.iter().map(|d| d.path.as_str()).collect();
    assert!(paths.contains(&"Mtu"));
    assert!(paths.contains(&"AlwaysOn"));
    assert_eq!(paths.iter().filter(|p| **p == "NativeProfile/Servers").count(), 2);
    assert!(!equals(&a, &b));
}

#[test]
fn test_route_order_does_not_matter() {
    let r1 = "<Route><Address>10.0.0.0</Address><PrefixSize>8</PrefixSize></Route>";
    let r2 = "<Route><Address>172.16.0.0</Address><PrefixSize>12</PrefixSize></Route>";
    let a = profile_with_native("", &format!("{}{}", r1, r2));
    let b = profile_with_native("", &format!("{}{}", r2, r1));
    assert!(equals(&a, &b));
}

#[test]
fn test_duplicate_servers_collapse() {
    let a = profile_with_native("<Servers>host;host</Servers>", "");
    let b = profile_with_native("<Servers>host</Servers>", "");
    assert!(equals(&a, &b));

    let spaced = profile_with_native("<Servers> HOST ; host,</Servers>", "");
    assert!(equals(&spaced, &b));
}

#[test]
fn test_route_metric_excluded_from_identity() {
    let a = profile_with_native(
        "",
        "<Route><Address>10.0.0.0</Address><PrefixSize>8</PrefixSize><Metric>5</Metric></Route>",
    );
    let b = profile_with_native("", "<Route><Address>10.0.0.0</Address><PrefixSize>8</PrefixSize></Route>");
    assert!(equals(&a, &b));

    // The metric itself survives decoding
    assert_eq!(a.routes().next().unwrap().metric, Some(5));
}

#[test]
fn test_thumbprint_spacing_and_case() {
    let eap = |thumbprint: &str| {
        format!(
            "<Authentication><UserMethod>Eap</UserMethod><Eap><Configuration>\
             <EapHostConfig><Config><TrustedRootCA>{}</TrustedRootCA></Config></EapHostConfig>\
             </Configuration></Eap></Authentication>",
            thumbprint
        )
    };
    let spaced = profile_with_native(&eap("27 ac 93 69 fa f2 57 d3 5c 13 a4 3e 82 26 26 5e 5d 9e 2e 2f"), "");
    let compact = profile_with_native(&eap("27AC9369FAF257D35C13A43E8226265E5D9E2E2F"), "");
    assert!(equals(&spaced, &compact));

    let other = profile_with_native(&eap("0000000000000000000000000000000000000000"), "");
    assert!(!equals(&spaced, &other));
}

#[test]
fn test_eap_blob_as_escaped_text() {
    let embedded = profile_with_native(
        "<Authentication><UserMethod>Eap</UserMethod><Eap><Configuration>\
         <EapHostConfig><Config><Type>25</Type></Config></EapHostConfig>\
         </Configuration></Eap></Authentication>",
        "",
    );
    let escaped = profile_with_native(
        "<Authentication><UserMethod>Eap</UserMethod><Eap><Configuration>\
         &lt;EapHostConfig&gt;&lt;Config&gt;&lt;Type&gt;25&lt;/Type&gt;&lt;/Config&gt;&lt;/EapHostConfig&gt;\
         </Configuration></Eap></Authentication>",
        "",
    );
    assert!(equals(&embedded, &escaped));
}

#[test]
fn test_unset_and_zero_are_distinct() {
    let unset = profile_with_native("", "");
    let zero = profile_with_native("", "<NetworkOutageTime>0</NetworkOutageTime>");
    assert!(!equals(&unset, &zero));
    assert_eq!(zero.network_outage_time(), Some(0));

    // And the distinction survives the live representation
    let live = LiveStateDecoder.decode(&LiveProfile::encode(&zero)).unwrap();
    assert_eq!(live.network_outage_time(), Some(0));
    let live_unset = LiveStateDecoder.decode(&LiveProfile::encode(&unset)).unwrap();
    assert_eq!(live_unset.network_outage_time(), None);
}

#[test]
fn test_document_and_live_agree() {
    let desired = decode(FULL);
    let live = LiveStateDecoder.decode(&LiveProfile::encode(&desired)).unwrap();
    let diffs = diff(&desired, &live);
    assert!(diffs.is_empty(), "unexpected differences: {:?}", diffs);
}

#[test]
fn test_hand_written_live_state_matches_document() {
    let document = decode(
        "<VPNProfile><ProfileName>Contoso VPN</ProfileName>\
         <NativeProfile><Servers>vpn.contoso.com</Servers><NativeProtocolType>Sstp</NativeProtocolType>\
         <Authentication><UserMethod>MSChapv2</UserMethod></Authentication></NativeProfile>\
         <Route><Address>10.0.0.0</Address><PrefixSize>8</PrefixSize></Route></VPNProfile>",
    );
    let live = LiveStateDecoder
        .decode(
            r#"{
                "ProfileName": "Contoso VPN",
                "NativeProfile": {
                    "Servers": "VPN.contoso.com",
                    "NativeProtocolType": "Sstp",
                    "VpnStrategy": 5,
                    "UserMethod": "MSChapv2"
                },
                "RouteList": [ { "Address": "10.0.0.0", "PrefixSize": 8, "Metric": 1 } ]
            }"#,
        )
        .unwrap();
    assert!(equals(&document, &live), "{:?}", diff(&document, &live));
}

#[test]
fn test_device_tunnel_live_quirk() {
    let desired = decode(
        "<VPNProfile><ProfileName>Contoso Device Tunnel</ProfileName><DeviceTunnel>true</DeviceTunnel>\
         <NativeProfile><Servers>dt.contoso.com</Servers>\
         <Authentication><MachineMethod>Certificate</MachineMethod></Authentication></NativeProfile>\
         </VPNProfile>",
    );
    assert!(desired.flags().device_tunnel);

    let mut live = LiveProfile::from_canonical(&desired);
    live.device_tunnel = Some(false);
    let live = live.into_canonical().unwrap();

    // The live decoder reports what the query said
    assert!(!live.flags().device_tunnel);
    assert!(!equals(&desired, &live));
    // The live comparison helper overrides it
    assert!(compare_live(&desired, &live).is_empty());
}

#[test]
fn test_decode_errors() {
    assert!(matches!(
        DocumentDecoder.decode("<VPNProfile><ProfileName>x"),
        Err(DecodeError::Malformed(_))
    ));
    assert_eq!(
        DocumentDecoder.decode("<VPNProfile/>").unwrap_err(),
        DecodeError::MissingName
    );
    assert!(matches!(LiveStateDecoder.decode("[1, 2"), Err(DecodeError::Malformed(_))));
    assert_eq!(
        LiveStateDecoder.decode(r#"{"ProfileName": "  "}"#).unwrap_err(),
        DecodeError::MissingName
    );
}

#[test]
fn test_block_and_list_order_does_not_matter() {
    let filter_a = "<TrafficFilter><App><Id>%ProgramFiles%\\Contoso\\app.exe</Id></App>\
                    <Protocol>6</Protocol><RemotePortRanges>443</RemotePortRanges></TrafficFilter>";
    let filter_b = "<TrafficFilter><Protocol>17</Protocol><RemoteAddressRanges>10.1.0.0-10.1.255.255</RemoteAddressRanges>\
                    </TrafficFilter>";
    let dni_a = "<DomainNameInformation><DomainName>.corp.contoso.com</DomainName>\
                 <DnsServers>10.0.0.53</DnsServers></DomainNameInformation>";
    let dni_b = "<DomainNameInformation><DomainName>.lab.contoso.com</DomainName>\
                 <DnsServers>10.9.0.53</DnsServers><AutoTrigger>true</AutoTrigger></DomainNameInformation>";

    let a = profile_with_native(
        "",
        &format!(
            "<DnsSuffix>corp.contoso.com,lab.contoso.com</DnsSuffix>{}{}{}{}",
            filter_a, filter_b, dni_a, dni_b
        ),
    );
    let b = profile_with_native(
        "",
        &format!(
            "<DnsSuffix>lab.contoso.com,corp.contoso.com</DnsSuffix>{}{}{}{}",
            dni_b, filter_b, dni_a, filter_a
        ),
    );

    assert_eq!(a.traffic_filters().len(), 2);
    assert_eq!(a.domain_name_info().count(), 2);
    assert!(equals(&a, &b), "{:?}", diff(&a, &b));
}

#[test]
fn test_disjoint_eap_blobs_differ() {
    let eap = |config: &str| {
        format!(
            "<Authentication><UserMethod>Eap</UserMethod><Eap><Configuration>\
             <EapHostConfig><Config>{}</Config></EapHostConfig>\
             </Configuration></Eap></Authentication>",
            config
        )
    };
    let peap = profile_with_native(&eap("<Type>25</Type><ServerNames>nps1.contoso.com</ServerNames>"), "");
    let tls = profile_with_native(&eap("<Type>13</Type><ServerNames>nps1.contoso.com</ServerNames>"), "");

    assert!(!equals(&peap, &tls));
    let diffs = diff(&peap, &tls);
    assert!(diffs
        .iter()
        .all(|d| d.path == "NativeProfile/Authentication/Eap/Configuration"));
    assert!(diffs.iter().any(|d| d.description.ends_with("only in left")));
    assert!(diffs.iter().any(|d| d.description.ends_with("only in right")));

    // A blob that only adds leaves is still contained
    let wider = profile_with_native(
        &eap("<Type>25</Type><ServerNames>nps1.contoso.com</ServerNames><PerformServerValidation>true</PerformServerValidation>"),
        "",
    );
    assert!(equals(&peap, &wider));
}

#[test]
fn test_filters_differing_by_id_stay_distinct() {
    let filter = |id: &str| {
        format!(
            "<TrafficFilter><Id>{}</Id><Protocol>6</Protocol><RemotePortRanges>443</RemotePortRanges></TrafficFilter>",
            id
        )
    };
    let both = profile_with_native("", &format!("{}{}", filter("web-1"), filter("web-2")));
    let one = profile_with_native("", &filter("web-1"));

    assert_eq!(both.traffic_filters().len(), 2);
    assert!(!equals(&both, &one));
    let diffs = diff(&both, &one);
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].path, "TrafficFilter");
    assert!(diffs[0].description.contains("id=web-2"));
}
