//! Integration tests for the vpnsync CLI

use assert_cmd::Command;
use libvpnsync::*;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn vpnsync() -> Command {
    Command::cargo_bin("vpnsync").unwrap()
}

const DOCUMENT: &str = "<VPNProfile><ProfileName>Contoso VPN</ProfileName>\
    <Mtu>1400</Mtu>\
    <NativeProfile><Servers>vpn1.contoso.com;vpn2.contoso.com</Servers>\
    <NativeProtocolType>IKEv2</NativeProtocolType></NativeProfile>\
    <Route><Address>10.0.0.0</Address><PrefixSize>8</PrefixSize></Route></VPNProfile>";

const DEVICE_TUNNEL: &str = "<VPNProfile><ProfileName>Contoso Device Tunnel</ProfileName>\
    <DeviceTunnel>true</DeviceTunnel>\
    <NativeProfile><Servers>dt.contoso.com</Servers>\
    <Authentication><MachineMethod>Certificate</MachineMethod></Authentication>\
    </NativeProfile></VPNProfile>";

fn write(dir: &TempDir, file: &str, content: &str) -> PathBuf {
    let path = dir.path().join(file);
    fs::write(&path, content).unwrap();
    path
}

/// Live-state JSON for `document`, as the store would report it
fn live_json(document: &str) -> String {
    LiveProfile::encode(&DocumentDecoder.decode(document).unwrap())
}

#[test]
fn test_help_command() {
    vpnsync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("VPN profile tool"))
        .stdout(predicate::str::contains("diff"));
}

#[test]
fn test_decode_document() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "profile.xml", DOCUMENT);

    vpnsync()
        .arg("decode")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("(document)"))
        .stdout(predicate::str::contains("Contoso VPN"))
        .stdout(predicate::str::contains("vpn1.contoso.com, vpn2.contoso.com"))
        .stdout(predicate::str::contains("10.0.0.0/8"))
        .stdout(predicate::str::contains("1400"));
}

#[test]
fn test_decode_live_as_json() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "profile.json", &live_json(DOCUMENT));

    let output = vpnsync()
        .args(["-o", "json", "decode"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["ProfileName"], "Contoso VPN");
    assert_eq!(value["Mtu"], 1400);
}

#[test]
fn test_diff_equal_profiles() {
    let dir = TempDir::new().unwrap();
    let left = write(&dir, "desired.xml", DOCUMENT);
    let right = write(&dir, "live.json", &live_json(DOCUMENT));

    vpnsync()
        .arg("diff")
        .arg(&left)
        .arg(&right)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("Profiles are equal"));
}

#[test]
fn test_diff_lists_every_difference() {
    let dir = TempDir::new().unwrap();
    let left = write(&dir, "a.xml", DOCUMENT);
    let right = write(
        &dir,
        "b.xml",
        &DOCUMENT
            .replace("<Mtu>1400</Mtu>", "<Mtu>1300</Mtu>")
            .replace("vpn2.contoso.com", "vpn3.contoso.com"),
    );

    vpnsync()
        .arg("diff")
        .arg(&left)
        .arg(&right)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Mtu: "))
        .stdout(predicate::str::contains("NativeProfile/Servers: "))
        .stdout(predicate::str::contains("3 difference(s)"));
}

#[test]
fn test_diff_device_tunnel_against_live() {
    let dir = TempDir::new().unwrap();
    let desired = write(&dir, "dt.xml", DEVICE_TUNNEL);

    let mut live = LiveProfile::from_canonical(&DocumentDecoder.decode(DEVICE_TUNNEL).unwrap());
    live.device_tunnel = Some(false);
    let live_path = write(&dir, "dt.json", &serde_json::to_string(&live).unwrap());

    vpnsync()
        .arg("diff")
        .arg(&desired)
        .arg(&live_path)
        .assert()
        .code(0);

    vpnsync()
        .arg("diff")
        .arg("--strict")
        .arg(&desired)
        .arg(&live_path)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("DeviceTunnel"));
}

#[test]
fn test_decode_missing_file() {
    vpnsync()
        .arg("decode")
        .arg("/nonexistent/profile.xml")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_decode_malformed_document() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "broken.xml", "<VPNProfile><ProfileName>x");

    vpnsync()
        .arg("decode")
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_check_invalid_config() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "vpnsync.toml", "[reconcile]\njitter_fraction = 1.5\n");

    vpnsync()
        .args(["check", "--config"])
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_check_json_output() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "vpnsync.toml",
        "[profiles]\nuser = \"Contoso VPN\"\nuser_backup = \"Contoso VPN Backup\"\n",
    );

    let output = vpnsync()
        .args(["-o", "json", "check", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["managed_profiles"]["user"], "Contoso VPN");
    assert_eq!(value["managed_profiles"]["user_backup"], "Contoso VPN Backup");
    assert!(value["managed_profiles"]["machine"].is_null());
    assert_eq!(value["base_period_secs"], 300);
}
