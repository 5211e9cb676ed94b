//! vpnsync - VPN profile inspection tool
//!
//! Decodes declarative (XML) and live-state (JSON) profiles, compares them
//! the way the daemon does, and checks daemon configuration files.
//!
//! Exit status of `diff`: 0 when equal, 1 when different, 2 on error.

use clap::{Parser, Subcommand};
use libvpnsync::*;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "vpnsync")]
#[command(version)]
#[command(about = "VPN profile tool - decode, compare and check reconciliation inputs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: text, json
    #[arg(short = 'o', long, default_value = "text")]
    output: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a profile (XML document or live-state JSON) and print it
    Decode { file: PathBuf },
    /// Compare two profiles and print every differing field
    Diff {
        left: PathBuf,
        right: PathBuf,
        /// Compare strictly, without the live device tunnel override
        #[arg(long)]
        strict: bool,
    },
    /// Validate a daemon configuration file
    Check {
        #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match &cli.command {
        Commands::Decode { file } => handle_decode(file, &cli),
        Commands::Diff { left, right, strict } => handle_diff(left, right, *strict),
        Commands::Check { config } => handle_check(config, &cli),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vpnsync={},libvpnsync={}", level, level)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}

/// Read and decode a profile, picking the decoder from the content
fn load_profile(path: &Path) -> VpnsyncResult<(CanonicalProfile, &'static str)> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| VpnsyncError::NotFound(format!("{}: {}", path.display(), e)))?;
    let decoder = decoder_for(&raw);
    let kind = if decoder.name() == "live" { "live" } else { "document" };
    Ok((decoder.decode(&raw)?, kind))
}

fn handle_decode(file: &Path, cli: &Cli) -> VpnsyncResult<i32> {
    let (profile, kind) = load_profile(file)?;
    if cli.output == "json" {
        println!("{}", LiveProfile::encode(&profile));
    } else {
        println!("# decoded from {} ({})", file.display(), kind);
        print_profile(&profile);
    }
    Ok(0)
}

fn handle_diff(left: &Path, right: &Path, strict: bool) -> VpnsyncResult<i32> {
    let (left_profile, _) = load_profile(left)?;
    let (right_profile, right_kind) = load_profile(right)?;

    let diffs = if right_kind == "live" && !strict {
        compare_live(&left_profile, &right_profile)
    } else {
        diff(&left_profile, &right_profile)
    };

    if diffs.is_empty() {
        println!("Profiles are equal");
        return Ok(0);
    }
    for d in &diffs {
        println!("{}", d);
    }
    println!("{} difference(s)", diffs.len());
    Ok(1)
}

fn handle_check(path: &Path, cli: &Cli) -> VpnsyncResult<i32> {
    let config = VpnsyncConfig::load(path)?;
    if cli.output == "json" {
        let summary = serde_json::json!({
            "config": path.display().to_string(),
            "managed_profiles": ProfileKind::ALL
                .iter()
                .map(|k| (k.to_string(), config.get_managed_profile_name(*k)))
                .collect::<std::collections::BTreeMap<_, _>>(),
            "base_period_secs": config.reconcile.base_period_secs,
            "jitter_fraction": config.reconcile.jitter_fraction,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(0);
    }

    println!("Configuration OK: {}", path.display());
    for kind in ProfileKind::ALL {
        match config.get_managed_profile_name(kind) {
            Some(name) => println!("  {:<12} {}", kind, name),
            None => println!("  {:<12} (not set)", kind),
        }
    }
    println!(
        "  period       {}s +/- {:.0}%",
        config.reconcile.base_period_secs,
        config.reconcile.jitter_fraction * 100.0
    );
    Ok(0)
}

fn print_profile(profile: &CanonicalProfile) {
    let join = |set: &std::collections::BTreeSet<String>| {
        set.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    let optional = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_else(|| "unset".into());

    println!("{:<20} {}", "ProfileName", profile.name());
    println!("{:<20} {}", "Servers", join(profile.servers()));
    println!("{:<20} {}", "RoutingPolicyType", profile.tunnel_type().as_str());
    println!("{:<20} {}", "NativeProtocolType", profile.protocol().as_str());
    println!("{:<20} {}", "Strategy", profile.strategy());

    let auth = profile.authentication();
    println!("{:<20} {}", "UserMethod", auth.user_method.as_str());
    println!("{:<20} {}", "MachineMethod", auth.machine_method.as_str());
    if let Some(eap) = &auth.eap_configuration {
        println!("{:<20} {} entries", "EapConfiguration", eap.leaves().len());
    }
    match profile.cryptography_suite() {
        Some(suite) => println!(
            "{:<20} {} {} {} {} {} {}",
            "CryptographySuite",
            suite.auth_transform,
            suite.cipher_transform,
            suite.pfs_group,
            suite.dh_group,
            suite.integrity_method,
            suite.encryption_method
        ),
        None => println!("{:<20} platform default", "CryptographySuite"),
    }

    for route in profile.routes() {
        match route.metric {
            Some(metric) => println!("{:<20} {} metric {}", "Route", route.key(), metric),
            None => println!("{:<20} {}", "Route", route.key()),
        }
    }
    for info in profile.domain_name_info() {
        println!(
            "{:<20} {} dns=[{}] proxy=[{}]{}",
            "DomainName",
            info.suffix,
            join(&info.dns_servers),
            join(&info.web_proxy_servers),
            if info.auto_trigger { " auto-trigger" } else { "" }
        );
    }
    println!("{:<20} {}", "DnsSuffix", join(profile.dns_suffixes()));
    println!("{:<20} {}", "TrustedNetwork", join(profile.trusted_network_suffixes()));
    for filter in profile.traffic_filters() {
        println!("{:<20} {}", "TrafficFilter", filter);
    }

    let enabled: Vec<&str> = profile
        .flags()
        .entries()
        .iter()
        .filter(|(_, on)| *on)
        .map(|(name, _)| *name)
        .collect();
    println!("{:<20} {}", "Flags", enabled.join(", "));

    if let Some(proxy) = profile.proxy() {
        println!("{:<20} {:?} {}", "Proxy", proxy.kind, proxy.value);
    }
    println!("{:<20} {}", "Mtu", optional(profile.mtu()));
    println!("{:<20} {}", "IPv4InterfaceMetric", optional(profile.interface_metric()));
    println!("{:<20} {}", "NetworkOutageTime", optional(profile.network_outage_time()));
}
