//! `StakepooldCli`
//! Command line entry point of the stake pool daemon.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{self, Arg};
use tracing::{error, info, warn};

use rpc_version::{CompatibilityPolicy, Semver};
use stakepoold::config::{
    DEFAULT_NODE_HOST, DEFAULT_WALLET_HOST, PeerConfig, REQUIRED_NODE_API, REQUIRED_WALLET_API,
    StakepooldConfig,
};
use stakepoold::context::{load_low_fee_tickets, load_voting_config};
use stakepoold::{AppContext, Service, StakepooldError};
use ticket_sync::ClassifyConfig;

/// Builds the command line interface.
pub fn build_clap_app() -> clap::Command {
    clap::Command::new("stakepoold").version(env!("CARGO_PKG_VERSION"))
            .about("Keeps a stake pool's live and ignored low fee ticket sets in sync with its voting wallet.")
            .arg(Arg::new("bitumdhost")
                .long("bitumdhost")
                .value_name("HOST:PORT")
                .help("Node RPC listener.")
                .default_value(DEFAULT_NODE_HOST))
            .arg(Arg::new("bitumduser")
                .long("bitumduser")
                .value_name("USER")
                .help("Node RPC user.")
                .default_value(""))
            .arg(Arg::new("bitumdpassword")
                .long("bitumdpassword")
                .value_name("PASSWORD")
                .help("Node RPC password.")
                .default_value(""))
            .arg(Arg::new("bitumdcert")
                .long("bitumdcert")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Node RPC certificate. Defaults to ~/.bitumd/rpc.cert"))
            .arg(Arg::new("wallethost")
                .long("wallethost")
                .value_name("HOST:PORT")
                .help("Wallet RPC listener.")
                .default_value(DEFAULT_WALLET_HOST))
            .arg(Arg::new("walletuser")
                .long("walletuser")
                .value_name("USER")
                .help("Wallet RPC user.")
                .default_value(""))
            .arg(Arg::new("walletpassword")
                .long("walletpassword")
                .value_name("PASSWORD")
                .help("Wallet RPC password.")
                .default_value(""))
            .arg(Arg::new("walletcert")
                .long("walletcert")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Wallet RPC certificate. Defaults to ~/.bitumwallet/rpc.cert"))
            .arg(Arg::new("required-node-api")
                .long("required-node-api")
                .value_name("VERSION")
                .value_parser(parse_semver)
                .help("Oldest node JSON-RPC API accepted, as major.minor.patch."))
            .arg(Arg::new("required-wallet-api")
                .long("required-wallet-api")
                .value_name("VERSION")
                .value_parser(parse_semver)
                .help("Oldest wallet JSON-RPC API accepted, as major.minor.patch."))
            .arg(Arg::new("version-policy")
                .long("version-policy")
                .value_name("POLICY")
                .value_parser(parse_policy)
                .help(r#"How advertised API versions are matched. One of "additive", "additive-patch" or "exact". Defaults to "additive""#))
            .arg(Arg::new("refresh-interval")
                .long("refresh-interval")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..))
                .help("Seconds between scheduled ticket refreshes."))
            .arg(Arg::new("call-timeout")
                .long("call-timeout")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..))
                .help("Seconds to wait for a single RPC response during a refresh."))
            .arg(Arg::new("max-concurrent-lookups")
                .long("max-concurrent-lookups")
                .value_name("N")
                .value_parser(clap::value_parser!(NonZeroUsize))
                .help("Upper bound of ticket transaction lookups in flight."))
            .arg(Arg::new("min-ticket-fee")
                .long("min-ticket-fee")
                .value_name("ATOMS")
                .value_parser(clap::value_parser!(i64))
                .help("Minimum fee in atoms a ticket must pay to be voted."))
            .arg(Arg::new("voting-config")
                .long("voting-config")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("JSON object of user voting configuration keyed by depositor address."))
            .arg(Arg::new("low-fee-tickets")
                .long("low-fee-tickets")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("JSON object mapping whitelisted ticket hashes to multisig addresses."))
            .arg(Arg::new("data-dir")
                .long("data-dir")
                .value_name("data-dir")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Absolute path to use as data directory"))
}

/// Custom function to parse a string into a `Semver`
fn parse_semver(s: &str) -> Result<Semver, String> {
    s.parse::<Semver>().map_err(|e| e.to_string())
}

/// Custom function to parse a string into a `CompatibilityPolicy`
fn parse_policy(s: &str) -> Result<CompatibilityPolicy, String> {
    s.parse::<CompatibilityPolicy>()
}

/// Fills a [`StakepooldConfig`] from parsed arguments.
pub fn fill_config(matches: &clap::ArgMatches) -> Result<StakepooldConfig, String> {
    let defaults = StakepooldConfig::build().create();
    let string_arg = |id: &str| {
        matches
            .get_one::<String>(id)
            .cloned()
            .ok_or_else(|| format!("missing argument {id}"))
    };

    let node = PeerConfig::new(
        string_arg("bitumdhost")?,
        matches
            .get_one::<PathBuf>("bitumdcert")
            .cloned()
            .unwrap_or(defaults.node.cert_path),
        matches
            .get_one::<Semver>("required-node-api")
            .copied()
            .unwrap_or(REQUIRED_NODE_API),
    )
    .with_credentials(string_arg("bitumduser")?, string_arg("bitumdpassword")?);
    let wallet = PeerConfig::new(
        string_arg("wallethost")?,
        matches
            .get_one::<PathBuf>("walletcert")
            .cloned()
            .unwrap_or(defaults.wallet.cert_path),
        matches
            .get_one::<Semver>("required-wallet-api")
            .copied()
            .unwrap_or(REQUIRED_WALLET_API),
    )
    .with_credentials(string_arg("walletuser")?, string_arg("walletpassword")?);

    let mut classify = ClassifyConfig::default();
    if let Some(seconds) = matches.get_one::<u64>("call-timeout") {
        classify = classify.with_call_timeout(Duration::from_secs(*seconds));
    }
    if let Some(max_concurrent_lookups) = matches.get_one::<NonZeroUsize>("max-concurrent-lookups") {
        classify = classify.with_max_concurrent_lookups(*max_concurrent_lookups);
    }

    let mut builder = StakepooldConfig::build();
    builder
        .set_node(node)
        .set_wallet(wallet)
        .set_classify_config(classify);
    if let Some(policy) = matches.get_one::<CompatibilityPolicy>("version-policy") {
        builder.set_compatibility_policy(*policy);
    }
    if let Some(seconds) = matches.get_one::<u64>("refresh-interval") {
        builder.set_refresh_interval(Duration::from_secs(*seconds));
    }
    if let Some(min_ticket_fee) = matches.get_one::<i64>("min-ticket-fee") {
        builder.set_min_ticket_fee(*min_ticket_fee);
    }
    if let Some(path) = matches.get_one::<PathBuf>("voting-config") {
        builder.set_voting_config_path(path.clone());
    }
    if let Some(path) = matches.get_one::<PathBuf>("low-fee-tickets") {
        builder.set_low_fee_tickets_path(path.clone());
    }
    if let Some(dir) = matches.get_one::<PathBuf>("data-dir") {
        builder.set_data_dir(dir.clone());
    }

    Ok(builder.create())
}

/// Loads the pool tables, connects to both peers and refreshes tickets until Ctrl-C.
pub async fn run(config: StakepooldConfig) -> Result<(), StakepooldError> {
    if let Err(e) = log4rs::init_config(config.get_log_config()?) {
        warn!("File logging disabled. {e}");
    }
    info!("Starting stakepoold {}", env!("CARGO_PKG_VERSION"));

    let context = Arc::new(AppContext::new());
    if let Some(path) = &config.voting_config_path {
        context.set_user_voting_config(load_voting_config(path)?);
    }
    if let Some(path) = &config.low_fee_tickets_path {
        context.set_low_fee_overrides(load_low_fee_tickets(path)?);
    }

    let service = Service::connect(config, context).await?;
    service
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Unable to listen for Ctrl-C. {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
}

/// Parses arguments and runs the daemon to completion.
pub fn run_cli() {
    let config = match fill_config(&build_clap_app().get_matches()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error filling config: {e}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run(config)) {
        error!("{e}");
        eprintln!("stakepoold stopped. {e}");
        std::process::exit(1);
    }
}
