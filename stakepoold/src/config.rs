//! `StakepooldConfig`
//!
//! Configuration of the RPC peers, the ticket refresh service and logging.

use std::{
    fmt,
    io::{self, Error},
    path::{Path, PathBuf},
    time::Duration,
};

use log::LevelFilter;
use log4rs::{
    Config,
    append::rolling_file::{
        RollingFileAppender,
        policy::compound::{
            CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
        },
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

use rpc_version::{CompatibilityPolicy, Semver};
use ticket_sync::ClassifyConfig;

/// Oldest node JSON-RPC API this pool can use.
pub const REQUIRED_NODE_API: Semver = Semver::new(5, 1, 0);
/// Oldest wallet JSON-RPC API this pool is tested against.
pub const REQUIRED_WALLET_API: Semver = Semver::new(6, 0, 0);
/// Node RPC listener on the local host.
pub const DEFAULT_NODE_HOST: &str = "127.0.0.1:9109";
/// Wallet RPC listener on the local host.
pub const DEFAULT_WALLET_HOST: &str = "127.0.0.1:9110";
/// Interval between scheduled ticket refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
/// Minimum ticket fee in atoms. Any ticket whose inputs cover its outputs passes.
pub const DEFAULT_MIN_TICKET_FEE: i64 = 0;
/// Log file created in the data directory.
pub const DEFAULT_LOGFILE_NAME: &str = "stakepoold.debug.log";
/// Certificate file name written by the node and the wallet.
pub const DEFAULT_CERT_NAME: &str = "rpc.cert";

/// Connection settings of one RPC peer.
#[derive(Clone, PartialEq, Eq)]
pub struct PeerConfig {
    /// `host:port` of the peer's RPC listener.
    pub host: String,
    /// RPC user.
    pub user: String,
    /// RPC password.
    pub password: String,
    /// PEM certificate of the peer. The only trust root of the session.
    pub cert_path: PathBuf,
    /// Oldest API version accepted from the peer.
    pub required_version: Semver,
}

impl PeerConfig {
    /// Creates settings for `host` with empty credentials.
    pub fn new(host: impl Into<String>, cert_path: PathBuf, required_version: Semver) -> Self {
        Self {
            host: host.into(),
            user: String::new(),
            password: String::new(),
            cert_path,
            required_version,
        }
    }

    /// Sets the RPC credentials.
    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }
}

impl fmt::Debug for PeerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("cert_path", &self.cert_path)
            .field("required_version", &self.required_version)
            .finish()
    }
}

/// Builder of a [`StakepooldConfig`]. Unset fields take their defaults in [`Self::create`].
#[derive(Clone, Debug, Default)]
pub struct StakepooldConfigBuilder {
    /// Node settings.
    pub node: Option<PeerConfig>,
    /// Wallet settings.
    pub wallet: Option<PeerConfig>,
    /// Rule deciding whether a peer's API version is accepted.
    pub compatibility_policy: CompatibilityPolicy,
    /// Interval between scheduled ticket refreshes.
    pub refresh_interval: Option<Duration>,
    /// Classification run settings.
    pub classify: ClassifyConfig,
    /// Minimum ticket fee in atoms.
    pub min_ticket_fee: Option<i64>,
    /// The directory where the logfile will be created. By default, this will be in ~/.stakepoold on Linux and the
    /// platform data directory on Windows and macOS.
    pub data_dir: Option<PathBuf>,
    /// The filename of the logfile. This will be created in the `data_dir`.
    pub logfile_name: Option<PathBuf>,
    /// JSON file holding the voting configuration table.
    pub voting_config_path: Option<PathBuf>,
    /// JSON file holding the low fee ticket whitelist.
    pub low_fee_tickets_path: Option<PathBuf>,
}

impl StakepooldConfigBuilder {
    /// Set the node settings.
    /// # Examples
    /// ```
    /// use stakepoold::config::{PeerConfig, REQUIRED_NODE_API, StakepooldConfigBuilder};
    /// let node = PeerConfig::new("10.0.0.2:9109", "node.cert".into(), REQUIRED_NODE_API);
    /// assert_eq!(StakepooldConfigBuilder::default().set_node(node).create().node.host, "10.0.0.2:9109");
    /// ```
    pub fn set_node(&mut self, node: PeerConfig) -> &mut Self {
        self.node = Some(node);
        self
    }

    /// Set the wallet settings.
    pub fn set_wallet(&mut self, wallet: PeerConfig) -> &mut Self {
        self.wallet = Some(wallet);
        self
    }

    /// Set the version compatibility policy applied to both peers.
    pub fn set_compatibility_policy(&mut self, policy: CompatibilityPolicy) -> &mut Self {
        self.compatibility_policy = policy;
        self
    }

    /// Set the interval between scheduled ticket refreshes.
    pub fn set_refresh_interval(&mut self, refresh_interval: Duration) -> &mut Self {
        self.refresh_interval = Some(refresh_interval);
        self
    }

    /// Set the classification run settings.
    pub fn set_classify_config(&mut self, classify: ClassifyConfig) -> &mut Self {
        self.classify = classify;
        self
    }

    /// Set the minimum ticket fee in atoms.
    pub fn set_min_ticket_fee(&mut self, min_ticket_fee: i64) -> &mut Self {
        self.min_ticket_fee = Some(min_ticket_fee);
        self
    }

    /// Set the data directory where the logfile will be stored.
    /// # Examples
    /// ```
    /// use stakepoold::config::StakepooldConfigBuilder;
    /// let dir = tempfile::TempDir::with_prefix("stakepoold_doc_test").unwrap().into_path();
    /// let config = StakepooldConfigBuilder::default().set_data_dir(dir.clone()).create();
    /// assert_eq!(config.data_dir.clone().unwrap(), dir);
    /// ```
    pub fn set_data_dir(&mut self, dir: PathBuf) -> &mut Self {
        self.data_dir = Some(dir);
        self
    }

    /// Set the logfile name.
    pub fn set_logfile_name(&mut self, logfile_name: PathBuf) -> &mut Self {
        self.logfile_name = Some(logfile_name);
        self
    }

    /// Set the voting configuration file.
    pub fn set_voting_config_path(&mut self, path: PathBuf) -> &mut Self {
        self.voting_config_path = Some(path);
        self
    }

    /// Set the low fee ticket whitelist file.
    pub fn set_low_fee_tickets_path(&mut self, path: PathBuf) -> &mut Self {
        self.low_fee_tickets_path = Some(path);
        self
    }

    /// Builds the config, filling unset fields with defaults.
    pub fn create(&self) -> StakepooldConfig {
        StakepooldConfig {
            node: self.node.clone().unwrap_or_else(|| {
                PeerConfig::new(
                    DEFAULT_NODE_HOST,
                    default_cert_path(".bitumd"),
                    REQUIRED_NODE_API,
                )
            }),
            wallet: self.wallet.clone().unwrap_or_else(|| {
                PeerConfig::new(
                    DEFAULT_WALLET_HOST,
                    default_cert_path(".bitumwallet"),
                    REQUIRED_WALLET_API,
                )
            }),
            compatibility_policy: self.compatibility_policy,
            refresh_interval: self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL),
            classify: self.classify.clone(),
            min_ticket_fee: self.min_ticket_fee.unwrap_or(DEFAULT_MIN_TICKET_FEE),
            data_dir: self.data_dir.clone(),
            logfile_name: self
                .logfile_name
                .clone()
                .unwrap_or_else(|| DEFAULT_LOGFILE_NAME.into()),
            voting_config_path: self.voting_config_path.clone(),
            low_fee_tickets_path: self.low_fee_tickets_path.clone(),
        }
    }
}

fn default_cert_path(app_dir: &str) -> PathBuf {
    let mut cert_path = dirs::home_dir().unwrap_or_default();
    cert_path.push(app_dir);
    cert_path.push(DEFAULT_CERT_NAME);
    cert_path
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn default_data_dir() -> io::Result<PathBuf> {
    let mut data_location = dirs::data_dir().ok_or_else(|| {
        Error::new(io::ErrorKind::NotFound, "Couldn't determine app data directory")
    })?;
    data_location.push("Stakepoold");
    Ok(data_location)
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn default_data_dir() -> io::Result<PathBuf> {
    let mut data_location = dirs::home_dir()
        .ok_or_else(|| Error::new(io::ErrorKind::NotFound, "Couldn't determine home directory"))?;
    data_location.push(".stakepoold");
    Ok(data_location)
}

/// Configuration of the stake pool daemon.
#[derive(Clone, Debug)]
pub struct StakepooldConfig {
    /// Node settings.
    pub node: PeerConfig,
    /// Wallet settings.
    pub wallet: PeerConfig,
    /// Rule deciding whether a peer's API version is accepted.
    pub compatibility_policy: CompatibilityPolicy,
    /// Interval between scheduled ticket refreshes.
    pub refresh_interval: Duration,
    /// Classification run settings.
    pub classify: ClassifyConfig,
    /// Minimum ticket fee in atoms.
    pub min_ticket_fee: i64,
    /// The directory where the logfile will be created.
    pub data_dir: Option<PathBuf>,
    /// The filename of the logfile. This will be created in the `data_dir`.
    pub logfile_name: PathBuf,
    /// JSON file holding the voting configuration table.
    pub voting_config_path: Option<PathBuf>,
    /// JSON file holding the low fee ticket whitelist.
    pub low_fee_tickets_path: Option<PathBuf>,
}

impl StakepooldConfig {
    /// Returns a builder with every field unset.
    #[must_use]
    pub fn build() -> StakepooldConfigBuilder {
        StakepooldConfigBuilder::default()
    }

    /// Returns the data directory, creating it if it doesn't exist.
    pub fn get_data_dir(&self) -> io::Result<Box<Path>> {
        let data_location = match &self.data_dir {
            Some(data_dir) => data_dir.clone(),
            None => default_data_dir()?,
        };

        std::fs::create_dir_all(&data_location)?;

        Ok(data_location.into_boxed_path())
    }

    /// Returns the path of the logfile.
    pub fn get_log_path(&self) -> io::Result<Box<Path>> {
        let mut log_path = self.get_data_dir()?.into_path_buf();
        log_path.push(&self.logfile_name);

        Ok(log_path.into_boxed_path())
    }

    /// Build the Logging config
    pub fn get_log_config(&self) -> io::Result<Config> {
        let window_size = 3; // log0, log1, log2
        let mut roller_pattern = self.get_data_dir()?.into_path_buf();
        roller_pattern.push("stakepoold-log{}");
        let fixed_window_roller = FixedWindowRoller::builder()
            .build(&roller_pattern.to_string_lossy(), window_size)
            .map_err(|e| Error::other(format!("{e}")))?;
        let size_limit = 5 * 1024 * 1024; // 5MB as max log file size to roll
        let size_trigger = SizeTrigger::new(size_limit);
        let compound_policy =
            CompoundPolicy::new(Box::new(size_trigger), Box::new(fixed_window_roller));

        Config::builder()
            .appender(
                Appender::builder()
                    .filter(Box::new(ThresholdFilter::new(LevelFilter::Info)))
                    .build(
                        "logfile",
                        Box::new(
                            RollingFileAppender::builder()
                                .encoder(Box::new(PatternEncoder::new("{d} {l}::{m}{n}")))
                                .build(self.get_log_path()?, Box::new(compound_policy))?,
                        ),
                    ),
            )
            .build(
                Root::builder()
                    .appender("logfile")
                    .build(LevelFilter::Debug),
            )
            .map_err(|e| Error::other(format!("{e}")))
    }
}
