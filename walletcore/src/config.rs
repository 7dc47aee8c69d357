//! Configuration for a wallet and the chain it follows.
use std::{
    io::{self, Error, ErrorKind},
    path::{Path, PathBuf},
};

use log::LevelFilter;
use log4rs::{
    append::rolling_file::{
        policy::compound::{
            roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
        },
        RollingFileAppender,
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};
use zcash_protocol::consensus::{
    BlockHeight, NetworkType, NetworkUpgrade, Parameters, MAIN_NETWORK, TEST_NETWORK,
};

pub const DEFAULT_LIGHTWALLETD_SERVER: &str = "https://mainnet.lightwalletd.com:9067";
pub const MAX_REORG: usize = 100;
pub const BATCH_SIZE: u64 = 100;
pub const DEFAULT_WALLET_NAME: &str = "walletcore-wallet.dat";
pub const DEFAULT_LOGFILE_NAME: &str = "walletcore.debug.log";
pub const DEFAULT_MIN_CONFIRMATIONS: u32 = 1;
/// Blocks after the target height at which an unmined transaction expires.
pub const TRANSACTION_EXPIRY_DELTA: u32 = 40;

/// Normalises a user supplied server string: adds a scheme when missing and the
/// default lightwalletd port when none is given.
pub fn construct_lightwalletd_uri(server: Option<String>) -> Result<http::Uri, http::uri::InvalidUri> {
    match server {
        Some(s) => {
            let mut s = if s.starts_with("http") {
                s
            } else {
                "http://".to_string() + &s
            };
            let uri: http::Uri = s.parse()?;
            if uri.port().is_none() {
                s += ":9067";
            }
            s
        }
        None => DEFAULT_LIGHTWALLETD_SERVER.to_string(),
    }
    .parse()
}

/// Configuration data that is necessary and sufficient for the creation of a LightClient.
#[derive(Clone, Debug)]
pub struct WalletConfig {
    pub lightwalletd_uri: http::Uri,
    pub chain: ChainType,
    /// Confirmations a note needs before it is spendable.
    pub min_confirmations: u32,
    /// The directory where the wallet and logfiles will be created. By default, this will be in ~/.zcash on Linux and %APPDATA%\Zcash on Windows.
    pub wallet_dir: Option<PathBuf>,
    /// The filename of the wallet. This will be created in the `wallet_dir`.
    pub wallet_name: PathBuf,
    /// The filename of the logfile. This will be created in the `wallet_dir`.
    pub logfile_name: PathBuf,
}

impl WalletConfig {
    // Create an unconnected (to any server) config to test for local wallet etc...
    pub fn create_unconnected(chain: ChainType, dir: Option<PathBuf>) -> WalletConfig {
        WalletConfig {
            lightwalletd_uri: http::Uri::default(),
            chain,
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            wallet_dir: dir,
            wallet_name: DEFAULT_WALLET_NAME.into(),
            logfile_name: DEFAULT_LOGFILE_NAME.into(),
        }
    }

    pub fn sapling_activation_height(&self) -> u64 {
        self.chain
            .activation_height(NetworkUpgrade::Sapling)
            .map(u64::from)
            .unwrap_or(1)
    }

    /// Build the Logging config
    pub fn get_log_config(&self) -> io::Result<Config> {
        let log_path = self.get_log_path()?;
        let window_size = 3; // log.0, log.1, log.2
        let fixed_window_roller = FixedWindowRoller::builder()
            .build(&format!("{}.{{}}", log_path.display()), window_size)
            .map_err(|e| Error::new(ErrorKind::Other, format!("{}", e)))?;
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
                                .build(log_path, Box::new(compound_policy))?,
                        ),
                    ),
            )
            .build(
                Root::builder()
                    .appender("logfile")
                    .build(LevelFilter::Debug),
            )
            .map_err(|e| Error::new(ErrorKind::Other, format!("{}", e)))
    }

    pub fn get_wallet_dir(&self) -> io::Result<Box<Path>> {
        let mut zcash_data_location;
        // If there's some --data-dir path provided, use it
        if let Some(dir) = &self.wallet_dir {
            zcash_data_location = dir.clone();
        } else {
            #[cfg(any(target_os = "macos", target_os = "windows"))]
            {
                zcash_data_location = dirs::data_dir().ok_or_else(|| {
                    Error::new(ErrorKind::NotFound, "Couldn't determine app data directory!")
                })?;
                zcash_data_location.push("Zcash");
            }

            #[cfg(not(any(target_os = "macos", target_os = "windows")))]
            {
                zcash_data_location = dirs::home_dir().ok_or_else(|| {
                    Error::new(ErrorKind::NotFound, "Couldn't determine home directory!")
                })?;
                zcash_data_location.push(".zcash");
            }

            match &self.chain {
                ChainType::Testnet => zcash_data_location.push("testnet3"),
                ChainType::Regtest => zcash_data_location.push("regtest"),
                ChainType::Mainnet => {}
            };
        }

        std::fs::create_dir_all(&zcash_data_location).map_err(|e| {
            log::error!("Couldn't create zcash directory! {}", e);
            e
        })?;

        Ok(zcash_data_location.into_boxed_path())
    }

    pub fn get_lightwalletd_uri(&self) -> http::Uri {
        self.lightwalletd_uri.clone()
    }

    pub fn get_wallet_path(&self) -> io::Result<Box<Path>> {
        let mut wallet_location = self.get_wallet_dir()?.into_path_buf();
        wallet_location.push(&self.wallet_name);

        Ok(wallet_location.into_boxed_path())
    }

    pub fn wallet_exists(&self) -> bool {
        self.get_wallet_path()
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    pub fn get_log_path(&self) -> io::Result<Box<Path>> {
        let mut log_path = self.get_wallet_dir()?.into_path_buf();
        log_path.push(&self.logfile_name);

        Ok(log_path.into_boxed_path())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainType {
    Testnet,
    Regtest,
    Mainnet,
}

impl ChainType {
    pub fn to_zcash_address_network(&self) -> zcash_address::Network {
        self.network_type()
    }
}

impl std::fmt::Display for ChainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ChainType::*;
        let name = match self {
            Testnet => "test",
            Regtest => "regtest",
            Mainnet => "main",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for ChainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" | "mainnet" => Ok(ChainType::Mainnet),
            "test" | "testnet" => Ok(ChainType::Testnet),
            "regtest" => Ok(ChainType::Regtest),
            _ => Err(format!("unknown chain {s}")),
        }
    }
}

use ChainType::*;
impl Parameters for ChainType {
    fn network_type(&self) -> NetworkType {
        match self {
            Mainnet => NetworkType::Main,
            Testnet => NetworkType::Test,
            Regtest => NetworkType::Regtest,
        }
    }

    fn activation_height(&self, nu: NetworkUpgrade) -> Option<BlockHeight> {
        match self {
            Mainnet => MAIN_NETWORK.activation_height(nu),
            Testnet => TEST_NETWORK.activation_height(nu),
            Regtest => Some(BlockHeight::from_u32(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(None, "https", "mainnet.lightwalletd.com", 9067 ; "default server")]
    #[test_case(Some("lwd.example.com"), "http", "lwd.example.com", 9067 ; "scheme and port added")]
    #[test_case(Some("https://lwd.example.com:443"), "https", "lwd.example.com", 443 ; "explicit port kept")]
    fn lightwalletd_uri(server: Option<&str>, scheme: &str, host: &str, port: u16) {
        let uri = construct_lightwalletd_uri(server.map(str::to_string)).unwrap();
        assert_eq!(uri.scheme_str(), Some(scheme));
        assert_eq!(uri.host(), Some(host));
        assert_eq!(uri.port_u16(), Some(port));
    }

    #[test]
    fn regtest_activates_everything_at_one() {
        let config = WalletConfig::create_unconnected(ChainType::Regtest, None);
        assert_eq!(config.sapling_activation_height(), 1);
        assert_eq!(ChainType::Regtest.to_string(), "regtest");
    }

    #[test]
    fn wallet_path_lives_in_wallet_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            WalletConfig::create_unconnected(ChainType::Testnet, Some(dir.path().to_path_buf()));
        assert_eq!(
            config.get_wallet_path().unwrap().to_path_buf(),
            dir.path().join(DEFAULT_WALLET_NAME)
        );
        assert!(!config.wallet_exists());
    }
}
