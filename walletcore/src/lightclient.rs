//! The client the command layer drives: one wallet, the chain source it syncs from and
//! the state of the background work running on its behalf.

use std::{
    io::{self, Error, ErrorKind},
    sync::{Arc, PoisonError},
};

use json::{object, JsonValue};
use lazy_static::lazy_static;
use log::debug;
use tokio::sync::{watch, Mutex, RwLock};

use crate::{
    chain::{ChainError, ChainSource},
    config::WalletConfig,
    scan::sync_status::SyncStatus,
    wallet::{propose::ProposalId, LightWallet, WalletBase},
};

pub mod describe;
pub mod keys;
pub mod save;
pub mod send;
pub mod sync;

/// Result of a completed sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncResult {
    pub success: bool,
    pub latest_block: u64,
    pub total_blocks_synced: u64,
}

impl SyncResult {
    pub fn to_json(&self) -> JsonValue {
        object! {
            "result" => if self.success { "success" } else { "failure" },
            "latest_block" => self.latest_block,
            "total_blocks_synced" => self.total_blocks_synced,
        }
    }
}

lazy_static! {
    static ref LOG_HANDLE: std::sync::Mutex<Option<log4rs::Handle>> = std::sync::Mutex::new(None);
}

pub struct LightClient {
    pub(crate) config: WalletConfig,
    pub wallet: LightWallet,

    chain: Arc<dyn ChainSource>,

    sync_lock: Arc<Mutex<()>>,
    save_lock: Mutex<()>,

    sync_status: watch::Sender<SyncStatus>,
    interrupt_sync: Arc<RwLock<bool>>,

    /// The proposal a bare `confirm` applies to.
    current_proposal: Mutex<Option<ProposalId>>,
}

impl LightClient {
    /// Sends `log` records to the rolling logfile in `config`'s wallet directory and
    /// `tracing` spans to stderr. A later call moves the logfile to the new directory.
    pub fn init_logging(config: &WalletConfig) -> io::Result<()> {
        let log_config = config.get_log_config()?;
        let mut slot = LOG_HANDLE.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(handle) => handle.set_config(log_config),
            None => {
                // Another subscriber may already be installed by the embedding process.
                let _ = tracing::subscriber::set_global_default(
                    tracing_subscriber::fmt().with_writer(io::stderr).finish(),
                );
                let handle = log4rs::init_config(log_config)
                    .map_err(|e| Error::new(ErrorKind::Other, e))?;
                slot.replace(handle);
            }
        }
        Ok(())
    }

    pub fn create_from_wallet(wallet: LightWallet, chain: Arc<dyn ChainSource>) -> Self {
        let (sync_status, _) = watch::channel(SyncStatus::default());
        LightClient {
            config: wallet.config().clone(),
            wallet,
            chain,
            sync_lock: Arc::new(Mutex::new(())),
            save_lock: Mutex::new(()),
            sync_status,
            interrupt_sync: Arc::new(RwLock::new(false)),
            current_proposal: Mutex::new(None),
        }
    }

    /// Creates a wallet from `wallet_base` and saves it. Refuses to replace an existing
    /// wallet file unless `overwrite` is set.
    pub async fn new_from_wallet_base_async(
        wallet_base: WalletBase,
        config: &WalletConfig,
        chain: Arc<dyn ChainSource>,
        birthday: u64,
        overwrite: bool,
    ) -> io::Result<Self> {
        if !overwrite && config.wallet_exists() {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!(
                    "Cannot create a new wallet from seed, because a wallet already exists at:\n{:?}",
                    config.get_wallet_path()?.as_os_str()
                ),
            ));
        }
        let lightclient = LightClient::create_from_wallet(
            LightWallet::new(config.clone(), wallet_base, birthday)?,
            chain,
        );
        lightclient
            .do_save()
            .await
            .map_err(|e| Error::new(ErrorKind::InvalidData, e))?;

        debug!("Created new wallet!");
        Ok(lightclient)
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<dyn ChainSource> {
        &self.chain
    }

    pub fn get_server(&self) -> http::Uri {
        self.config.get_lightwalletd_uri()
    }

    pub async fn get_latest_block_height(&self) -> Result<u64, ChainError> {
        Ok(self.chain.get_latest_block().await?.height)
    }

    pub async fn do_info(&self) -> JsonValue {
        match self.chain.get_info().await {
            Ok(info) => object! {
                "version" => info.version,
                "git_commit" => crate::git_commit(),
                "server_uri" => self.get_server().to_string(),
                "vendor" => info.vendor,
                "taddr_support" => info.taddr_support,
                "chain_name" => info.chain_name,
                "sapling_activation_height" => info.sapling_activation_height,
                "consensus_branch_id" => info.consensus_branch_id,
                "latest_block_height" => info.block_height,
            },
            Err(e) => object! { "error" => e.to_string() },
        }
    }

    pub async fn do_height(&self) -> JsonValue {
        object! { "height" => self.wallet.last_synced_height().await }
    }

    /// Fetches the ZEC price from the server and records it for transactions the wallet
    /// sees from now on.
    pub async fn do_update_price(&self) -> Result<f64, ChainError> {
        let price = self.chain.get_zec_price().await?;
        self.wallet.set_latest_zec_price(price).await;
        Ok(price)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::LightClient;
    use crate::{
        chain::fake_chain::FakeChain,
        config::{ChainType, WalletConfig},
        wallet::{test_support::TEST_SEED, WalletBase},
    };

    /// A client on a fresh regtest chain, with its wallet file in `dir`.
    pub(crate) async fn test_client(dir: &TempDir) -> (Arc<LightClient>, Arc<FakeChain>) {
        let chain = Arc::new(FakeChain::new(ChainType::Regtest));
        let config = WalletConfig::create_unconnected(ChainType::Regtest, Some(dir.path().to_path_buf()));
        let client = LightClient::new_from_wallet_base_async(
            WalletBase::SeedBytes(TEST_SEED),
            &config,
            chain.clone(),
            1,
            false,
        )
        .await
        .unwrap();
        (Arc::new(client), chain)
    }

    pub(crate) async fn first_address(client: &LightClient) -> String {
        client
            .wallet
            .keys()
            .read()
            .await
            .addresses
            .iter()
            .next()
            .unwrap()
            .encoded
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{test_support::*, *};
    use crate::wallet::test_support::TEST_SEED;

    #[tokio::test]
    async fn info_reports_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let (client, chain) = test_client(&dir).await;
        chain.mine_empty_blocks(4);

        let info = client.do_info().await;
        assert_eq!(info["chain_name"], "regtest");
        assert_eq!(info["latest_block_height"], 4);
        assert!(info.has_key("git_commit"));
        assert_eq!(info["server_uri"], client.config().lightwalletd_uri.to_string());
        assert_eq!(client.do_height().await["height"], 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn receives_after_a_price_update_carry_the_price() {
        let dir = tempfile::tempdir().unwrap();
        let (client, chain) = test_client(&dir).await;
        let address = first_address(&client).await;
        assert!(client.do_update_price().await.is_err());

        chain.set_zec_price(Some(28.75));
        assert_eq!(client.do_update_price().await.unwrap(), 28.75);
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        chain.set_block_time(Some(now as u32));
        chain.fund(&address, 50_000, None).unwrap();
        chain.mine_block();
        client.do_sync().await.unwrap();

        let transfers = client.value_transfers().await;
        let received = transfers.iter().next().unwrap();
        assert_eq!(received.value, 50_000);
        assert_eq!(received.zec_price, Some(28.75));
    }

    #[tokio::test]
    async fn existing_wallet_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let (client, chain) = test_client(&dir).await;

        let again = LightClient::new_from_wallet_base_async(
            WalletBase::SeedBytes(TEST_SEED),
            client.config(),
            chain.clone(),
            1,
            false,
        )
        .await;
        assert_eq!(again.err().unwrap().kind(), ErrorKind::AlreadyExists);

        assert!(LightClient::new_from_wallet_base_async(
            WalletBase::FreshEntropy,
            client.config(),
            chain,
            1,
            true,
        )
        .await
        .is_ok());
    }
}
