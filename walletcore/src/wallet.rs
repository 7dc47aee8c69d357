//! In-memory wallet state and the operations on it that do not touch the network.
//!
//! Lock order, where more than one is held: `proposals`, `keys`, `blocks`,
//! `transactions`.

use std::{
    fmt,
    io::{self, Read, Write},
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::SystemTime,
};

use bip0039::Mnemonic;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{info, warn};
use rand::{rngs::OsRng, RngCore};
use tokio::sync::{Mutex, RwLock};
use zcash_encoding::Optional;

use crate::config::{WalletConfig, MAX_REORG};

use self::{
    address::ReceiverSelection,
    data::{BlockData, WalletZecPriceInfo},
    keys::WalletCapability,
    propose::ProposalStore,
    send::SendProgress,
    transaction_record::TransactionRecord,
    tx_map::TxMap,
};

pub mod address;
pub mod data;
pub mod error;
pub mod keys;
pub mod note_encryption;
pub mod notes;
pub mod transaction_record;
pub mod tx_map;

//these mods contain pieces of the impl LightWallet
pub mod balance;
pub mod describe;
pub mod disk;
pub mod propose;
pub mod send;

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Which memos are kept when scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoDownloadOption {
    NoMemos = 0,
    WalletMemos,
    AllMemos,
}

impl fmt::Display for MemoDownloadOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemoDownloadOption::NoMemos => "none",
            MemoDownloadOption::WalletMemos => "wallet",
            MemoDownloadOption::AllMemos => "all",
        })
    }
}

impl FromStr for MemoDownloadOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "false" => Ok(MemoDownloadOption::NoMemos),
            "wallet" | "true" => Ok(MemoDownloadOption::WalletMemos),
            "all" => Ok(MemoDownloadOption::AllMemos),
            _ => Err(format!(
                "Couldn't understand download_memos value {s}. Possible options are none, wallet or all"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletOptions {
    pub download_memos: MemoDownloadOption,
    /// Compact transactions with more outputs than this are not trial decrypted.
    pub transaction_filter_threshold: Option<u32>,
}

impl Default for WalletOptions {
    fn default() -> Self {
        WalletOptions {
            download_memos: MemoDownloadOption::WalletMemos,
            transaction_filter_threshold: None,
        }
    }
}

impl WalletOptions {
    pub const fn serialized_version() -> u64 {
        1
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let _external_version = reader.read_u64::<LittleEndian>()?;

        let download_memos = match reader.read_u8()? {
            0 => MemoDownloadOption::NoMemos,
            1 => MemoDownloadOption::WalletMemos,
            2 => MemoDownloadOption::AllMemos,
            v => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Bad download option {}", v),
                ));
            }
        };
        let transaction_filter_threshold =
            Optional::read(reader, |mut r| r.read_u32::<LittleEndian>())?;

        Ok(Self {
            download_memos,
            transaction_filter_threshold,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(Self::serialized_version())?;

        writer.write_u8(self.download_memos as u8)?;
        Optional::write(writer, self.transaction_filter_threshold, |mut w, filter| {
            w.write_u32::<LittleEndian>(filter)
        })
    }
}

/// Data used to initialize new instance of LightWallet
pub enum WalletBase {
    FreshEntropy,
    SeedBytes([u8; 32]),
    MnemonicPhrase(String),
    Mnemonic(Mnemonic),
    /// Unified full viewing key
    Ufvk(String),
}

impl WalletBase {
    pub fn from_string(base: String) -> WalletBase {
        if base.starts_with("uview") {
            WalletBase::Ufvk(base)
        } else {
            WalletBase::MnemonicPhrase(base)
        }
    }
}

/// In-memory wallet data struct
pub struct LightWallet {
    // The block at which this wallet was born. Rescans
    // will start from here.
    birthday: AtomicU64,

    pub(crate) keys: RwLock<WalletCapability>,

    /// The last scanned blocks, highest first, used if something gets re-orged
    pub(crate) blocks: RwLock<Vec<BlockData>>,

    pub(crate) transactions: RwLock<TxMap>,

    pub wallet_options: RwLock<WalletOptions>,

    /// Proposals awaiting confirmation
    pub(crate) proposals: Mutex<ProposalStore>,

    /// Progress of an outgoing transaction
    send_progress: RwLock<SendProgress>,

    /// The current price of ZEC. (time_fetched, price in USD)
    pub price: RwLock<WalletZecPriceInfo>,

    pub(crate) config: WalletConfig,
}

impl LightWallet {
    pub fn new(config: WalletConfig, base: WalletBase, birthday: u64) -> io::Result<Self> {
        let mut keys = match base {
            WalletBase::FreshEntropy => {
                let mut seed_bytes = [0u8; 32];
                OsRng.fill_bytes(&mut seed_bytes);
                return Self::new(config, WalletBase::SeedBytes(seed_bytes), birthday);
            }
            WalletBase::SeedBytes(seed_bytes) => {
                let mnemonic = Mnemonic::from_entropy(seed_bytes.to_vec()).map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Error parsing phrase: {}", e),
                    )
                })?;
                return Self::new(config, WalletBase::Mnemonic(mnemonic), birthday);
            }
            WalletBase::MnemonicPhrase(phrase) => {
                let mnemonic = Mnemonic::<bip0039::English>::from_phrase(phrase.trim())
                    .map_err(|e| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("Error parsing phrase: {}", e),
                        )
                    })?;
                return Self::new(config, WalletBase::Mnemonic(mnemonic), birthday);
            }
            WalletBase::Mnemonic(mnemonic) => {
                WalletCapability::new_from_phrase(config.chain, &mnemonic, 0)
            }
            WalletBase::Ufvk(ufvk) => WalletCapability::new_from_ufvk(config.chain, &ufvk)
                .map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Error parsing UFVK: {}", e),
                    )
                })?,
        };

        if let Err(e) = keys.new_address(ReceiverSelection::all()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("could not create initial address: {e}"),
            ));
        }

        Ok(Self::from_parts(
            config,
            keys,
            vec![],
            TxMap::default(),
            WalletOptions::default(),
            birthday,
            WalletZecPriceInfo::default(),
        ))
    }

    pub(crate) fn from_parts(
        config: WalletConfig,
        keys: WalletCapability,
        blocks: Vec<BlockData>,
        transactions: TxMap,
        wallet_options: WalletOptions,
        birthday: u64,
        price: WalletZecPriceInfo,
    ) -> Self {
        let birthday = birthday.max(config.sapling_activation_height());
        LightWallet {
            birthday: AtomicU64::new(birthday),
            keys: RwLock::new(keys),
            blocks: RwLock::new(blocks),
            transactions: RwLock::new(transactions),
            wallet_options: RwLock::new(wallet_options),
            proposals: Mutex::new(ProposalStore::default()),
            send_progress: RwLock::new(SendProgress::new(0)),
            price: RwLock::new(price),
            config,
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn keys(&self) -> &RwLock<WalletCapability> {
        &self.keys
    }

    pub fn transactions(&self) -> &RwLock<TxMap> {
        &self.transactions
    }

    pub fn get_birthday(&self) -> u64 {
        self.birthday.load(Ordering::SeqCst)
    }

    /// The height sync has completed to; one below the birthday before the first batch.
    pub async fn last_synced_height(&self) -> u64 {
        self.blocks
            .read()
            .await
            .first()
            .map(|block| block.height)
            .unwrap_or_else(|| self.get_birthday().saturating_sub(1))
    }

    pub async fn last_synced_block(&self) -> Option<BlockData> {
        self.blocks.read().await.first().copied()
    }

    pub async fn set_download_memo(&self, value: MemoDownloadOption) {
        self.wallet_options.write().await.download_memos = value;
    }

    pub async fn set_latest_zec_price(&self, price: f64) {
        if price <= 0 as f64 {
            warn!("Tried to set a bad current zec price {}", price);
            return;
        }

        self.price.write().await.zec_price = Some((now(), price));
        info!("Set current ZEC Price to USD {}", price);
    }

    /// Clears all the scanned blocks and mined transactions, keeping only local pending
    /// ones. After this the wallet needs to be rescanned from its birthday.
    pub async fn clear_all(&self) {
        let mut blocks = self.blocks.write().await;
        let mut transactions = self.transactions.write().await;
        blocks.clear();
        transactions.clear_confirmed();
    }

    /// Applies one scanned batch: the transactions it found and the blocks it covered,
    /// ascending. Both are updated under their write locks together.
    pub async fn apply_batch(&self, found: Vec<TransactionRecord>, scanned: Vec<BlockData>) {
        let Some(end_height) = scanned.last().map(|b| b.height) else {
            return;
        };
        let mut blocks = self.blocks.write().await;
        let mut transactions = self.transactions.write().await;

        transactions.apply_batch(found, end_height);
        for block in scanned {
            blocks.insert(0, block);
        }
        blocks.truncate(MAX_REORG);
    }

    /// Forgets the block at `height` and everything above it.
    pub async fn invalidate_from(&self, height: u64) {
        let mut blocks = self.blocks.write().await;
        let mut transactions = self.transactions.write().await;
        blocks.retain(|b| b.height < height);
        transactions.invalidate_above(height.saturating_sub(1));
    }

    pub async fn remove_expired(&self) -> usize {
        let synced = self.last_synced_height().await;
        self.transactions.write().await.remove_expired(synced).len()
    }

    pub(crate) async fn set_send_progress(&self, progress: SendProgress) {
        *self.send_progress.write().await = progress;
    }

    pub async fn get_send_progress(&self) -> SendProgress {
        self.send_progress.read().await.clone()
    }

    pub(crate) async fn update_send_progress(&self, f: impl FnOnce(&mut SendProgress)) {
        f(&mut *self.send_progress.write().await);
    }
}
