//! Scanning a range of blocks for everything that involves the wallet.
//!
//! A batch is scanned against a snapshot of the wallet ([`ScanContext`]) and produces a
//! [`ScannedBatch`] that the wallet applies in one step. Nothing the scan finds touches
//! the wallet until the whole batch has succeeded.

use std::collections::{BTreeMap, HashSet};

use tokio::sync::watch;
use tracing::{debug, instrument};
use zcash_protocol::{PoolType, TxId};

use walletcore_status::{confirmation_status::ConfirmationStatus, spend_status::SpendStatus};

use crate::{
    chain::{
        compact_formats::CompactBlock,
        transaction::{OutPoint, TransparentScript},
        ChainError, ChainSource,
    },
    config::ChainType,
    wallet::{
        address::AddressRegistry,
        data::{BlockData, WalletZecPriceInfo},
        keys::ViewingKey,
        notes::{OutputId, WalletOutput},
        transaction_record::TransactionRecord,
        LightWallet, WalletOptions,
    },
};

use self::{
    sync_status::SyncStatus,
    trial_decryptions::{trial_decrypt_blocks, DecryptedNote},
};

pub mod full_transactions;
pub mod sync_status;
pub mod trial_decryptions;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// The first block of a batch does not build on the last block the wallet scanned.
    #[error("block {height} does not continue the wallet's chain")]
    PrevHashMismatch { height: u64 },
    #[error("server returned block {found} where {expected} was expected")]
    BlockGap { expected: u64, found: u64 },
    #[error("server returned {returned} of the blocks {start}..={end}")]
    IncompleteRange {
        start: u64,
        end: u64,
        returned: usize,
    },
    #[error("could not parse transaction {txid}: {reason}")]
    MalformedTransaction { txid: TxId, reason: String },
    #[error(transparent)]
    Chain(#[from] ChainError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("Server's latest block({server}) is behind ours({wallet})")]
    ServerBehind { server: u64, wallet: u64 },
    #[error("reorg deeper than {0} blocks")]
    ReorgTooDeep(usize),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("could not save wallet: {0}")]
    Save(String),
}

impl SyncError {
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Chain(e) | SyncError::Scan(ScanError::Chain(e)) => e.is_transient(),
            SyncError::ServerBehind { .. }
            | SyncError::Scan(ScanError::IncompleteRange { .. }) => true,
            _ => false,
        }
    }
}

/// Every receiver the wallet can be paid at, with the address that owns it.
#[derive(Debug, Clone, Default)]
pub struct WalletReceivers {
    pub orchard: Vec<([u8; 43], String)>,
    pub sapling: Vec<([u8; 43], String)>,
    pub transparent: Vec<(TransparentScript, String)>,
}

impl WalletReceivers {
    pub fn from_registry(addresses: &AddressRegistry) -> Self {
        let mut receivers = WalletReceivers::default();
        for address in addresses.iter() {
            if let Some(r) = address.orchard {
                receivers.orchard.push((r, address.encoded.clone()));
            }
            if let Some(r) = address.sapling {
                receivers.sapling.push((r, address.encoded.clone()));
            }
            if let Some(r) = address.transparent {
                receivers
                    .transparent
                    .push((TransparentScript::P2pkh(r), address.encoded.clone()));
            }
        }
        receivers
    }

    pub fn owns_script(&self, script: &TransparentScript) -> Option<&String> {
        self.transparent
            .iter()
            .find(|(s, _)| s == script)
            .map(|(_, address)| address)
    }

    pub fn owns_shielded(&self, receiver: &[u8; 43]) -> bool {
        self.orchard
            .iter()
            .chain(self.sapling.iter())
            .any(|(r, _)| r == receiver)
    }
}

/// What a batch scan needs to know about the wallet, taken before the batch starts.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub chain: ChainType,
    pub viewing_key: ViewingKey,
    pub receivers: WalletReceivers,
    pub transparent_addresses: Vec<String>,
    pub nullifiers: HashSet<[u8; 32]>,
    pub outpoints: HashSet<OutPoint>,
    pub options: WalletOptions,
    pub price: WalletZecPriceInfo,
    /// The block the batch has to build on.
    pub prev_block: Option<BlockData>,
}

impl ScanContext {
    pub async fn from_wallet(wallet: &LightWallet) -> Self {
        let keys = wallet.keys.read().await;
        let prev_block = wallet.last_synced_block().await;
        let transactions = wallet.transactions.read().await;
        ScanContext {
            chain: keys.chain(),
            viewing_key: keys.viewing_key().clone(),
            receivers: WalletReceivers::from_registry(&keys.addresses),
            transparent_addresses: keys.addresses.transparent_addresses(keys.chain()),
            nullifiers: transactions.nullifiers(),
            outpoints: transactions.outpoints(),
            options: *wallet.wallet_options.read().await,
            price: wallet.price.read().await.clone(),
            prev_block,
        }
    }
}

/// Everything one batch found, ready for [`LightWallet::apply_batch`].
#[derive(Debug, Default)]
pub struct ScannedBatch {
    pub records: Vec<TransactionRecord>,
    /// The scanned blocks, ascending.
    pub blocks: Vec<BlockData>,
}

/// Checks that `blocks` is exactly `start..=end` and builds on the wallet's last block.
fn check_continuity(
    blocks: &[CompactBlock],
    start: u64,
    end: u64,
    prev_block: Option<&BlockData>,
) -> Result<(), ScanError> {
    if let Some(prev) = prev_block {
        if prev.height + 1 != start {
            return Err(ScanError::BlockGap {
                expected: prev.height + 1,
                found: start,
            });
        }
    }
    let mut expected_prev = prev_block.map(|prev| prev.hash);
    for (offset, block) in blocks.iter().enumerate() {
        let expected_height = start + offset as u64;
        if block.height != expected_height {
            return Err(ScanError::BlockGap {
                expected: expected_height,
                found: block.height,
            });
        }
        if expected_prev.is_some_and(|hash| hash != block.prev_hash) {
            return Err(ScanError::PrevHashMismatch {
                height: block.height,
            });
        }
        expected_prev = Some(block.hash);
    }
    if blocks.len() as u64 != end + 1 - start {
        return Err(ScanError::IncompleteRange {
            start,
            end,
            returned: blocks.len(),
        });
    }
    Ok(())
}

struct RecordBuilder<'a> {
    records: BTreeMap<TxId, TransactionRecord>,
    price: &'a WalletZecPriceInfo,
}

impl RecordBuilder<'_> {
    fn record(&mut self, txid: TxId, height: u64, datetime: u64) -> &mut TransactionRecord {
        let price = self.price.price_at(datetime);
        self.records.entry(txid).or_insert_with(|| {
            let mut record = TransactionRecord::new(
                txid,
                ConfirmationStatus::Confirmed((height as u32).into()),
                datetime,
            );
            record.zec_price = price;
            record
        })
    }

    fn add_note(&mut self, note: DecryptedNote) {
        let record = self.record(note.txid, note.height, note.block_time as u64);
        record.outputs.push(WalletOutput {
            output_id: OutputId {
                txid: note.txid,
                pool: PoolType::Shielded(note.protocol),
                index: note.output_index,
            },
            address: note.address,
            value: note.value,
            memo: note.memo,
            is_change: false,
            nullifier: Some(note.nullifier),
            witnessed_height: None,
            spend: SpendStatus::Unspent,
        });
    }
}

/// Scans blocks `start..=end`. Progress is published on `status` as the phases advance.
#[instrument(skip(source, context, status))]
pub async fn scan_batch(
    source: &dyn ChainSource,
    context: &ScanContext,
    start: u64,
    end: u64,
    status: &watch::Sender<SyncStatus>,
) -> Result<ScannedBatch, ScanError> {
    let blocks = source.get_block_range(start, end).await?;
    check_continuity(&blocks, start, end, context.prev_block.as_ref())?;
    status.send_modify(|s| s.blocks_done = blocks.len() as u64);
    let block_times: BTreeMap<u64, u32> = blocks.iter().map(|b| (b.height, b.time)).collect();

    let found = trial_decrypt_blocks(
        &blocks,
        &context.receivers,
        &context.viewing_key,
        &context.options,
        || status.send_modify(|s| s.trial_dec_done += 1),
    );
    debug!("trial decryption found {} notes", found.len());

    let mut nullifiers = context.nullifiers.clone();
    nullifiers.extend(found.iter().map(|note| note.nullifier));

    let mut builder = RecordBuilder {
        records: BTreeMap::new(),
        price: &context.price,
    };
    for note in found {
        builder.add_note(note);
    }
    for block in &blocks {
        for tx in &block.vtx {
            let spent: Vec<[u8; 32]> = tx
                .spends
                .iter()
                .map(|spend| spend.nullifier)
                .filter(|nf| nullifiers.contains(nf))
                .collect();
            if !spent.is_empty() {
                builder
                    .record(tx.txid, block.height, block.time as u64)
                    .spent_nullifiers
                    .extend(spent);
            }
        }
    }

    full_transactions::scan_transparent(source, context, start, end, &block_times, &mut builder)
        .await?;
    full_transactions::complete_outgoing(source, context, &mut builder.records).await?;

    let blocks = blocks
        .iter()
        .map(|b| BlockData {
            height: b.height,
            hash: b.hash,
        })
        .collect();
    Ok(ScannedBatch {
        records: builder.records.into_values().collect(),
        blocks,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        chain::{compact_formats::BlockHash, fake_chain::FakeChain},
        wallet::test_support::test_wallet,
    };

    #[test]
    fn continuity_is_checked_against_the_last_scanned_block() {
        let block = |height: u64, prev: u8, hash: u8| CompactBlock {
            height,
            hash: BlockHash([hash; 32]),
            prev_hash: BlockHash([prev; 32]),
            time: 0,
            vtx: vec![],
        };
        let prev = BlockData {
            height: 4,
            hash: BlockHash([4; 32]),
        };
        assert!(check_continuity(&[block(5, 4, 5), block(6, 5, 6)], 5, 6, Some(&prev)).is_ok());
        assert!(check_continuity(&[block(1, 0, 1)], 1, 1, None).is_ok());
        assert_eq!(
            check_continuity(&[block(5, 9, 5)], 5, 5, Some(&prev)),
            Err(ScanError::PrevHashMismatch { height: 5 })
        );
        assert_eq!(
            check_continuity(&[block(5, 4, 5), block(7, 5, 7)], 5, 7, Some(&prev)),
            Err(ScanError::BlockGap {
                expected: 6,
                found: 7
            })
        );
        // A range that does not start right above the last scanned block.
        assert_eq!(
            check_continuity(&[block(9, 8, 9)], 9, 9, Some(&prev)),
            Err(ScanError::BlockGap {
                expected: 5,
                found: 9
            })
        );
        assert_eq!(
            check_continuity(&[block(5, 4, 5), block(6, 5, 6)], 5, 10, Some(&prev)),
            Err(ScanError::IncompleteRange {
                start: 5,
                end: 10,
                returned: 2
            })
        );
        assert_eq!(
            check_continuity(&[], 5, 10, Some(&prev)),
            Err(ScanError::IncompleteRange {
                start: 5,
                end: 10,
                returned: 0
            })
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_finds_notes_and_their_spends() {
        let wallet = test_wallet(None);
        let chain = Arc::new(FakeChain::new(ChainType::Regtest));
        let address = wallet.keys.read().await.addresses.iter().next().unwrap().encoded.clone();
        chain.fund(&address, 50_000, Some("first")).unwrap();
        chain.mine_block();
        chain.mine_empty_blocks(2);

        let context = ScanContext::from_wallet(&wallet).await;
        let (status, _) = watch::channel(SyncStatus::default());
        let batch = scan_batch(chain.as_ref(), &context, 1, 3, &status).await.unwrap();

        assert_eq!(batch.blocks.len(), 3);
        assert_eq!(batch.records.len(), 1);
        let record = &batch.records[0];
        assert_eq!(record.outputs[0].value, 50_000);
        assert_eq!(record.outputs[0].memo.as_deref(), Some("first"));
        assert_eq!(record.status, ConfirmationStatus::Confirmed(1.into()));
        assert_eq!(status.borrow().trial_dec_done, 3);
    }
}
