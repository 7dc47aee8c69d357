//! An in-memory chain for tests: it mines blocks on demand, serves them as compact
//! blocks and accepts broadcast transactions into its mempool.

use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use futures::{future::BoxFuture, FutureExt};
use zcash_protocol::{PoolType, ShieldedProtocol, TxId};

use crate::{
    config::{ChainType, WalletConfig},
    wallet::{
        address::parse_address,
        note_encryption::{encode_memo, encrypt_note},
    },
};

use super::{
    compact_formats::{BlockHash, BlockId, CompactBlock, CompactTx, LightdInfo, RawTransaction},
    transaction::{OutPoint, ShieldedOutput, Transaction, TransparentScript, TxOut},
    ChainError, ChainSource,
};

const GENESIS_TIME: u32 = 1_700_000_000;
const BLOCK_INTERVAL: u32 = 75;

struct FakeBlock {
    compact: CompactBlock,
    transactions: Vec<Transaction>,
}

#[derive(Default)]
struct ChainState {
    /// Mined blocks, the first at height 1.
    blocks: Vec<FakeBlock>,
    mempool: Vec<Transaction>,
    sent: Vec<Transaction>,
    fail_blocks_from: Option<u64>,
    fail_taddr_fetch: bool,
    fetch_delay: Option<Duration>,
    /// Overrides the timestamp of blocks mined from now on.
    block_time: Option<u32>,
    zec_price: Option<f64>,
    /// Changes every block hash mined after a reorg.
    salt: u32,
    funded: u32,
}

impl ChainState {
    fn tip(&self) -> u64 {
        self.blocks.len() as u64
    }

    fn mine(&mut self, transactions: Vec<Transaction>) -> u64 {
        let height = self.tip() + 1;
        let prev_hash = self
            .blocks
            .last()
            .map(|b| b.compact.hash)
            .unwrap_or_default();
        let time = self
            .block_time
            .unwrap_or(GENESIS_TIME + height as u32 * BLOCK_INTERVAL);
        let txids: Vec<TxId> = transactions.iter().map(Transaction::txid).collect();
        let compact = CompactBlock {
            height,
            hash: BlockHash::compute(height, &prev_hash, time, &txids, self.salt),
            prev_hash,
            time,
            vtx: transactions
                .iter()
                .enumerate()
                .map(|(index, tx)| CompactTx::from_transaction(index as u64, tx))
                .collect(),
        };
        self.blocks.push(FakeBlock {
            compact,
            transactions,
        });
        height
    }

    fn mined(&self) -> impl Iterator<Item = (u64, &Transaction)> {
        self.blocks
            .iter()
            .flat_map(|b| b.transactions.iter().map(move |tx| (b.compact.height, tx)))
    }

    fn find_output(&self, prevout: &OutPoint) -> Option<&TxOut> {
        self.mined()
            .map(|(_, tx)| tx)
            .chain(self.mempool.iter())
            .find(|tx| tx.txid() == prevout.txid)
            .and_then(|tx| tx.transparent_outputs.get(prevout.index as usize))
    }

    fn touches(&self, tx: &Transaction, scripts: &HashSet<TransparentScript>) -> bool {
        tx.transparent_outputs
            .iter()
            .any(|out| scripts.contains(&out.script))
            || tx.transparent_inputs.iter().any(|input| {
                self.find_output(&input.prevout)
                    .is_some_and(|out| scripts.contains(&out.script))
            })
    }
}

/// A [`ChainSource`] backed by memory, with switches for injecting failures.
pub struct FakeChain {
    chain: ChainType,
    state: Mutex<ChainState>,
}

impl FakeChain {
    pub fn new(chain: ChainType) -> Self {
        FakeChain {
            chain,
            state: Mutex::new(ChainState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn tip(&self) -> u64 {
        self.state().tip()
    }

    /// Mines the mempool into a new block and returns its height.
    pub fn mine_block(&self) -> u64 {
        let mut state = self.state();
        let transactions = std::mem::take(&mut state.mempool);
        state.mine(transactions)
    }

    pub fn mine_empty_blocks(&self, count: u64) -> u64 {
        let mut state = self.state();
        for _ in 0..count {
            state.mine(vec![]);
        }
        state.tip()
    }

    pub fn mempool_len(&self) -> usize {
        self.state().mempool.len()
    }

    /// Drops every mempool transaction, as if none of them ever propagated.
    pub fn clear_mempool(&self) {
        self.state().mempool.clear();
    }

    /// Queues a transaction paying `value` to `address` from outside the wallet.
    pub fn fund(&self, address: &str, value: u64, memo: Option<&str>) -> Result<TxId, String> {
        let parsed = parse_address(address).map_err(|e| e.to_string())?;
        let funded = {
            let mut state = self.state();
            state.funded += 1;
            state.funded
        };
        let mut transaction = Transaction {
            // distinct funding transactions to the same address get distinct txids
            expiry_height: funded,
            ..Default::default()
        };
        match parsed.preferred_pool() {
            PoolType::Shielded(protocol) => {
                let receiver = match protocol {
                    ShieldedProtocol::Orchard => parsed.orchard,
                    ShieldedProtocol::Sapling => parsed.sapling,
                }
                .ok_or_else(|| format!("{address} has no {protocol:?} receiver"))?;
                let memo = encode_memo(memo).map_err(|e| e.to_string())?;
                let note = encrypt_note(&receiver, value, &memo);
                transaction.shielded_outputs.push(ShieldedOutput {
                    protocol,
                    cmx: note.cmx,
                    enc_ciphertext: note.enc_ciphertext,
                    out_ciphertext: vec![],
                });
            }
            PoolType::Transparent => {
                let script = parsed
                    .transparent
                    .ok_or_else(|| format!("{address} has no transparent receiver"))?;
                transaction
                    .transparent_outputs
                    .push(TxOut { value, script });
            }
        }
        let txid = transaction.txid();
        self.state().mempool.push(transaction);
        Ok(txid)
    }

    /// Block range requests reaching `height` or above fail until cleared.
    pub fn set_failure_from(&self, height: Option<u64>) {
        self.state().fail_blocks_from = height;
    }

    pub fn set_taddr_failure(&self, fail: bool) {
        self.state().fail_taddr_fetch = fail;
    }

    /// Delays every block range response.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.state().fetch_delay = delay;
    }

    pub fn set_block_time(&self, time: Option<u32>) {
        self.state().block_time = time;
    }

    /// The price the server quotes, or `None` for a server without a price feed.
    pub fn set_zec_price(&self, price: Option<f64>) {
        self.state().zec_price = price;
    }

    /// Replaces the blocks from `height` up with blocks holding the same transactions
    /// under new hashes.
    pub fn reorg_from(&self, height: u64) {
        let mut state = self.state();
        let keep = height.saturating_sub(1) as usize;
        if keep >= state.blocks.len() {
            return;
        }
        let replaced: Vec<FakeBlock> = state.blocks.drain(keep..).collect();
        state.salt += 1;
        for block in replaced {
            state.mine(block.transactions);
        }
    }

    /// Every transaction broadcast through [`ChainSource::send_transaction`].
    pub fn sent_transactions(&self) -> Vec<Transaction> {
        self.state().sent.clone()
    }

    pub fn config(&self) -> WalletConfig {
        WalletConfig::create_unconnected(self.chain, None)
    }
}

impl ChainSource for FakeChain {
    fn get_info(&self) -> BoxFuture<'_, Result<LightdInfo, ChainError>> {
        let config = self.config();
        let info = LightdInfo {
            version: "0.0.0-fake".to_string(),
            vendor: "walletcore fake chain".to_string(),
            taddr_support: true,
            chain_name: self.chain.to_string(),
            sapling_activation_height: config.sapling_activation_height(),
            consensus_branch_id: "c2d6d0b4".to_string(),
            block_height: self.tip(),
        };
        async move { Ok(info) }.boxed()
    }

    fn get_latest_block(&self) -> BoxFuture<'_, Result<BlockId, ChainError>> {
        let state = self.state();
        let id = state
            .blocks
            .last()
            .map(|b| b.compact.block_id())
            .unwrap_or(BlockId {
                height: 0,
                hash: BlockHash::default(),
            });
        async move { Ok(id) }.boxed()
    }

    fn get_block_range(
        &self,
        start: u64,
        end: u64,
    ) -> BoxFuture<'_, Result<Vec<CompactBlock>, ChainError>> {
        async move {
            let delay = self.state().fetch_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let state = self.state();
            let failure = |reason: &str| ChainError::BlockRange {
                start,
                end,
                reason: reason.to_string(),
            };
            if state.fail_blocks_from.is_some_and(|from| end >= from) {
                return Err(failure("injected failure"));
            }
            if start == 0 || start > end || end > state.tip() {
                return Err(failure("out of range"));
            }
            Ok(state.blocks[(start - 1) as usize..end as usize]
                .iter()
                .map(|b| b.compact.clone())
                .collect())
        }
        .boxed()
    }

    fn get_transaction(&self, txid: TxId) -> BoxFuture<'_, Result<RawTransaction, ChainError>> {
        let state = self.state();
        let found = state
            .mined()
            .find(|(_, tx)| tx.txid() == txid)
            .or_else(|| state.mempool.iter().find(|tx| tx.txid() == txid).map(|tx| (0, tx)))
            .map(|(height, tx)| RawTransaction {
                data: tx.to_bytes(),
                height,
            })
            .ok_or(ChainError::TransactionNotFound(txid));
        async move { found }.boxed()
    }

    fn get_taddress_transactions(
        &self,
        addresses: Vec<String>,
        start: u64,
        end: u64,
    ) -> BoxFuture<'_, Result<Vec<RawTransaction>, ChainError>> {
        let state = self.state();
        let result = if state.fail_taddr_fetch {
            Err(ChainError::Unavailable(
                "transparent address index unavailable".to_string(),
            ))
        } else {
            let scripts: HashSet<TransparentScript> = addresses
                .iter()
                .filter_map(|a| parse_address(a).ok()?.transparent)
                .collect();
            Ok(state
                .mined()
                .filter(|(height, tx)| {
                    (start..=end).contains(height) && state.touches(tx, &scripts)
                })
                .map(|(height, tx)| RawTransaction {
                    data: tx.to_bytes(),
                    height,
                })
                .collect())
        };
        async move { result }.boxed()
    }

    fn get_zec_price(&self) -> BoxFuture<'_, Result<f64, ChainError>> {
        let price = self
            .state()
            .zec_price
            .ok_or_else(|| ChainError::Unavailable("no price feed".to_string()));
        async move { price }.boxed()
    }

    fn send_transaction(&self, data: Vec<u8>) -> BoxFuture<'_, Result<TxId, ChainError>> {
        let result = Transaction::read(&data[..])
            .map_err(|e| ChainError::Rejected(format!("malformed transaction: {e}")))
            .and_then(|transaction| {
                let mut state = self.state();
                let mut seen_nullifiers = HashSet::new();
                let mut seen_outpoints = HashSet::new();
                for tx in state.mined().map(|(_, tx)| tx).chain(state.mempool.iter()) {
                    seen_nullifiers.extend(tx.shielded_spends.iter().map(|s| s.nullifier));
                    seen_outpoints.extend(tx.transparent_inputs.iter().map(|i| i.prevout));
                }
                if transaction
                    .shielded_spends
                    .iter()
                    .any(|s| seen_nullifiers.contains(&s.nullifier))
                {
                    return Err(ChainError::Rejected("duplicate nullifier".to_string()));
                }
                if transaction
                    .transparent_inputs
                    .iter()
                    .any(|i| seen_outpoints.contains(&i.prevout))
                {
                    return Err(ChainError::Rejected("input already spent".to_string()));
                }
                let txid = transaction.txid();
                state.sent.push(transaction.clone());
                state.mempool.push(transaction);
                Ok(txid)
            });
        async move { result }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TADDR: &str = "tmBsTi2xWTjUdEXnuTceL7fecEQKeWaPDJd";

    #[tokio::test]
    async fn blocks_chain_together() {
        let chain = FakeChain::new(ChainType::Regtest);
        chain.mine_empty_blocks(3);
        let blocks = chain.get_block_range(1, 3).await.unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1].prev_hash, blocks[0].hash);
        assert_eq!(blocks[2].prev_hash, blocks[1].hash);
        assert!(chain.get_block_range(2, 4).await.is_err());
    }

    #[tokio::test]
    async fn reorg_changes_hashes_but_keeps_transactions() {
        let chain = FakeChain::new(ChainType::Regtest);
        chain.mine_empty_blocks(2);
        let txid = chain.fund(TADDR, 5_000, None).unwrap();
        chain.mine_block();
        let before = chain.get_block_range(3, 3).await.unwrap();

        chain.reorg_from(3);
        let after = chain.get_block_range(3, 3).await.unwrap();
        assert_ne!(before[0].hash, after[0].hash);
        assert_eq!(chain.tip(), 3);
        assert_eq!(chain.get_transaction(txid).await.unwrap().height, 3);
    }

    #[tokio::test]
    async fn transparent_index_finds_funding() {
        let chain = FakeChain::new(ChainType::Regtest);
        chain.fund(TADDR, 5_000, None).unwrap();
        chain.mine_block();
        let found = chain
            .get_taddress_transactions(vec![TADDR.to_string()], 1, 1)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        chain.set_taddr_failure(true);
        assert!(chain
            .get_taddress_transactions(vec![TADDR.to_string()], 1, 1)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn injected_failure_only_hits_later_ranges() {
        let chain = FakeChain::new(ChainType::Regtest);
        chain.mine_empty_blocks(10);
        chain.set_failure_from(Some(6));
        assert!(chain.get_block_range(1, 5).await.is_ok());
        assert!(chain.get_block_range(1, 6).await.is_err());
    }
}
