//! The wallet's view of a light wallet server.
//!
//! Everything the sync engine and the broadcaster need from the network goes through
//! [`ChainSource`], so a client can be pointed at a remote server or at an in-memory
//! chain in tests.

use futures::future::BoxFuture;
use zcash_protocol::TxId;

use self::compact_formats::{BlockId, CompactBlock, LightdInfo, RawTransaction};

pub mod compact_formats;
pub mod transaction;

#[cfg(test)]
pub mod fake_chain;

/// Errors reported by a chain source. All of them are worth retrying except `Rejected`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("server unavailable: {0}")]
    Unavailable(String),
    #[error("failed to fetch blocks {start}..={end}: {reason}")]
    BlockRange { start: u64, end: u64, reason: String },
    #[error("transaction {0} not found")]
    TransactionNotFound(TxId),
    #[error("transaction rejected: {0}")]
    Rejected(String),
}

impl ChainError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, ChainError::Rejected(_))
    }
}

/// Source of chain data and sink for broadcast transactions.
pub trait ChainSource: Send + Sync {
    fn get_info(&self) -> BoxFuture<'_, Result<LightdInfo, ChainError>>;

    fn get_latest_block(&self) -> BoxFuture<'_, Result<BlockId, ChainError>>;

    /// Blocks `start..=end` in ascending height order.
    fn get_block_range(
        &self,
        start: u64,
        end: u64,
    ) -> BoxFuture<'_, Result<Vec<CompactBlock>, ChainError>>;

    fn get_transaction(&self, txid: TxId) -> BoxFuture<'_, Result<RawTransaction, ChainError>>;

    /// Mined transactions in `start..=end` that pay to or spend from any of `addresses`.
    fn get_taddress_transactions(
        &self,
        addresses: Vec<String>,
        start: u64,
        end: u64,
    ) -> BoxFuture<'_, Result<Vec<RawTransaction>, ChainError>>;

    fn send_transaction(&self, data: Vec<u8>) -> BoxFuture<'_, Result<TxId, ChainError>>;

    /// The current ZEC price in USD.
    fn get_zec_price(&self) -> BoxFuture<'_, Result<f64, ChainError>>;
}
