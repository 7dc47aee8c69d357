//! Compact block data served by a light wallet server.
//!
//! A compact block carries, per transaction, only the nullifiers revealed by its shielded
//! spends and the commitments and ciphertexts of its shielded outputs. That is all trial
//! decryption needs; full transactions are fetched separately when the wallet finds it
//! is the sender.

use std::fmt;

use sha2::{Digest, Sha256};
use zcash_protocol::{ShieldedProtocol, TxId};

use super::transaction::Transaction;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(BlockHash)
    }

    /// Hash committing to a block's position, parent, time and contents.
    pub fn compute(height: u64, prev_hash: &BlockHash, time: u32, txids: &[TxId], salt: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&height.to_le_bytes());
        hasher.update(&prev_hash.0);
        hasher.update(&time.to_le_bytes());
        for txid in txids {
            let txid: &[u8; 32] = txid.as_ref();
            hasher.update(txid);
        }
        hasher.update(&salt.to_le_bytes());
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&hasher.finalize());
        BlockHash(hash)
    }
}

// Block hashes are displayed byte-reversed, like txids.
impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut data = self.0;
        data.reverse();
        f.write_str(&hex::encode(data))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BlockHash").field(&self.to_string()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId {
    pub height: u64,
    pub hash: BlockHash,
}

/// What the server reports about itself and the chain it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightdInfo {
    pub version: String,
    pub vendor: String,
    pub taddr_support: bool,
    pub chain_name: String,
    pub sapling_activation_height: u64,
    pub consensus_branch_id: String,
    pub block_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactSpend {
    pub protocol: ShieldedProtocol,
    pub nullifier: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactOutput {
    pub protocol: ShieldedProtocol,
    pub cmx: [u8; 32],
    pub ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactTx {
    /// Position of the transaction in its block.
    pub index: u64,
    pub txid: TxId,
    pub spends: Vec<CompactSpend>,
    pub outputs: Vec<CompactOutput>,
}

impl CompactTx {
    pub fn from_transaction(index: u64, transaction: &Transaction) -> Self {
        CompactTx {
            index,
            txid: transaction.txid(),
            spends: transaction
                .shielded_spends
                .iter()
                .map(|spend| CompactSpend {
                    protocol: spend.protocol,
                    nullifier: spend.nullifier,
                })
                .collect(),
            outputs: transaction
                .shielded_outputs
                .iter()
                .map(|output| CompactOutput {
                    protocol: output.protocol,
                    cmx: output.cmx,
                    ciphertext: output.enc_ciphertext.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactBlock {
    pub height: u64,
    pub hash: BlockHash,
    pub prev_hash: BlockHash,
    pub time: u32,
    pub vtx: Vec<CompactTx>,
}

impl CompactBlock {
    pub fn block_id(&self) -> BlockId {
        BlockId {
            height: self.height,
            hash: self.hash,
        }
    }
}

/// A serialized full transaction and the height it was mined at, 0 when unmined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub data: Vec<u8>,
    pub height: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_hash_displays_reversed() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        let shown = BlockHash(bytes).to_string();
        assert_eq!(shown.len(), 64);
        assert!(shown.ends_with("ab"));
    }

    #[test]
    fn salt_changes_hash() {
        let parent = BlockHash::default();
        assert_ne!(
            BlockHash::compute(5, &parent, 100, &[], 0),
            BlockHash::compute(5, &parent, 100, &[], 1)
        );
    }
}
