//! Trial decryption of compact block outputs against every receiver the wallet owns.
//!
//! Blocks are decrypted in parallel on the rayon pool; each one reports progress as it
//! finishes.

use rayon::prelude::*;
use zcash_protocol::{ShieldedProtocol, TxId};

use crate::{
    chain::compact_formats::{CompactBlock, CompactTx},
    wallet::{
        keys::ViewingKey, note_encryption::try_decrypt_note, MemoDownloadOption, WalletOptions,
    },
};

use super::WalletReceivers;

/// A compact output that decrypted under one of the wallet's receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedNote {
    pub height: u64,
    pub block_time: u32,
    pub txid: TxId,
    pub protocol: ShieldedProtocol,
    pub output_index: u32,
    pub value: u64,
    pub memo: Option<String>,
    /// The wallet address owning the receiver.
    pub address: String,
    pub nullifier: [u8; 32],
}

fn exceeds_filter(tx: &CompactTx, options: &WalletOptions) -> bool {
    options
        .transaction_filter_threshold
        .is_some_and(|threshold| tx.outputs.len() > threshold as usize)
}

fn decrypt_tx(
    block: &CompactBlock,
    tx: &CompactTx,
    receivers: &WalletReceivers,
    viewing_key: &ViewingKey,
    options: &WalletOptions,
) -> Vec<DecryptedNote> {
    let mut found = vec![];
    for (output_index, output) in tx.outputs.iter().enumerate() {
        let candidates = match output.protocol {
            ShieldedProtocol::Orchard => &receivers.orchard,
            ShieldedProtocol::Sapling => &receivers.sapling,
        };
        let decrypted = candidates.iter().find_map(|(receiver, address)| {
            try_decrypt_note(receiver, &output.cmx, &output.ciphertext).map(|note| (note, address))
        });
        if let Some((note, address)) = decrypted {
            found.push(DecryptedNote {
                height: block.height,
                block_time: block.time,
                txid: tx.txid,
                protocol: output.protocol,
                output_index: output_index as u32,
                value: note.value,
                memo: match options.download_memos {
                    MemoDownloadOption::NoMemos => None,
                    _ => note.memo,
                },
                address: address.clone(),
                nullifier: viewing_key.nullifier(&output.cmx),
            });
        }
    }
    found
}

/// Decrypts every output of `blocks`, calling `block_done` once per block. Transactions
/// with more outputs than the configured threshold are skipped.
pub fn trial_decrypt_blocks<F>(
    blocks: &[CompactBlock],
    receivers: &WalletReceivers,
    viewing_key: &ViewingKey,
    options: &WalletOptions,
    block_done: F,
) -> Vec<DecryptedNote>
where
    F: Fn() + Sync,
{
    let mut notes: Vec<DecryptedNote> = blocks
        .par_iter()
        .flat_map_iter(|block| {
            let found: Vec<DecryptedNote> = block
                .vtx
                .iter()
                .filter(|tx| !exceeds_filter(tx, options))
                .flat_map(|tx| decrypt_tx(block, tx, receivers, viewing_key, options))
                .collect();
            block_done();
            found
        })
        .collect();
    notes.sort_by_key(|note| (note.height, note.txid, note.protocol, note.output_index));
    notes
}
