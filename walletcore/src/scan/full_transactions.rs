//! The parts of a batch scan that need full transactions rather than compact blocks:
//! transparent activity on the wallet's taddrs and the outgoing side of transactions
//! the wallet funded.

use std::collections::{BTreeMap, HashSet};

use log::{debug, info};
use zcash_protocol::{PoolType, TxId};

use walletcore_status::spend_status::SpendStatus;

use crate::{
    chain::{
        compact_formats::RawTransaction,
        transaction::{txid_of, OutPoint, Transaction},
        ChainSource,
    },
    wallet::{
        address::{encode_transparent, parse_address},
        note_encryption::try_decrypt_outgoing,
        notes::{OutputId, WalletOutput},
        transaction_record::{OutgoingTxData, TransactionRecord},
        MemoDownloadOption,
    },
};

use super::{RecordBuilder, ScanContext, ScanError};

fn parse(raw: &RawTransaction) -> Result<Transaction, ScanError> {
    Transaction::read(&raw.data[..]).map_err(|e| ScanError::MalformedTransaction {
        txid: txid_of(&raw.data),
        reason: e.to_string(),
    })
}

/// Records UTXOs received at, and spent from, the wallet's transparent addresses in
/// `start..=end`.
pub(super) async fn scan_transparent(
    source: &dyn ChainSource,
    context: &ScanContext,
    start: u64,
    end: u64,
    block_times: &BTreeMap<u64, u32>,
    builder: &mut RecordBuilder<'_>,
) -> Result<(), ScanError> {
    if context.transparent_addresses.is_empty() {
        return Ok(());
    }
    let mut raw_transactions = source
        .get_taddress_transactions(context.transparent_addresses.clone(), start, end)
        .await?;
    raw_transactions.sort_by_key(|raw| raw.height);

    let mut outpoints = context.outpoints.clone();
    for raw in raw_transactions {
        let transaction = parse(&raw)?;
        let txid = transaction.txid();
        let datetime = block_times.get(&raw.height).copied().unwrap_or_default() as u64;

        let spent: Vec<OutPoint> = transaction
            .transparent_inputs
            .iter()
            .map(|input| input.prevout)
            .filter(|prevout| outpoints.contains(prevout))
            .collect();

        let mut received = vec![];
        for (index, output) in transaction.transparent_outputs.iter().enumerate() {
            if let Some(address) = context.receivers.owns_script(&output.script) {
                outpoints.insert(OutPoint {
                    txid,
                    index: index as u32,
                });
                received.push(WalletOutput {
                    output_id: OutputId {
                        txid,
                        pool: PoolType::TRANSPARENT,
                        index: index as u32,
                    },
                    address: address.clone(),
                    value: output.value,
                    memo: None,
                    is_change: false,
                    nullifier: None,
                    witnessed_height: None,
                    spend: SpendStatus::Unspent,
                });
            }
        }

        if spent.is_empty() && received.is_empty() {
            continue;
        }
        debug!(
            "transparent activity in {txid}: {} received, {} spent",
            received.len(),
            spent.len()
        );
        let record = builder.record(txid, raw.height, datetime);
        for prevout in spent {
            if !record.spent_outpoints.contains(&prevout) {
                record.spent_outpoints.push(prevout);
            }
        }
        for output in received {
            if !record.outputs.iter().any(|o| o.output_id == output.output_id) {
                record.outputs.push(output);
            }
        }
    }
    Ok(())
}

fn recipient_is_own(context: &ScanContext, recipient: &str) -> bool {
    let Ok(parsed) = parse_address(recipient) else {
        return false;
    };
    parsed
        .orchard
        .iter()
        .chain(parsed.sapling.iter())
        .any(|receiver| context.receivers.owns_shielded(receiver))
        || parsed
            .transparent
            .is_some_and(|script| context.receivers.owns_script(&script).is_some())
}

fn fill_outgoing(context: &ScanContext, record: &mut TransactionRecord, transaction: &Transaction) {
    record.fee = Some(transaction.fee);
    record.expiry_height = transaction.expiry_height as u64;

    let ovk = context.viewing_key.ovk();
    let keep_memos = context.options.download_memos != MemoDownloadOption::NoMemos;
    let mut outgoing = vec![];
    for (index, output) in transaction.shielded_outputs.iter().enumerate() {
        let Some(plaintext) = try_decrypt_outgoing(&ovk, &output.cmx, &output.out_ciphertext)
        else {
            continue;
        };
        if recipient_is_own(context, &plaintext.recipient) {
            continue;
        }
        outgoing.push(OutgoingTxData {
            recipient_address: plaintext.recipient,
            value: plaintext.value,
            memo: plaintext.memo.filter(|_| keep_memos),
            pool: PoolType::Shielded(output.protocol),
            output_index: index as u32,
        });
    }
    for (index, output) in transaction.transparent_outputs.iter().enumerate() {
        if context.receivers.owns_script(&output.script).is_none() {
            outgoing.push(OutgoingTxData {
                recipient_address: encode_transparent(&output.script, context.chain),
                value: output.value,
                memo: None,
                pool: PoolType::TRANSPARENT,
                output_index: index as u32,
            });
        }
    }
    if record.outgoing_tx_data.is_empty() {
        record.outgoing_tx_data = outgoing;
    }

    for output in record.outputs.iter_mut() {
        if output.memo.is_none() {
            output.is_change = true;
        }
    }
}

/// Fetches every transaction in `records` that the wallet funded and fills in its fee,
/// its expiry and what it paid to others.
pub(super) async fn complete_outgoing(
    source: &dyn ChainSource,
    context: &ScanContext,
    records: &mut BTreeMap<TxId, TransactionRecord>,
) -> Result<(), ScanError> {
    let outgoing: Vec<TxId> = records
        .values()
        .filter(|record| record.is_outgoing())
        .map(|record| record.txid)
        .collect();
    let mut fetched = HashSet::new();
    for txid in outgoing {
        let transaction = parse(&source.get_transaction(txid).await?)?;
        if let Some(record) = records.get_mut(&txid) {
            fill_outgoing(context, record, &transaction);
            fetched.insert(txid);
        }
    }
    if !fetched.is_empty() {
        info!("Fetched {} outgoing transactions", fetched.len());
    }
    Ok(())
}
