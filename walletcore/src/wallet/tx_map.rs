//! The wallet's transaction records, keyed by txid, and the bookkeeping that keeps the
//! spend status of every output consistent with them.

use std::{
    collections::{HashMap, HashSet},
    io::{self, Read, Write},
};

use byteorder::{ReadBytesExt, WriteBytesExt};
use log::{debug, info};
use zcash_encoding::Vector;
use zcash_protocol::TxId;

use walletcore_status::{confirmation_status::ConfirmationStatus, spend_status::SpendStatus};

use crate::chain::transaction::OutPoint;

use super::{notes::WalletOutput, transaction_record::TransactionRecord};

#[derive(Debug, Default)]
pub struct TxMap {
    records: HashMap<TxId, TransactionRecord>,
}

impl TxMap {
    pub const fn serialized_version() -> u8 {
        1
    }

    pub fn get(&self, txid: &TxId) -> Option<&TransactionRecord> {
        self.records.get(txid)
    }

    pub fn records(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every output with the record that created it.
    pub fn outputs(&self) -> impl Iterator<Item = (&TransactionRecord, &WalletOutput)> {
        self.records
            .values()
            .flat_map(|record| record.outputs.iter().map(move |output| (record, output)))
    }

    fn outputs_mut(&mut self) -> impl Iterator<Item = &mut WalletOutput> {
        self.records
            .values_mut()
            .flat_map(|record| record.outputs.iter_mut())
    }

    /// Nullifiers of every note the wallet holds, spent or not.
    pub fn nullifiers(&self) -> HashSet<[u8; 32]> {
        self.outputs().filter_map(|(_, o)| o.nullifier).collect()
    }

    pub fn outpoints(&self) -> HashSet<OutPoint> {
        self.outputs().filter_map(|(_, o)| o.outpoint()).collect()
    }

    pub fn pending_txids(&self) -> Vec<TxId> {
        self.records
            .values()
            .filter(|r| r.status.is_pending())
            .map(|r| r.txid)
            .collect()
    }

    fn mark_spent(
        &mut self,
        nullifiers: &[[u8; 32]],
        outpoints: &[OutPoint],
        spend: SpendStatus,
        overwrite: bool,
    ) {
        for output in self.outputs_mut() {
            let spent = output.nullifier.is_some_and(|nf| nullifiers.contains(&nf))
                || output.outpoint().is_some_and(|op| outpoints.contains(&op));
            if spent && (overwrite || output.spend.is_unspent()) {
                output.spend = spend;
            }
        }
    }

    /// Records a transaction the wallet just broadcast and marks what it spends.
    pub fn insert_pending(&mut self, record: TransactionRecord) {
        let spend = SpendStatus::Spent((record.txid, record.status));
        let nullifiers = record.spent_nullifiers.clone();
        let outpoints = record.spent_outpoints.clone();
        self.records.insert(record.txid, record);
        self.mark_spent(&nullifiers, &outpoints, spend, false);
    }

    /// Applies the transactions found in one scanned batch ending at `end_height`.
    ///
    /// Records of locally created transactions are merged with what the chain showed, so
    /// a mined send keeps its outgoing data and change while gaining its block height.
    pub fn apply_batch(&mut self, found: Vec<TransactionRecord>, end_height: u64) {
        let mut spends = Vec::with_capacity(found.len());
        for record in found {
            spends.push((
                record.txid,
                record.status,
                record.spent_nullifiers.clone(),
                record.spent_outpoints.clone(),
            ));
            match self.records.get_mut(&record.txid) {
                Some(existing) => merge(existing, record),
                None => {
                    self.records.insert(record.txid, record);
                }
            }
        }

        for (txid, status, nullifiers, outpoints) in spends {
            self.mark_spent(
                &nullifiers,
                &outpoints,
                SpendStatus::Spent((txid, status)),
                true,
            );
        }

        // A rescan rebuilds outputs from scratch, so spends by still pending
        // transactions have to be reapplied.
        let pending: Vec<_> = self
            .records
            .values()
            .filter(|r| r.status.is_pending())
            .map(|r| {
                (
                    SpendStatus::Spent((r.txid, r.status)),
                    r.spent_nullifiers.clone(),
                    r.spent_outpoints.clone(),
                )
            })
            .collect();
        for (spend, nullifiers, outpoints) in pending {
            self.mark_spent(&nullifiers, &outpoints, spend, false);
        }

        for record in self.records.values_mut() {
            if let ConfirmationStatus::Confirmed(height) = record.status {
                if u64::from(height) > end_height {
                    continue;
                }
                for output in record.outputs.iter_mut() {
                    if output.nullifier.is_some() && output.spend.is_unspent() {
                        output.witnessed_height = Some(end_height);
                    }
                }
            }
        }
    }

    /// Drops pending transactions that can no longer be mined at `synced_height`, and
    /// releases the outputs they were spending.
    pub fn remove_expired(&mut self, synced_height: u64) -> Vec<TxId> {
        let expired: Vec<TxId> = self
            .records
            .values()
            .filter(|r| {
                r.status.is_pending() && r.expiry_height != 0 && synced_height >= r.expiry_height
            })
            .map(|r| r.txid)
            .collect();
        for txid in &expired {
            info!("Removing expired transaction {txid}");
            self.remove(txid);
        }
        expired
    }

    fn remove(&mut self, txid: &TxId) {
        self.records.remove(txid);
        for output in self.outputs_mut() {
            if output.spend.spending_txid().as_ref() == Some(txid) {
                output.spend = SpendStatus::Unspent;
            }
        }
    }

    /// Forgets everything mined above `height`, after a reorg.
    pub fn invalidate_above(&mut self, height: u64) {
        let stale: Vec<TxId> = self
            .records
            .values()
            .filter(|r| {
                r.status
                    .get_confirmed_height()
                    .is_some_and(|h| u64::from(h) > height)
            })
            .map(|r| r.txid)
            .collect();
        debug!("Invalidating {} transactions above {height}", stale.len());
        for txid in &stale {
            self.remove(txid);
        }
        for output in self.outputs_mut() {
            if output.witnessed_height.is_some_and(|h| h > height) {
                output.witnessed_height = Some(height);
            }
        }
    }

    /// Forgets every mined transaction, keeping those still pending.
    pub fn clear_confirmed(&mut self) {
        self.records.retain(|_, r| r.status.is_pending());
        let remaining: HashSet<TxId> = self.records.keys().copied().collect();
        for output in self.outputs_mut() {
            if output
                .spend
                .spending_txid()
                .is_some_and(|txid| !remaining.contains(&txid))
            {
                output.spend = SpendStatus::Unspent;
            }
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let _version = reader.read_u8()?;
        let records = Vector::read(&mut reader, |r| TransactionRecord::read(r))?;
        Ok(TxMap {
            records: records.into_iter().map(|r| (r.txid, r)).collect(),
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u8(Self::serialized_version())?;
        let mut records: Vec<&TransactionRecord> = self.records.values().collect();
        records.sort_by_key(|r| r.txid);
        Vector::write(&mut writer, &records, |w, r| r.write(w))
    }
}

fn merge(existing: &mut TransactionRecord, found: TransactionRecord) {
    existing.status = found.status;
    existing.datetime = found.datetime;
    for output in found.outputs {
        match existing
            .outputs
            .iter_mut()
            .find(|o| o.output_id == output.output_id)
        {
            Some(known) => {
                known.witnessed_height = output.witnessed_height.or(known.witnessed_height);
                if known.memo.is_none() {
                    known.memo = output.memo;
                }
            }
            None => existing.outputs.push(output),
        }
    }
    for nf in found.spent_nullifiers {
        if !existing.spent_nullifiers.contains(&nf) {
            existing.spent_nullifiers.push(nf);
        }
    }
    for op in found.spent_outpoints {
        if !existing.spent_outpoints.contains(&op) {
            existing.spent_outpoints.push(op);
        }
    }
    if existing.outgoing_tx_data.is_empty() {
        existing.outgoing_tx_data = found.outgoing_tx_data;
    }
    existing.fee = existing.fee.or(found.fee);
    existing.zec_price = existing.zec_price.or(found.zec_price);
}
