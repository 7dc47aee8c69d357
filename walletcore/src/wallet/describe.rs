//! Read-only views of the wallet: value transfers, notes and per address totals.
use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap},
    fmt,
};

use json::{object, JsonValue};
use log::error;
use zcash_protocol::{PoolType, TxId};

use walletcore_status::confirmation_status::ConfirmationStatus;

use super::{
    balance::is_spendable,
    notes::{pool_name, WalletOutput},
    transaction_record::TransactionRecord,
    tx_map::TxMap,
    LightWallet,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTransferKind {
    Sent,
    Received,
    SendToSelf,
    MemoToSelf,
    Shield,
}

impl fmt::Display for ValueTransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueTransferKind::Sent => "sent",
            ValueTransferKind::Received => "received",
            ValueTransferKind::SendToSelf => "send-to-self",
            ValueTransferKind::MemoToSelf => "memo-to-self",
            ValueTransferKind::Shield => "shield",
        })
    }
}

/// One movement of value in a transaction, as shown in the history.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTransfer {
    pub txid: TxId,
    pub datetime: u64,
    pub status: ConfirmationStatus,
    pub confirmations: u64,
    pub transaction_fee: Option<u64>,
    pub zec_price: Option<f64>,
    pub kind: ValueTransferKind,
    pub value: u64,
    pub recipient_address: Option<String>,
    pub pool_received: Option<PoolType>,
    pub memos: Vec<String>,
    // position of the output within its pool, used only to order chunked sends
    output_index: u32,
}

impl ValueTransfer {
    pub fn blockheight(&self) -> u32 {
        self.status.get_height().into()
    }
}

impl From<&ValueTransfer> for JsonValue {
    fn from(value_transfer: &ValueTransfer) -> Self {
        object! {
            "txid" => value_transfer.txid.to_string(),
            "datetime" => value_transfer.datetime,
            "status" => value_transfer.status.label(),
            "blockheight" => value_transfer.blockheight(),
            "confirmations" => value_transfer.confirmations,
            "transaction_fee" => value_transfer.transaction_fee,
            "zec_price" => value_transfer.zec_price,
            "kind" => value_transfer.kind.to_string(),
            "value" => value_transfer.value,
            "recipient_address" => value_transfer.recipient_address.clone(),
            "pool_received" => value_transfer.pool_received.map(pool_name),
            "memos" => value_transfer.memos.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueTransfers(pub Vec<ValueTransfer>);

impl ValueTransfers {
    pub fn iter(&self) -> impl Iterator<Item = &ValueTransfer> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> JsonValue {
        object! {
            "value_transfers" => JsonValue::Array(self.0.iter().map(JsonValue::from).collect()),
        }
    }
}

pub mod finsight {
    use std::collections::BTreeMap;

    use json::JsonValue;

    macro_rules! address_totals {
        ($($name:ident),*) => {$(
            #[derive(Debug, Clone, Default, PartialEq, Eq)]
            pub struct $name(pub BTreeMap<String, u64>);

            impl From<$name> for JsonValue {
                fn from(totals: $name) -> Self {
                    let mut o = JsonValue::new_object();
                    for (address, total) in totals.0 {
                        o[address.as_str()] = total.into();
                    }
                    o
                }
            }
        )*};
    }

    address_totals!(TotalValueToAddress, TotalSendsToAddress, TotalMemoBytesToAddress);
}

/// Confirmations of a transaction mined at `height` when the chain is at `tip`. Pending
/// transactions have none.
pub fn confirmations(status: &ConfirmationStatus, tip: u64) -> u64 {
    let Some(height) = status.get_confirmed_height() else {
        return 0;
    };
    let confirmations = tip as i64 - u32::from(height) as i64 + 1;
    if confirmations < 0 {
        error!(
            "Transaction at height {} is above the chain tip {}",
            u32::from(height),
            tip
        );
        return 0;
    }
    confirmations as u64
}

struct TransferBuilder<'a> {
    record: &'a TransactionRecord,
    confirmations: u64,
}

impl TransferBuilder<'_> {
    fn build(
        &self,
        kind: ValueTransferKind,
        value: u64,
        recipient_address: Option<String>,
        pool_received: Option<PoolType>,
        memos: Vec<String>,
        output_index: u32,
    ) -> ValueTransfer {
        ValueTransfer {
            txid: self.record.txid,
            datetime: self.record.datetime,
            status: self.record.status,
            confirmations: self.confirmations,
            transaction_fee: self.record.fee,
            zec_price: self.record.zec_price,
            kind,
            value,
            recipient_address,
            pool_received,
            memos,
            output_index,
        }
    }
}

fn memos<'a>(outputs: impl Iterator<Item = &'a WalletOutput>) -> Vec<String> {
    outputs.filter_map(|output| output.memo.clone()).collect()
}

/// Whether an outgoing transaction without external recipients moved funds out of the
/// transparent or sapling pool into orchard.
fn is_shield(record: &TransactionRecord, nullifier_pools: &HashMap<[u8; 32], PoolType>) -> bool {
    let spends_legacy = !record.spent_outpoints.is_empty()
        || record
            .spent_nullifiers
            .iter()
            .any(|nf| nullifier_pools.get(nf) == Some(&PoolType::SAPLING));
    spends_legacy
        && !record.outputs.is_empty()
        && record
            .outputs
            .iter()
            .all(|output| output.pool() == PoolType::ORCHARD && output.memo.is_none())
}

/// Splits every transaction in the map into value transfers.
pub fn value_transfers_from(transactions: &TxMap, tip: u64) -> ValueTransfers {
    let nullifier_pools: HashMap<[u8; 32], PoolType> = transactions
        .outputs()
        .filter_map(|(_, output)| output.nullifier.map(|nf| (nf, output.pool())))
        .collect();

    let mut value_transfers = vec![];
    for record in transactions.records() {
        let builder = TransferBuilder {
            record,
            confirmations: confirmations(&record.status, tip),
        };

        if !record.is_outgoing() {
            for output in &record.outputs {
                value_transfers.push(builder.build(
                    ValueTransferKind::Received,
                    output.value,
                    None,
                    Some(output.pool()),
                    output.memo.iter().cloned().collect(),
                    output.output_id.index,
                ));
            }
        } else if !record.outgoing_tx_data.is_empty() {
            // one entry per output, so chunked memos show up as several sends
            for outgoing in &record.outgoing_tx_data {
                value_transfers.push(builder.build(
                    ValueTransferKind::Sent,
                    outgoing.value,
                    Some(outgoing.recipient_address.clone()),
                    None,
                    outgoing.memo.iter().cloned().collect(),
                    outgoing.output_index,
                ));
            }
            let self_memos = memos(record.outputs.iter().filter(|o| !o.is_change));
            if !self_memos.is_empty() {
                value_transfers.push(builder.build(
                    ValueTransferKind::MemoToSelf,
                    0,
                    None,
                    None,
                    self_memos,
                    0,
                ));
            }
        } else if is_shield(record, &nullifier_pools) {
            value_transfers.push(builder.build(
                ValueTransferKind::Shield,
                record.total_value_received_in(PoolType::ORCHARD),
                None,
                Some(PoolType::ORCHARD),
                vec![],
                0,
            ));
        } else {
            let self_memos = memos(record.outputs.iter());
            let kind = if self_memos.is_empty() {
                ValueTransferKind::SendToSelf
            } else {
                ValueTransferKind::MemoToSelf
            };
            value_transfers.push(builder.build(kind, 0, None, None, self_memos, 0));
        }
    }

    value_transfers.sort_by(|a, b| {
        (
            Reverse(a.datetime),
            a.txid,
            &a.recipient_address,
            a.pool_received,
            a.output_index,
        )
            .cmp(&(
                Reverse(b.datetime),
                b.txid,
                &b.recipient_address,
                b.pool_received,
                b.output_index,
            ))
    });
    ValueTransfers(value_transfers)
}

#[derive(Default)]
struct NoteLists {
    unspent: Vec<JsonValue>,
    pending: Vec<JsonValue>,
    spent: Vec<JsonValue>,
}

impl NoteLists {
    fn sorted(mut notes: Vec<JsonValue>) -> JsonValue {
        notes.sort_by_key(|note| note["created_in_block"].as_u64());
        JsonValue::Array(notes)
    }
}

impl LightWallet {
    /// The wallet's value transfers, newest first. `server_height` is the latest height
    /// the server reported, if known.
    pub async fn value_transfers(&self, server_height: Option<u64>) -> ValueTransfers {
        let tip = self
            .last_synced_height()
            .await
            .max(server_height.unwrap_or(0));
        value_transfers_from(&*self.transactions.read().await, tip)
    }

    pub async fn addresses_json(&self) -> JsonValue {
        let keys = self.keys.read().await;
        JsonValue::Array(
            keys.addresses
                .iter()
                .map(|address| address.to_json(self.config.chain))
                .collect(),
        )
    }

    /// Notes and UTXOs per pool, split into unspent and pending. Spent ones are included
    /// when `all_notes` is set.
    pub async fn list_notes(&self, all_notes: bool) -> JsonValue {
        let can_spend = self.keys.read().await.can_spend();
        let synced_height = self.last_synced_height().await;
        let min_confirmations = self.config.min_confirmations;

        let mut lists: BTreeMap<PoolType, NoteLists> = BTreeMap::new();
        for (record, output) in self.transactions.read().await.outputs() {
            let mut note = output.to_json(&record.status);
            note["datetime"] = record.datetime.into();
            note["spendable"] = (can_spend
                && is_spendable(record, output, synced_height, min_confirmations))
            .into();

            let list = lists.entry(output.pool()).or_default();
            if output.spend.is_confirmed_spent() {
                if all_notes {
                    list.spent.push(note);
                }
            } else if output.spend.is_pending_spent() || record.status.is_pending() {
                list.pending.push(note);
            } else {
                list.unspent.push(note);
            }
        }

        let mut take = |pool| lists.remove(&pool).unwrap_or_default();
        let orchard = take(PoolType::ORCHARD);
        let sapling = take(PoolType::SAPLING);
        let transparent = take(PoolType::TRANSPARENT);

        let mut res = object! {
            "unspent_orchard_notes" => NoteLists::sorted(orchard.unspent),
            "pending_orchard_notes" => NoteLists::sorted(orchard.pending),
            "unspent_sapling_notes" => NoteLists::sorted(sapling.unspent),
            "pending_sapling_notes" => NoteLists::sorted(sapling.pending),
            "utxos" => NoteLists::sorted(transparent.unspent),
            "pending_utxos" => NoteLists::sorted(transparent.pending),
        };
        if all_notes {
            res["spent_orchard_notes"] = NoteLists::sorted(orchard.spent);
            res["spent_sapling_notes"] = NoteLists::sorted(sapling.spent);
            res["spent_utxos"] = NoteLists::sorted(transparent.spent);
        }
        res
    }

    fn sends_by_address(value_transfers: &ValueTransfers) -> BTreeMap<String, Vec<&ValueTransfer>> {
        let mut by_address: BTreeMap<String, Vec<&ValueTransfer>> = BTreeMap::new();
        for value_transfer in value_transfers.iter() {
            if let (ValueTransferKind::Sent, Some(address)) =
                (value_transfer.kind, &value_transfer.recipient_address)
            {
                by_address
                    .entry(address.clone())
                    .or_default()
                    .push(value_transfer);
            }
        }
        by_address
    }

    pub async fn total_value_to_address(&self) -> finsight::TotalValueToAddress {
        let value_transfers = self.value_transfers(None).await;
        finsight::TotalValueToAddress(
            Self::sends_by_address(&value_transfers)
                .into_iter()
                .map(|(address, sends)| (address, sends.iter().map(|vt| vt.value).sum()))
                .collect(),
        )
    }

    pub async fn total_sends_to_address(&self) -> finsight::TotalSendsToAddress {
        let value_transfers = self.value_transfers(None).await;
        finsight::TotalSendsToAddress(
            Self::sends_by_address(&value_transfers)
                .into_iter()
                .map(|(address, sends)| {
                    let txids: std::collections::BTreeSet<TxId> =
                        sends.iter().map(|vt| vt.txid).collect();
                    (address, txids.len() as u64)
                })
                .collect(),
        )
    }

    pub async fn total_memobytes_to_address(&self) -> finsight::TotalMemoBytesToAddress {
        let value_transfers = self.value_transfers(None).await;
        finsight::TotalMemoBytesToAddress(
            Self::sends_by_address(&value_transfers)
                .into_iter()
                .map(|(address, sends)| {
                    let bytes = sends
                        .iter()
                        .flat_map(|vt| vt.memos.iter())
                        .map(|memo| memo.len() as u64)
                        .sum();
                    (address, bytes)
                })
                .collect(),
        )
    }
}
