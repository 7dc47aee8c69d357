//! Building and signing transactions from proposals.

use zcash_protocol::{PoolType, ShieldedProtocol, TxId};

use walletcore_status::{confirmation_status::ConfirmationStatus, spend_status::SpendStatus};

use crate::chain::transaction::{
    OutPoint, ShieldedOutput, ShieldedSpend, Transaction, TxIn, TxOut,
};

use super::{
    error::KeyError,
    note_encryption::{encode_memo, encrypt_note, encrypt_outgoing, MemoError},
    notes::{OutputId, WalletOutput},
    now,
    propose::Proposal,
    transaction_record::{OutgoingTxData, TransactionRecord},
    LightWallet,
};

#[derive(Debug, Clone)]
pub struct SendProgress {
    pub id: u32,
    pub is_send_in_progress: bool,
    pub progress: u32,
    pub total: u32,
    pub last_error: Option<String>,
    pub last_transaction_id: Option<String>,
}

impl SendProgress {
    pub(crate) fn new(id: u32) -> Self {
        SendProgress {
            id,
            is_send_in_progress: false,
            progress: 0,
            total: 0,
            last_error: None,
            last_transaction_id: None,
        }
    }

    pub fn to_json(&self, sync_interrupt: bool) -> json::JsonValue {
        json::object! {
            "id" => self.id,
            "sending" => self.is_send_in_progress,
            "progress" => self.progress,
            "total" => self.total,
            "txid" => self.last_transaction_id.clone(),
            "error" => self.last_error.clone(),
            "sync_interrupt" => sync_interrupt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Keys(#[from] KeyError),
    #[error(transparent)]
    Memo(#[from] MemoError),
    #[error("{0} has no receiver for the {1} pool")]
    MissingReceiver(String, &'static str),
}

/// A signed transaction and the record the wallet keeps of it until it is mined.
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub transaction: Transaction,
    pub txid: TxId,
    pub record: TransactionRecord,
}

/// An output of the transaction being built that pays the wallet itself.
struct OwnOutput {
    address: String,
    pool: PoolType,
    index: usize,
    value: u64,
    memo: Option<String>,
    nullifier: Option<[u8; 32]>,
    is_change: bool,
}

fn protocol(pool: PoolType) -> Option<ShieldedProtocol> {
    match pool {
        PoolType::Shielded(protocol) => Some(protocol),
        PoolType::Transparent => None,
    }
}

impl LightWallet {
    // Reset the send progress status to blank, with a new id
    pub(crate) async fn reset_send_progress(&self) -> u32 {
        let mut id = 0;
        self.update_send_progress(|p| {
            id = p.id + 1;
            *p = SendProgress::new(id);
            p.is_send_in_progress = true;
        })
        .await;
        id
    }

    // Set the previous send's status as an error or success
    pub(crate) async fn set_send_result(&self, result: Result<String, String>) {
        self.update_send_progress(|p| {
            p.is_send_in_progress = false;
            match result {
                Ok(txids) => p.last_transaction_id = Some(txids),
                Err(e) => p.last_error = Some(e),
            }
        })
        .await;
    }

    /// Signs the proposal's spends and encrypts its outputs, advancing send progress by
    /// one step per spend and output.
    pub(crate) async fn build_transaction(
        &self,
        proposal: &Proposal,
    ) -> Result<BuiltTransaction, BuildError> {
        let keys = self.keys.read().await;
        let spending_key = keys.spending_key()?;
        let viewing_key = keys.viewing_key().clone();
        let ovk = viewing_key.ovk();

        let total = proposal.inputs.len() + proposal.payments.len() + proposal.change.iter().len();
        self.update_send_progress(|p| p.total = total as u32).await;

        let mut transaction = Transaction {
            expiry_height: proposal.expiry_height as u32,
            fee: proposal.fee,
            ..Default::default()
        };
        let mut spent_nullifiers = vec![];
        let mut spent_outpoints = vec![];
        for input in &proposal.inputs {
            match (protocol(input.output_id.pool), input.nullifier) {
                (Some(protocol), Some(nullifier)) => {
                    transaction.shielded_spends.push(ShieldedSpend {
                        protocol,
                        nullifier,
                        spend_auth: spending_key.authorize_spend(&nullifier),
                    });
                    spent_nullifiers.push(nullifier);
                }
                _ => {
                    let prevout = OutPoint {
                        txid: input.output_id.txid,
                        index: input.output_id.index,
                    };
                    transaction.transparent_inputs.push(TxIn {
                        prevout,
                        spend_auth: spending_key.authorize_input(&prevout),
                    });
                    spent_outpoints.push(prevout);
                }
            }
            self.update_send_progress(|p| p.progress += 1).await;
        }

        // Outputs to the wallet's own addresses, recorded once the txid is known.
        let mut own_outputs = vec![];
        let mut outgoing_tx_data = vec![];
        for payment in &proposal.payments {
            let memo = encode_memo(payment.memo.as_deref())?;
            let output_index = match protocol(payment.pool) {
                None => {
                    let script = payment.parsed.transparent.ok_or(BuildError::MissingReceiver(
                        payment.address.clone(),
                        "transparent",
                    ))?;
                    transaction.transparent_outputs.push(TxOut {
                        value: payment.amount,
                        script,
                    });
                    transaction.transparent_outputs.len() - 1
                }
                Some(protocol) => {
                    let receiver = match protocol {
                        ShieldedProtocol::Orchard => payment.parsed.orchard,
                        ShieldedProtocol::Sapling => payment.parsed.sapling,
                    }
                    .ok_or(BuildError::MissingReceiver(
                        payment.address.clone(),
                        super::notes::pool_name(payment.pool),
                    ))?;
                    let note = encrypt_note(&receiver, payment.amount, &memo);
                    let out_ciphertext =
                        encrypt_outgoing(&ovk, &note.cmx, &payment.address, payment.amount, &memo);
                    let own = keys
                        .addresses
                        .by_orchard_receiver(&receiver)
                        .or_else(|| keys.addresses.by_sapling_receiver(&receiver));
                    if let Some(own) = own {
                        own_outputs.push(OwnOutput {
                            address: own.encoded.clone(),
                            pool: payment.pool,
                            index: transaction.shielded_outputs.len(),
                            value: payment.amount,
                            memo: payment.memo.clone(),
                            nullifier: Some(viewing_key.nullifier(&note.cmx)),
                            is_change: false,
                        });
                    }
                    transaction.shielded_outputs.push(ShieldedOutput {
                        protocol,
                        cmx: note.cmx,
                        enc_ciphertext: note.enc_ciphertext,
                        out_ciphertext,
                    });
                    transaction.shielded_outputs.len() - 1
                }
            };
            if !keys.addresses.owns(&payment.parsed) {
                outgoing_tx_data.push(OutgoingTxData {
                    recipient_address: payment.address.clone(),
                    value: payment.amount,
                    memo: payment.memo.clone(),
                    pool: payment.pool,
                    output_index: output_index as u32,
                });
            } else if payment.pool == PoolType::TRANSPARENT {
                own_outputs.push(OwnOutput {
                    address: payment.address.clone(),
                    pool: payment.pool,
                    index: output_index,
                    value: payment.amount,
                    memo: None,
                    nullifier: None,
                    is_change: false,
                });
            }
            self.update_send_progress(|p| p.progress += 1).await;
        }

        if let Some(change) = &proposal.change {
            let note = encrypt_note(&change.receiver, change.value, &encode_memo(None)?);
            own_outputs.push(OwnOutput {
                address: change.address.clone(),
                pool: PoolType::ORCHARD,
                index: transaction.shielded_outputs.len(),
                value: change.value,
                memo: None,
                nullifier: Some(viewing_key.nullifier(&note.cmx)),
                is_change: true,
            });
            transaction.shielded_outputs.push(ShieldedOutput {
                protocol: ShieldedProtocol::Orchard,
                cmx: note.cmx,
                enc_ciphertext: note.enc_ciphertext,
                out_ciphertext: vec![],
            });
            self.update_send_progress(|p| p.progress += 1).await;
        }
        drop(keys);

        let txid = transaction.txid();
        let datetime = now();
        let mut record = TransactionRecord::new(
            txid,
            ConfirmationStatus::Pending((proposal.target_height as u32).into()),
            datetime,
        );
        record.outputs = own_outputs
            .into_iter()
            .map(|own| WalletOutput {
                output_id: OutputId {
                    txid,
                    pool: own.pool,
                    index: own.index as u32,
                },
                address: own.address,
                value: own.value,
                memo: own.memo,
                is_change: own.is_change,
                nullifier: own.nullifier,
                witnessed_height: None,
                spend: SpendStatus::Unspent,
            })
            .collect();
        record.spent_nullifiers = spent_nullifiers;
        record.spent_outpoints = spent_outpoints;
        record.outgoing_tx_data = outgoing_tx_data;
        record.fee = Some(proposal.fee);
        record.zec_price = self.price.read().await.price_at(datetime);
        record.expiry_height = proposal.expiry_height;

        Ok(BuiltTransaction {
            transaction,
            txid,
            record,
        })
    }
}
