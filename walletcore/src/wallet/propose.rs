//! creating proposals from wallet data
//!
//! A proposal fixes the notes a transaction will spend, its outputs and its fee. Notes
//! held by an outstanding proposal are reserved: no other proposal can select them
//! until the first is confirmed or abandoned.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use log::debug;
use zcash_protocol::{PoolType, ShieldedProtocol};

use crate::config::TRANSACTION_EXPIRY_DELTA;

use super::{
    address::{parse_address_for, AddressKind, ParsedAddress},
    balance::is_spendable,
    error::{AddressError, KeyError},
    keys::WalletCapability,
    note_encryption::MEMO_SIZE,
    notes::OutputId,
    tx_map::TxMap,
    LightWallet,
};

pub const MARGINAL_FEE: u64 = 5_000;
pub const GRACE_ACTIONS: u64 = 2;
/// The fee of the smallest possible transaction.
pub const DEFAULT_FEE: u64 = MARGINAL_FEE * GRACE_ACTIONS;
pub const MAX_MONEY: u64 = 21_000_000 * 100_000_000;

/// Inputs and outputs of a transaction, by pool.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActionCounts {
    pub transparent_inputs: u64,
    pub transparent_outputs: u64,
    pub sapling_spends: u64,
    pub sapling_outputs: u64,
    pub orchard_spends: u64,
    pub orchard_outputs: u64,
}

impl ActionCounts {
    pub fn logical_actions(&self) -> u64 {
        let orchard = if self.orchard_spends + self.orchard_outputs > 0 {
            GRACE_ACTIONS.max(self.orchard_spends.max(self.orchard_outputs))
        } else {
            0
        };
        self.transparent_inputs.max(self.transparent_outputs)
            + self.sapling_spends.max(self.sapling_outputs)
            + orchard
    }

    fn add_spend(&mut self, pool: PoolType) {
        match pool {
            PoolType::ORCHARD => self.orchard_spends += 1,
            PoolType::SAPLING => self.sapling_spends += 1,
            _ => self.transparent_inputs += 1,
        }
    }

    fn add_output(&mut self, pool: PoolType) {
        match pool {
            PoolType::ORCHARD => self.orchard_outputs += 1,
            PoolType::SAPLING => self.sapling_outputs += 1,
            _ => self.transparent_outputs += 1,
        }
    }
}

/// ZIP-317 conventional fee.
pub fn zip317_fee(counts: &ActionCounts) -> u64 {
    MARGINAL_FEE * GRACE_ACTIONS.max(counts.logical_actions())
}

/// One payment requested by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub address: String,
    pub amount: u64,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProposalId(pub u64);

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalKind {
    Send,
    Shield,
}

/// A wallet output chosen to fund a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedInput {
    pub output_id: OutputId,
    pub value: u64,
    pub nullifier: Option<[u8; 32]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedPayment {
    pub address: String,
    pub parsed: ParsedAddress,
    pub pool: PoolType,
    pub amount: u64,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedChange {
    pub address: String,
    pub receiver: [u8; 43],
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub id: ProposalId,
    pub kind: ProposalKind,
    pub inputs: Vec<SelectedInput>,
    pub payments: Vec<ProposedPayment>,
    pub change: Option<ProposedChange>,
    pub fee: u64,
    pub target_height: u64,
    pub expiry_height: u64,
}

impl Proposal {
    pub fn total_input(&self) -> u64 {
        self.inputs.iter().map(|i| i.value).sum()
    }

    pub fn total_payments(&self) -> u64 {
        self.payments.iter().map(|p| p.amount).sum()
    }

    pub fn to_json(&self) -> json::JsonValue {
        json::object! {
            "fee" => self.fee,
            "proposal_id" => self.id.0,
        }
    }
}

/// Outstanding proposals and the notes they hold.
#[derive(Debug, Default)]
pub struct ProposalStore {
    next_id: u64,
    outstanding: BTreeMap<ProposalId, Proposal>,
    confirming: BTreeSet<ProposalId>,
}

impl ProposalStore {
    fn next_id(&mut self) -> ProposalId {
        self.next_id += 1;
        ProposalId(self.next_id)
    }

    /// Outputs selected by any outstanding proposal.
    pub fn reserved(&self) -> BTreeSet<OutputId> {
        self.outstanding
            .values()
            .flat_map(|p| p.inputs.iter().map(|i| i.output_id))
            .collect()
    }

    fn reserving(&self, output_id: &OutputId) -> Option<ProposalId> {
        self.outstanding
            .values()
            .find(|p| p.inputs.iter().any(|i| &i.output_id == output_id))
            .map(|p| p.id)
    }

    fn insert(&mut self, proposal: Proposal) {
        self.outstanding.insert(proposal.id, proposal);
    }

    pub fn get(&self, id: ProposalId) -> Option<&Proposal> {
        self.outstanding.get(&id)
    }

    pub fn ids(&self) -> Vec<ProposalId> {
        self.outstanding.keys().copied().collect()
    }

    /// Marks `id` as being confirmed so it cannot be confirmed twice at once.
    pub(crate) fn begin_confirm(&mut self, id: ProposalId) -> Option<Proposal> {
        let proposal = self.outstanding.get(&id)?;
        if !self.confirming.insert(id) {
            return None;
        }
        Some(proposal.clone())
    }

    /// Returns a proposal whose broadcast failed to the outstanding set.
    pub(crate) fn confirm_failed(&mut self, id: ProposalId) {
        self.confirming.remove(&id);
    }

    pub(crate) fn confirm_succeeded(&mut self, id: ProposalId) {
        self.confirming.remove(&id);
        self.outstanding.remove(&id);
    }

    pub fn abandon(&mut self, id: ProposalId) -> Option<Proposal> {
        if self.confirming.contains(&id) {
            return None;
        }
        self.outstanding.remove(&id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProposeError {
    #[error("no recipients")]
    NoRecipients,
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("amount {0} is out of range")]
    AmountOutOfRange(u64),
    #[error("memo is {len} bytes, the maximum is {MEMO_SIZE}")]
    MemoTooLong { len: usize },
    #[error("transparent address {0} cannot receive a memo")]
    MemoToTransparent(String),
    #[error("insufficient funds: need {need} zatoshis, have {have} spendable")]
    InsufficientFunds { need: u64, have: u64 },
    #[error("insufficient funds: the notes needed are reserved by proposal {0}, confirm or abandon it first")]
    FundsReserved(ProposalId),
    #[error(transparent)]
    Keys(#[from] KeyError),
    #[error("wallet has no orchard address to receive change")]
    NoChangeAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShieldError {
    #[error("nothing to shield")]
    NothingToShield,
    #[error("{value} zatoshis to shield does not cover the fee of {fee}")]
    InsufficientToShield { value: u64, fee: u64 },
    #[error("wallet has no orchard address to shield to")]
    NoOrchardReceiver,
    #[error(transparent)]
    Keys(#[from] KeyError),
}

/// Which funds `shield` moves to orchard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShieldSource {
    All,
    Transparent,
    Sapling,
}

impl ShieldSource {
    fn includes(&self, pool: PoolType) -> bool {
        match self {
            ShieldSource::All => pool != PoolType::ORCHARD,
            ShieldSource::Transparent => pool == PoolType::TRANSPARENT,
            ShieldSource::Sapling => pool == PoolType::SAPLING,
        }
    }
}

impl FromStr for ShieldSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(ShieldSource::All),
            "transparent" => Ok(ShieldSource::Transparent),
            "sapling" => Ok(ShieldSource::Sapling),
            _ => Err(format!("unknown pool {s}, expected all, transparent or sapling")),
        }
    }
}

fn check_can_spend(keys: &WalletCapability) -> Result<(), KeyError> {
    if keys.can_spend() {
        Ok(())
    } else if keys.is_encrypted() {
        Err(KeyError::Locked)
    } else {
        Err(KeyError::NoSpendCapability)
    }
}

fn validate_recipients(
    recipients: Vec<Recipient>,
    keys: &WalletCapability,
) -> Result<Vec<ProposedPayment>, ProposeError> {
    if recipients.is_empty() {
        return Err(ProposeError::NoRecipients);
    }
    let mut total = 0u64;
    let mut payments = Vec::with_capacity(recipients.len());
    for recipient in recipients {
        let parsed = parse_address_for(&recipient.address, keys.chain())?;
        if recipient.amount > MAX_MONEY {
            return Err(ProposeError::AmountOutOfRange(recipient.amount));
        }
        total = total
            .checked_add(recipient.amount)
            .filter(|t| *t <= MAX_MONEY)
            .ok_or(ProposeError::AmountOutOfRange(recipient.amount))?;
        let memo = recipient.memo.filter(|m| !m.is_empty());
        if let Some(memo) = &memo {
            if memo.len() > MEMO_SIZE {
                return Err(ProposeError::MemoTooLong { len: memo.len() });
            }
            if parsed.kind == AddressKind::Transparent {
                return Err(ProposeError::MemoToTransparent(recipient.address));
            }
        }
        payments.push(ProposedPayment {
            pool: parsed.preferred_pool(),
            address: recipient.address,
            parsed,
            amount: recipient.amount,
            memo,
        });
    }
    Ok(payments)
}

/// Spendable shielded notes, orchard first, each pool largest first.
fn candidate_notes(
    transactions: &TxMap,
    synced_height: u64,
    min_confirmations: u32,
) -> Vec<SelectedInput> {
    let mut candidates: Vec<SelectedInput> = transactions
        .outputs()
        .filter(|(record, output)| {
            output.pool() != PoolType::TRANSPARENT
                && is_spendable(record, output, synced_height, min_confirmations)
        })
        .map(|(_, output)| SelectedInput {
            output_id: output.output_id,
            value: output.value,
            nullifier: output.nullifier,
        })
        .collect();
    candidates.sort_by(|a, b| {
        let orchard_first = |i: &SelectedInput| i.output_id.pool != PoolType::ORCHARD;
        orchard_first(a)
            .cmp(&orchard_first(b))
            .then(b.value.cmp(&a.value))
            .then(a.output_id.cmp(&b.output_id))
    });
    candidates
}

#[derive(Debug)]
struct Selection {
    inputs: Vec<SelectedInput>,
    fee: u64,
    change: u64,
}

/// Takes candidates in order until they cover the payments and the fee, adding a change
/// output when the inputs exceed that.
fn select_inputs(
    candidates: &[SelectedInput],
    payments: &[ProposedPayment],
) -> Result<Selection, u64> {
    let target: u64 = payments.iter().map(|p| p.amount).sum();
    let mut output_counts = ActionCounts::default();
    for payment in payments {
        output_counts.add_output(payment.pool);
    }

    let mut counts = output_counts;
    let mut total_in = 0u64;
    for (taken, candidate) in candidates.iter().enumerate() {
        counts.add_spend(candidate.output_id.pool);
        total_in += candidate.value;

        let fee = zip317_fee(&counts);
        if total_in == target + fee {
            return Ok(Selection {
                inputs: candidates[..=taken].to_vec(),
                fee,
                change: 0,
            });
        }
        let mut with_change = counts;
        with_change.add_output(PoolType::ORCHARD);
        let fee = zip317_fee(&with_change);
        if total_in > target + fee {
            return Ok(Selection {
                inputs: candidates[..=taken].to_vec(),
                fee,
                change: total_in - target - fee,
            });
        }
    }

    counts.add_output(PoolType::ORCHARD);
    Err(target + zip317_fee(&counts))
}

impl LightWallet {
    /// Creates and stores a proposal paying `recipients`.
    pub async fn propose_send(&self, recipients: Vec<Recipient>) -> Result<Proposal, ProposeError> {
        let mut proposals = self.proposals.lock().await;
        let keys = self.keys.read().await;
        let payments = validate_recipients(recipients, &keys)?;
        check_can_spend(&keys)?;

        let synced_height = self.last_synced_height().await;
        let transactions = self.transactions.read().await;
        let candidates = candidate_notes(&transactions, synced_height, self.config.min_confirmations);
        let reserved = proposals.reserved();
        let (free, held): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| !reserved.contains(&c.output_id));

        let selection = match select_inputs(&free, &payments) {
            Ok(selection) => selection,
            Err(need) => {
                let mut all = free.clone();
                all.extend(held.iter().cloned());
                if let (Ok(_), Some(reserved_by)) = (
                    select_inputs(&all, &payments),
                    held.first().and_then(|h| proposals.reserving(&h.output_id)),
                ) {
                    return Err(ProposeError::FundsReserved(reserved_by));
                }
                return Err(ProposeError::InsufficientFunds {
                    need,
                    have: free.iter().map(|c| c.value).sum(),
                });
            }
        };

        let change = if selection.change > 0 {
            let address = keys
                .addresses
                .first_orchard()
                .ok_or(ProposeError::NoChangeAddress)?;
            Some(ProposedChange {
                address: address.encoded.clone(),
                receiver: address.orchard.ok_or(ProposeError::NoChangeAddress)?,
                value: selection.change,
            })
        } else {
            None
        };

        let target_height = synced_height + 1;
        let proposal = Proposal {
            id: proposals.next_id(),
            kind: ProposalKind::Send,
            inputs: selection.inputs,
            payments,
            change,
            fee: selection.fee,
            target_height,
            expiry_height: target_height + u64::from(TRANSACTION_EXPIRY_DELTA),
        };
        debug!(
            "Proposal {} spends {} inputs with fee {}",
            proposal.id,
            proposal.inputs.len(),
            proposal.fee
        );
        proposals.insert(proposal.clone());
        Ok(proposal)
    }

    /// Creates and stores a proposal moving `source` funds to the wallet's orchard receiver.
    pub async fn propose_shield(&self, source: ShieldSource) -> Result<Proposal, ShieldError> {
        let mut proposals = self.proposals.lock().await;
        let keys = self.keys.read().await;
        check_can_spend(&keys)?;
        let destination = keys
            .addresses
            .first_orchard()
            .ok_or(ShieldError::NoOrchardReceiver)?;
        let receiver = destination.orchard.ok_or(ShieldError::NoOrchardReceiver)?;

        let synced_height = self.last_synced_height().await;
        let transactions = self.transactions.read().await;
        let reserved = proposals.reserved();
        let mut inputs: Vec<SelectedInput> = transactions
            .outputs()
            .filter(|(record, output)| {
                source.includes(output.pool())
                    && !reserved.contains(&output.output_id)
                    && is_spendable(record, output, synced_height, self.config.min_confirmations)
            })
            .map(|(_, output)| SelectedInput {
                output_id: output.output_id,
                value: output.value,
                nullifier: output.nullifier,
            })
            .collect();
        if inputs.is_empty() {
            return Err(ShieldError::NothingToShield);
        }
        inputs.sort_by_key(|i| i.output_id);

        let mut counts = ActionCounts::default();
        for input in &inputs {
            counts.add_spend(input.output_id.pool);
        }
        counts.add_output(PoolType::ORCHARD);
        let fee = zip317_fee(&counts);
        let value: u64 = inputs.iter().map(|i| i.value).sum();
        if value <= fee {
            return Err(ShieldError::InsufficientToShield { value, fee });
        }

        let target_height = synced_height + 1;
        let proposal = Proposal {
            id: proposals.next_id(),
            kind: ProposalKind::Shield,
            inputs,
            payments: vec![ProposedPayment {
                address: destination.encoded.clone(),
                parsed: ParsedAddress {
                    network: keys.chain().to_zcash_address_network(),
                    kind: AddressKind::Unified,
                    orchard: Some(receiver),
                    sapling: None,
                    transparent: None,
                },
                pool: PoolType::Shielded(ShieldedProtocol::Orchard),
                amount: value - fee,
                memo: None,
            }],
            change: None,
            fee,
            target_height,
            expiry_height: target_height + u64::from(TRANSACTION_EXPIRY_DELTA),
        };
        proposals.insert(proposal.clone());
        Ok(proposal)
    }

    /// Drops an outstanding proposal, releasing its notes.
    pub async fn abandon_proposal(&self, id: ProposalId) -> bool {
        self.proposals.lock().await.abandon(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(ActionCounts::default(), 10_000 ; "empty pays the grace actions")]
    #[test_case(ActionCounts { orchard_spends: 1, orchard_outputs: 1, transparent_outputs: 1, ..Default::default() }, 15_000 ; "orchard to transparent with change")]
    #[test_case(ActionCounts { orchard_spends: 1, orchard_outputs: 2, ..Default::default() }, 10_000 ; "orchard to orchard")]
    #[test_case(ActionCounts { transparent_inputs: 3, orchard_outputs: 1, ..Default::default() }, 25_000 ; "shield three utxos")]
    #[test_case(ActionCounts { sapling_spends: 1, sapling_outputs: 2, ..Default::default() }, 10_000 ; "sapling only")]
    fn fee_rule(counts: ActionCounts, fee: u64) {
        assert_eq!(zip317_fee(&counts), fee);
    }

    fn input(pool: PoolType, index: u32, value: u64) -> SelectedInput {
        SelectedInput {
            output_id: OutputId {
                txid: zcash_protocol::TxId::from_bytes([index as u8; 32]),
                pool,
                index,
            },
            value,
            nullifier: Some([index as u8; 32]),
        }
    }

    fn payment(pool: PoolType, amount: u64) -> ProposedPayment {
        ProposedPayment {
            address: String::new(),
            parsed: ParsedAddress {
                network: zcash_address::Network::Regtest,
                kind: AddressKind::Unified,
                orchard: None,
                sapling: None,
                transparent: None,
            },
            pool,
            amount,
            memo: None,
        }
    }

    #[test]
    fn selection_adds_change_or_matches_exactly() {
        let candidates = [input(PoolType::ORCHARD, 1, 200_000_000)];
        let selection =
            select_inputs(&candidates, &[payment(PoolType::TRANSPARENT, 100_000_000)]).unwrap();
        assert_eq!(selection.fee, 15_000);
        assert_eq!(selection.change, 100_000_000 - 15_000);

        let exact = [input(PoolType::ORCHARD, 1, 110_000)];
        let selection = select_inputs(&exact, &[payment(PoolType::ORCHARD, 100_000)]).unwrap();
        assert_eq!(selection.fee, 10_000);
        assert_eq!(selection.change, 0);
    }

    #[test]
    fn selection_reports_what_it_needed() {
        let candidates = [input(PoolType::ORCHARD, 1, 50_000)];
        let need = select_inputs(&candidates, &[payment(PoolType::ORCHARD, 100_000)]).unwrap_err();
        assert_eq!(need, 110_000);
    }

    #[test]
    fn store_reserves_until_settled() {
        let mut store = ProposalStore::default();
        let id = store.next_id();
        store.insert(Proposal {
            id,
            kind: ProposalKind::Send,
            inputs: vec![input(PoolType::ORCHARD, 1, 5)],
            payments: vec![],
            change: None,
            fee: 0,
            target_height: 1,
            expiry_height: 41,
        });
        assert_eq!(store.reserved().len(), 1);

        assert!(store.begin_confirm(id).is_some());
        assert!(store.begin_confirm(id).is_none());
        assert!(store.abandon(id).is_none());
        store.confirm_failed(id);
        assert_eq!(store.reserved().len(), 1);

        assert!(store.abandon(id).is_some());
        assert!(store.reserved().is_empty());
        assert_ne!(store.next_id(), id);
    }

    #[test_case("all", ShieldSource::All ; "all")]
    #[test_case("transparent", ShieldSource::Transparent ; "transparent")]
    #[test_case("sapling", ShieldSource::Sapling ; "sapling")]
    fn shield_source(s: &str, expected: ShieldSource) {
        assert_eq!(s.parse::<ShieldSource>().unwrap(), expected);
    }
}
