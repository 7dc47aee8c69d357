//! Per pool balance totals.
use zcash_protocol::PoolType;

use super::{notes::WalletOutput, transaction_record::TransactionRecord, LightWallet};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolBalance {
    /// Everything unspent, including outputs of pending transactions.
    pub total: u64,
    /// Unspent outputs with enough confirmations.
    pub verified: u64,
    /// Verified outputs the wallet can spend right now.
    pub spendable: u64,
    pub unverified: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalletBalances {
    pub orchard: PoolBalance,
    pub sapling: PoolBalance,
    pub transparent: PoolBalance,
}

impl WalletBalances {
    pub fn pool(&self, pool: PoolType) -> &PoolBalance {
        match pool {
            PoolType::ORCHARD => &self.orchard,
            PoolType::SAPLING => &self.sapling,
            _ => &self.transparent,
        }
    }

    fn pool_mut(&mut self, pool: PoolType) -> &mut PoolBalance {
        match pool {
            PoolType::ORCHARD => &mut self.orchard,
            PoolType::SAPLING => &mut self.sapling,
            _ => &mut self.transparent,
        }
    }

    pub fn total(&self) -> u64 {
        self.orchard.total + self.sapling.total + self.transparent.total
    }

    pub fn to_json(&self) -> json::JsonValue {
        json::object! {
            "orchard_balance" => self.orchard.total,
            "verified_orchard_balance" => self.orchard.verified,
            "spendable_orchard_balance" => self.orchard.spendable,
            "unverified_orchard_balance" => self.orchard.unverified,
            "sapling_balance" => self.sapling.total,
            "verified_sapling_balance" => self.sapling.verified,
            "spendable_sapling_balance" => self.sapling.spendable,
            "unverified_sapling_balance" => self.sapling.unverified,
            "transparent_balance" => self.transparent.total,
            "verified_transparent_balance" => self.transparent.verified,
            "spendable_transparent_balance" => self.transparent.spendable,
            "unverified_transparent_balance" => self.transparent.unverified,
        }
    }
}

/// Unspent and created by a transaction with at least `min_confirmations` at `synced_height`.
pub(crate) fn is_verified(
    record: &TransactionRecord,
    output: &WalletOutput,
    synced_height: u64,
    min_confirmations: u32,
) -> bool {
    output.spend.is_unspent()
        && record.status.get_confirmed_height().is_some_and(|height| {
            let height = u64::from(height);
            height <= synced_height && synced_height - height + 1 >= u64::from(min_confirmations)
        })
}

/// Verified and, for shielded notes, witnessed, so a spend can be built.
pub(crate) fn is_spendable(
    record: &TransactionRecord,
    output: &WalletOutput,
    synced_height: u64,
    min_confirmations: u32,
) -> bool {
    is_verified(record, output, synced_height, min_confirmations)
        && (output.nullifier.is_none() || output.witnessed_height.is_some())
}

impl LightWallet {
    pub async fn balances(&self) -> WalletBalances {
        let can_spend = self.keys.read().await.can_spend();
        let synced_height = self.last_synced_height().await;
        let min_confirmations = self.config.min_confirmations;

        let mut balances = WalletBalances::default();
        for (record, output) in self.transactions.read().await.outputs() {
            if !output.spend.is_unspent() {
                continue;
            }
            let pool = balances.pool_mut(output.pool());
            pool.total += output.value;
            if is_verified(record, output, synced_height, min_confirmations) {
                pool.verified += output.value;
                if can_spend && is_spendable(record, output, synced_height, min_confirmations) {
                    pool.spendable += output.value;
                }
            } else {
                pool.unverified += output.value;
            }
        }
        balances
    }
}
