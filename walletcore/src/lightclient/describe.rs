//! These functions can be called by consumer to learn about the LightClient.
use json::{object, JsonValue};
use log::warn;

use crate::wallet::{
    balance::WalletBalances, describe::ValueTransfers, error::KeyError, keys::WalletKind,
};

use super::LightClient;

impl LightClient {
    pub async fn do_balance(&self) -> WalletBalances {
        self.wallet.balances().await
    }

    pub async fn do_addresses(&self) -> JsonValue {
        self.wallet.addresses_json().await
    }

    pub async fn do_list_notes(&self, all_notes: bool) -> JsonValue {
        self.wallet.list_notes(all_notes).await
    }

    /// Value transfers with confirmations counted against the server's tip when it is
    /// ahead of the wallet.
    pub async fn value_transfers(&self) -> ValueTransfers {
        let server_height = match self.get_latest_block_height().await {
            Ok(height) => Some(height),
            Err(e) => {
                warn!("could not get the server height, counting confirmations from the wallet: {e}");
                None
            }
        };
        self.wallet.value_transfers(server_height).await
    }

    pub async fn do_seed_phrase(&self) -> Result<JsonValue, KeyError> {
        let keys = self.wallet.keys.read().await;
        match keys.mnemonic() {
            Some(mnemonic) => Ok(object! {
                "seed" => mnemonic.phrase(),
                "birthday" => self.wallet.get_birthday(),
            }),
            None if keys.is_encrypted() => Err(KeyError::Locked),
            None => Err(KeyError::NoSpendCapability),
        }
    }

    pub async fn do_ufvk(&self) -> Result<JsonValue, KeyError> {
        let ufvk = self.wallet.keys.read().await.ufvk()?;
        Ok(object! {
            "ufvk" => ufvk,
            "birthday" => self.wallet.get_birthday(),
        })
    }

    pub async fn do_wallet_kind(&self) -> JsonValue {
        let keys = self.wallet.keys.read().await;
        match keys.kind() {
            WalletKind::Seeded => object! {
                "kind" => "Seeded",
                "encrypted" => keys.is_encrypted(),
                "unlocked" => keys.is_unlocked_for_spending(),
            },
            WalletKind::ViewOnly => object! {
                "kind" => "Loaded from unified full viewing key",
                "transparent" => "View",
                "sapling" => "View",
                "orchard" => "View",
            },
        }
    }

    /// Private keys of the wallet's addresses, or of `address` alone.
    pub async fn do_export(&self, address: Option<&str>) -> Result<JsonValue, String> {
        let keys = self.wallet.keys.read().await;
        let spending_key = keys.spending_key().map_err(|e| e.to_string())?;
        let ufvk = keys.ufvk().map_err(|e| e.to_string())?;

        let exported: Vec<JsonValue> = keys
            .addresses
            .iter()
            .filter(|a| address.map_or(true, |wanted| a.encoded == wanted))
            .map(|a| {
                object! {
                    "address" => a.encoded.clone(),
                    "private_key" => hex::encode(spending_key.address_private_key(a.index)),
                    "viewing_key" => ufvk.clone(),
                }
            })
            .collect();
        match (address, exported.is_empty()) {
            (Some(wanted), true) => Err(format!("Error: {wanted} is not an address of this wallet")),
            _ => Ok(JsonValue::Array(exported)),
        }
    }
}
