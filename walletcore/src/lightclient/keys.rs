//! Commands that change the wallet's keys or settings. Each one saves the wallet when it
//! succeeds.

use json::{object, JsonValue};
use log::{info, warn};

use crate::wallet::{
    address::ReceiverSelection, error::KeyError, keys::WalletCapability, MemoDownloadOption,
};

use super::LightClient;

/// A setting readable with `getoption` and writable with `setoption`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletOption {
    DownloadMemos(MemoDownloadOption),
    /// `None` turns the filter off.
    TransactionFilterThreshold(Option<u32>),
}

impl WalletOption {
    pub const NAMES: [&'static str; 2] = ["download_memos", "transaction_filter_threshold"];

    pub fn name(&self) -> &'static str {
        match self {
            WalletOption::DownloadMemos(_) => Self::NAMES[0],
            WalletOption::TransactionFilterThreshold(_) => Self::NAMES[1],
        }
    }

    /// Parses `name=value`. A negative threshold turns the filter off.
    pub fn parse(name: &str, value: &str) -> Result<Self, String> {
        match name {
            "download_memos" => Ok(WalletOption::DownloadMemos(value.parse()?)),
            "transaction_filter_threshold" => match value.parse::<i64>() {
                Ok(threshold) if threshold < 0 => Ok(WalletOption::TransactionFilterThreshold(None)),
                Ok(threshold) => u32::try_from(threshold)
                    .map(|t| WalletOption::TransactionFilterThreshold(Some(t)))
                    .map_err(|_| format!("{value} is too large")),
                Err(e) => Err(format!("Couldn't parse {value} as a number: {e}")),
            },
            _ => Err(format!("{name} is not a valid option")),
        }
    }
}

impl LightClient {
    async fn save_after(&self, what: &str) {
        if let Err(e) = self.do_save().await {
            warn!("could not save wallet after {what}: {e}");
        }
    }

    async fn change_keys(
        &self,
        what: &str,
        change: impl FnOnce(&mut WalletCapability) -> Result<(), KeyError>,
    ) -> Result<(), KeyError> {
        change(&mut *self.wallet.keys.write().await)?;
        info!("Wallet {what}");
        self.save_after(what).await;
        Ok(())
    }

    pub async fn do_encrypt(&self, password: &str) -> Result<(), KeyError> {
        self.change_keys("encrypted", |keys| keys.encrypt(password))
            .await
    }

    pub async fn do_lock(&self) -> Result<(), KeyError> {
        self.change_keys("locked", |keys| keys.lock()).await
    }

    pub async fn do_unlock(&self, password: &str) -> Result<(), KeyError> {
        self.change_keys("unlocked", |keys| keys.unlock(password))
            .await
    }

    /// Removes encryption for good.
    pub async fn do_decrypt(&self, password: &str) -> Result<(), KeyError> {
        self.change_keys("decrypted", |keys| keys.remove_encryption(password))
            .await
    }

    /// Derives the next address with the receivers in `receivers` (any of `o`, `z`,
    /// `t`).
    pub async fn do_new_address(&self, receivers: &str) -> Result<JsonValue, String> {
        let selection = receivers
            .parse::<ReceiverSelection>()
            .map_err(|e| e.to_string())?;
        let encoded = {
            let mut keys = self.wallet.keys.write().await;
            keys.new_address(selection)
                .map_err(|e| e.to_string())?
                .encoded
                .clone()
        };
        self.save_after("adding an address").await;
        Ok(JsonValue::Array(vec![encoded.into()]))
    }

    pub async fn get_option(&self, name: &str) -> Result<JsonValue, String> {
        let options = *self.wallet.wallet_options.read().await;
        let value: JsonValue = match name {
            "download_memos" => options.download_memos.to_string().into(),
            "transaction_filter_threshold" => match options.transaction_filter_threshold {
                Some(threshold) => threshold.into(),
                None => (-1).into(),
            },
            _ => return Err(format!("Error: {name} is not a valid option")),
        };
        let mut res = object! {};
        res[name] = value;
        Ok(res)
    }

    pub async fn set_option(&self, option: WalletOption) {
        {
            let mut options = self.wallet.wallet_options.write().await;
            match option {
                WalletOption::DownloadMemos(value) => options.download_memos = value,
                WalletOption::TransactionFilterThreshold(value) => {
                    options.transaction_filter_threshold = value
                }
            }
        }
        self.save_after("changing an option").await;
    }

    /// Drops everything learned from the chain. The next sync starts at the birthday.
    pub async fn do_clear(&self) {
        self.wallet.clear_all().await;
        self.save_after("clearing").await;
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::lightclient::test_support::test_client;

    #[test_case("download_memos", "none", WalletOption::DownloadMemos(MemoDownloadOption::NoMemos) ; "memos off")]
    #[test_case("download_memos", "all", WalletOption::DownloadMemos(MemoDownloadOption::AllMemos) ; "all memos")]
    #[test_case("transaction_filter_threshold", "500", WalletOption::TransactionFilterThreshold(Some(500)) ; "threshold")]
    #[test_case("transaction_filter_threshold", "-1", WalletOption::TransactionFilterThreshold(None) ; "no threshold")]
    fn options_parse(name: &str, value: &str, expected: WalletOption) {
        assert_eq!(WalletOption::parse(name, value), Ok(expected));
    }

    #[test]
    fn bad_options_are_rejected() {
        assert!(WalletOption::parse("colour", "blue").is_err());
        assert!(WalletOption::parse("transaction_filter_threshold", "lots").is_err());
        assert!(WalletOption::parse("download_memos", "maybe").is_err());
    }

    #[tokio::test]
    async fn options_round_trip_through_the_client() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _chain) = test_client(&dir).await;
        assert_eq!(
            client.get_option("transaction_filter_threshold").await.unwrap()["transaction_filter_threshold"],
            -1
        );
        client
            .set_option(WalletOption::TransactionFilterThreshold(Some(50)))
            .await;
        client
            .set_option(WalletOption::DownloadMemos(MemoDownloadOption::NoMemos))
            .await;
        assert_eq!(
            client.get_option("transaction_filter_threshold").await.unwrap()["transaction_filter_threshold"],
            50
        );
        assert_eq!(
            client.get_option("download_memos").await.unwrap()["download_memos"],
            "none"
        );
        assert!(client.get_option("colour").await.is_err());
    }

    #[tokio::test]
    async fn encryption_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _chain) = test_client(&dir).await;

        client.do_encrypt("hunter2").await.unwrap();
        assert_eq!(client.do_seed_phrase().await, Err(KeyError::Locked));
        assert_eq!(client.do_lock().await, Err(KeyError::AlreadyLocked));
        assert_eq!(
            client.do_unlock("wrong").await,
            Err(KeyError::WrongPassword)
        );
        client.do_unlock("hunter2").await.unwrap();
        assert!(client.do_seed_phrase().await.is_ok());
        client.do_lock().await.unwrap();
        client.do_decrypt("hunter2").await.unwrap();
        assert_eq!(client.do_lock().await, Err(KeyError::NotEncrypted));
        assert!(client.do_seed_phrase().await.is_ok());
    }

    #[tokio::test]
    async fn new_addresses_are_added() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _chain) = test_client(&dir).await;

        let added = client.do_new_address("zt").await.unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(client.do_addresses().await.len(), 2);
        assert!(client.do_new_address("x").await.is_err());
    }
}
