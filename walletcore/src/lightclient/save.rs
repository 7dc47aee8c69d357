//! Writing the wallet to its file and reading it back. The wallet is saved after every
//! scanned batch and every broadcast, never midway through either.

use log::{debug, error};

use std::{
    fs::{remove_file, File},
    io::{self, BufReader, Error, ErrorKind, Read, Write},
    path::Path,
    sync::Arc,
};

use crate::{chain::ChainSource, config::WalletConfig, wallet::LightWallet};

use super::LightClient;

impl LightClient {
    /// Serializes the wallet and replaces the wallet file with it. Concurrent saves are
    /// serialized, and each one writes a consistent snapshot.
    pub async fn do_save(&self) -> Result<(), String> {
        let _lock = self.save_lock.lock().await;

        let mut buffer: Vec<u8> = vec![];
        if let Err(e) = self.wallet.write(&mut buffer).await {
            let err = format!("ERR: {}", e);
            error!("{}", err);
            return Err(e.to_string());
        }

        let path = self.config.get_wallet_path().map_err(|e| e.to_string())?;
        match Self::write_to_file(&path, &buffer) {
            Ok(()) => {
                debug!("Saved wallet to {}", path.display());
                Ok(())
            }
            Err(e) => {
                let err = format!("ERR: {}", e);
                error!("{}", err);
                Err(e.to_string())
            }
        }
    }

    fn write_to_file(path: &Path, buffer: &[u8]) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(buffer)?;
        file.sync_all()
    }

    /// Removes the wallet file.
    pub async fn do_delete(&self) -> Result<(), String> {
        let _lock = self.save_lock.lock().await;
        if !self.config.wallet_exists() {
            let err = "Error: File does not exist, nothing to delete.".to_string();
            error!("{}", err);
            return Err(err);
        }
        let path = self.config.get_wallet_path().map_err(|e| e.to_string())?;
        remove_file(path).map_err(|e| {
            error!("ERR: {}", e);
            e.to_string()
        })
    }

    pub async fn read_wallet_from_buffer_async<R: Read>(
        config: &WalletConfig,
        mut reader: R,
        chain: Arc<dyn ChainSource>,
    ) -> io::Result<Self> {
        let wallet = LightWallet::read_internal(&mut reader, config).await?;
        let lc = LightClient::create_from_wallet(wallet, chain);

        debug!("Read wallet with birthday {}", lc.wallet.get_birthday());
        debug!("Created LightClient to {}", &config.get_lightwalletd_uri());

        Ok(lc)
    }

    pub async fn read_wallet_from_disk(
        config: &WalletConfig,
        chain: Arc<dyn ChainSource>,
    ) -> io::Result<Self> {
        let wallet_path = if config.wallet_exists() {
            config.get_wallet_path()?
        } else {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!(
                    "Cannot read wallet. No file at {:?}",
                    config.get_wallet_path()?.as_os_str()
                ),
            ));
        };
        LightClient::read_wallet_from_buffer_async(
            config,
            BufReader::new(File::open(wallet_path)?),
            chain,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lightclient::test_support::{first_address, test_client};

    #[tokio::test(flavor = "multi_thread")]
    async fn saved_wallet_reads_back_with_its_history() {
        let dir = tempfile::tempdir().unwrap();
        let (client, chain) = test_client(&dir).await;
        let address = first_address(&client).await;
        chain.fund(&address, 40_000, Some("saved")).unwrap();
        chain.mine_block();
        chain.mine_empty_blocks(3);
        client.do_sync().await.unwrap();
        client.do_save().await.unwrap();

        let read = LightClient::read_wallet_from_disk(client.config(), chain.clone())
            .await
            .unwrap();
        assert_eq!(read.wallet.last_synced_height().await, 4);
        assert_eq!(read.wallet.get_birthday(), 1);
        assert_eq!(first_address(&read).await, address);
        assert_eq!(
            read.wallet.balances().await.to_json(),
            client.wallet.balances().await.to_json()
        );
    }

    #[tokio::test]
    async fn missing_wallet_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (client, chain) = test_client(&dir).await;
        client.do_delete().await.unwrap();
        assert!(!client.config().wallet_exists());

        let read = LightClient::read_wallet_from_disk(client.config(), chain).await;
        assert_eq!(read.err().unwrap().kind(), ErrorKind::NotFound);
        assert!(client.do_delete().await.is_err());
    }
}
