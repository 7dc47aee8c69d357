//! This mod contains write and read functionality of impl LightWallet
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use log::{error, info};

use std::io::{self, Error, ErrorKind, Read, Write};

use zcash_encoding::Vector;

use crate::config::WalletConfig;

use super::{
    data::{BlockData, WalletZecPriceInfo},
    keys::{WalletCapability, WalletKind},
    notes::{read_string, write_string},
    tx_map::TxMap,
    LightWallet, WalletOptions,
};

impl LightWallet {
    pub const fn serialized_version() -> u64 {
        1
    }

    /// Writes a consistent snapshot: keys, blocks and transactions are read under their
    /// locks together.
    pub async fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let keys = self.keys.read().await;
        let blocks = self.blocks.read().await;
        let transactions = self.transactions.read().await;

        // Write the version
        writer.write_u64::<LittleEndian>(Self::serialized_version())?;

        keys.write(&mut writer)?;
        Vector::write(&mut writer, &blocks, |w, b| b.write(w))?;
        transactions.write(&mut writer)?;
        drop((transactions, blocks, keys));

        write_string(&mut writer, &self.config.chain.to_string())?;
        self.wallet_options.read().await.write(&mut writer)?;
        writer.write_u64::<LittleEndian>(self.get_birthday())?;
        self.price.read().await.write(&mut writer)
    }

    /// Reads a wallet written by [`LightWallet::write`]. The file must belong to the
    /// chain `config` is for.
    pub async fn read_internal<R: Read>(mut reader: R, config: &WalletConfig) -> io::Result<Self> {
        let external_version = reader.read_u64::<LittleEndian>()?;
        if external_version > Self::serialized_version() {
            let e = format!(
                "Don't know how to read wallet version {}. Do you have the latest version?",
                external_version
            );
            error!("{}", e);
            return Err(io::Error::new(ErrorKind::InvalidData, e));
        }

        info!("Reading wallet version {}", external_version);
        let keys = WalletCapability::read(&mut reader, config.chain)?;
        match keys.kind() {
            WalletKind::Seeded if keys.is_encrypted() => info!("  - Encrypted seed"),
            WalletKind::Seeded => info!("  - Seed"),
            WalletKind::ViewOnly => info!("  - Unified Full Viewing Key"),
        }
        info!("  - {} addresses", keys.addresses.len());

        let blocks = Vector::read(&mut reader, |r| BlockData::read(r))?;
        let transactions = TxMap::read(&mut reader)?;

        let chain_name = read_string(&mut reader)?;
        if chain_name != config.chain.to_string() {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!(
                    "Wallet chain name {} doesn't match expected {}",
                    chain_name, config.chain
                ),
            ));
        }

        let wallet_options = WalletOptions::read(&mut reader)?;
        let birthday = reader.read_u64::<LittleEndian>()?;
        let price = WalletZecPriceInfo::read(&mut reader)?;

        Ok(Self::from_parts(
            config.clone(),
            keys,
            blocks,
            transactions,
            wallet_options,
            birthday,
            price,
        ))
    }
}
