//! Small pieces of wallet state: scanned block hashes and the ZEC price.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use zcash_encoding::Optional;

use crate::chain::compact_formats::BlockHash;

use super::notes::{read_string, write_string};

/// A scanned block the wallet remembers for reorg detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockData {
    pub height: u64,
    pub hash: BlockHash,
}

impl BlockData {
    pub fn serialized_version() -> u64 {
        1
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let height = reader.read_u64::<LittleEndian>()?;
        let mut hash = [0u8; 32];
        reader.read_exact(&mut hash)?;
        Ok(BlockData {
            height,
            hash: BlockHash(hash),
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(self.height)?;
        writer.write_all(&self.hash.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalletZecPriceInfo {
    // Latest price of ZEC and when it was set
    pub zec_price: Option<(u64, f64)>,

    // All prices are in this currency
    pub currency: String,
}

impl Default for WalletZecPriceInfo {
    fn default() -> Self {
        Self {
            zec_price: None,
            currency: "USD".to_string(), // Only USD is supported right now.
        }
    }
}

impl WalletZecPriceInfo {
    pub fn serialized_version() -> u64 {
        1
    }

    /// The current price, if it was set within a day of `datetime`.
    pub fn price_at(&self, datetime: u64) -> Option<f64> {
        let (t, p) = self.zec_price?;
        ((t as i64 - datetime as i64).abs() < 24 * 60 * 60).then_some(p)
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let _version = reader.read_u64::<LittleEndian>()?;
        let zec_price = Optional::read(&mut reader, |r| {
            Ok((r.read_u64::<LittleEndian>()?, r.read_f64::<LittleEndian>()?))
        })?;
        let currency = read_string(&mut reader)?;
        Ok(Self {
            zec_price,
            currency,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(Self::serialized_version())?;
        Optional::write(&mut writer, self.zec_price, |w, (t, p)| {
            w.write_u64::<LittleEndian>(t)?;
            w.write_f64::<LittleEndian>(p)
        })?;
        write_string(writer, &self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_is_only_used_near_its_time() {
        let info = WalletZecPriceInfo {
            zec_price: Some((1_000_000, 30.0)),
            ..Default::default()
        };
        assert_eq!(info.price_at(1_000_500), Some(30.0));
        assert_eq!(info.price_at(1_000_000 + 2 * 24 * 60 * 60), None);

        let mut bytes = vec![];
        info.write(&mut bytes).unwrap();
        assert_eq!(WalletZecPriceInfo::read(&bytes[..]).unwrap(), info);
    }
}
