//! Outputs the wallet owns, shielded notes and transparent UTXOs alike.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use zcash_encoding::Optional;
use zcash_protocol::{PoolType, ShieldedProtocol, TxId};

use walletcore_status::{confirmation_status::ConfirmationStatus, spend_status::SpendStatus};

use crate::chain::transaction::{read_txid, write_txid, OutPoint};

/// Lowercase pool name as reported to callers.
pub fn pool_name(pool: PoolType) -> &'static str {
    match pool {
        PoolType::Transparent => "transparent",
        PoolType::Shielded(ShieldedProtocol::Sapling) => "sapling",
        PoolType::Shielded(ShieldedProtocol::Orchard) => "orchard",
    }
}

pub(crate) fn read_pool<R: Read>(mut reader: R) -> io::Result<PoolType> {
    match reader.read_u8()? {
        0 => Ok(PoolType::TRANSPARENT),
        1 => Ok(PoolType::SAPLING),
        2 => Ok(PoolType::ORCHARD),
        tag => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown pool {tag}"),
        )),
    }
}

pub(crate) fn write_pool<W: Write>(mut writer: W, pool: PoolType) -> io::Result<()> {
    writer.write_u8(match pool {
        PoolType::Transparent => 0,
        PoolType::Shielded(ShieldedProtocol::Sapling) => 1,
        PoolType::Shielded(ShieldedProtocol::Orchard) => 2,
    })
}

pub(crate) fn read_confirmation_status<R: Read>(mut reader: R) -> io::Result<ConfirmationStatus> {
    let pending = reader.read_u8()? == 0;
    let height = reader.read_u32::<LittleEndian>()?;
    Ok(ConfirmationStatus::from_blockheight_and_pending_bool(
        height.into(),
        pending,
    ))
}

pub(crate) fn write_confirmation_status<W: Write>(
    mut writer: W,
    status: &ConfirmationStatus,
) -> io::Result<()> {
    writer.write_u8(if status.is_pending() { 0 } else { 1 })?;
    writer.write_u32::<LittleEndian>(status.get_height().into())
}

fn read_spend_status<R: Read>(mut reader: R) -> io::Result<SpendStatus> {
    Ok(match reader.read_u8()? {
        0 => SpendStatus::Unspent,
        _ => {
            let txid = read_txid(&mut reader)?;
            SpendStatus::Spent((txid, read_confirmation_status(reader)?))
        }
    })
}

fn write_spend_status<W: Write>(mut writer: W, status: &SpendStatus) -> io::Result<()> {
    match status {
        SpendStatus::Unspent => writer.write_u8(0),
        SpendStatus::Spent((txid, confirmation)) => {
            writer.write_u8(1)?;
            write_txid(&mut writer, txid)?;
            write_confirmation_status(writer, confirmation)
        }
    }
}

/// Identifies an output by its transaction, pool and index within that pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OutputId {
    pub txid: TxId,
    pub pool: PoolType,
    pub index: u32,
}

/// An output the wallet received, whether a shielded note or a transparent UTXO.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletOutput {
    pub output_id: OutputId,
    /// The wallet address that received it.
    pub address: String,
    pub value: u64,
    pub memo: Option<String>,
    pub is_change: bool,
    /// Shielded notes only.
    pub nullifier: Option<[u8; 32]>,
    /// Highest block the note's witness has been advanced to.
    pub witnessed_height: Option<u64>,
    pub spend: SpendStatus,
}

impl WalletOutput {
    pub const fn serialized_version() -> u8 {
        1
    }

    pub fn pool(&self) -> PoolType {
        self.output_id.pool
    }

    pub fn outpoint(&self) -> Option<OutPoint> {
        (self.output_id.pool == PoolType::TRANSPARENT).then_some(OutPoint {
            txid: self.output_id.txid,
            index: self.output_id.index,
        })
    }

    pub fn to_json(&self, created_in: &ConfirmationStatus) -> json::JsonValue {
        let mut o = json::object! {
            "created_in_txid" => self.output_id.txid.to_string(),
            "created_in_block" => u32::from(created_in.get_height()),
            "status" => created_in.label(),
            "pool" => pool_name(self.pool()),
            "output_index" => self.output_id.index,
            "value" => self.value,
            "address" => self.address.clone(),
            "is_change" => self.is_change,
            "memo" => self.memo.clone(),
            "spent" => self.spend.spending_txid().map(|txid| txid.to_string()),
            "pending_spent" => self.spend.is_pending_spent(),
        };
        if let SpendStatus::Spent((_, status)) = self.spend {
            o["spent_at_height"] = u32::from(status.get_height()).into();
        }
        o
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let _version = reader.read_u8()?;
        let txid = read_txid(&mut reader)?;
        let pool = read_pool(&mut reader)?;
        let index = reader.read_u32::<LittleEndian>()?;
        let address = read_string(&mut reader)?;
        let value = reader.read_u64::<LittleEndian>()?;
        let memo = Optional::read(&mut reader, |r| read_string(r))?;
        let is_change = reader.read_u8()? != 0;
        let nullifier = Optional::read(&mut reader, |r| {
            let mut nf = [0u8; 32];
            r.read_exact(&mut nf)?;
            Ok(nf)
        })?;
        let witnessed_height = Optional::read(&mut reader, |r| r.read_u64::<LittleEndian>())?;
        let spend = read_spend_status(&mut reader)?;

        Ok(WalletOutput {
            output_id: OutputId { txid, pool, index },
            address,
            value,
            memo,
            is_change,
            nullifier,
            witnessed_height,
            spend,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u8(Self::serialized_version())?;
        write_txid(&mut writer, &self.output_id.txid)?;
        write_pool(&mut writer, self.output_id.pool)?;
        writer.write_u32::<LittleEndian>(self.output_id.index)?;
        write_string(&mut writer, &self.address)?;
        writer.write_u64::<LittleEndian>(self.value)?;
        Optional::write(&mut writer, self.memo.as_deref(), |w, memo| {
            write_string(w, memo)
        })?;
        writer.write_u8(self.is_change as u8)?;
        Optional::write(&mut writer, self.nullifier, |w, nf| w.write_all(&nf))?;
        Optional::write(&mut writer, self.witnessed_height, |w, h| {
            w.write_u64::<LittleEndian>(h)
        })?;
        write_spend_status(writer, &self.spend)
    }
}

pub(crate) fn read_string<R: Read>(mut reader: R) -> io::Result<String> {
    let len = reader.read_u64::<LittleEndian>()?;
    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub(crate) fn write_string<W: Write>(mut writer: W, s: &str) -> io::Result<()> {
    writer.write_u64::<LittleEndian>(s.len() as u64)?;
    writer.write_all(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> WalletOutput {
        WalletOutput {
            output_id: OutputId {
                txid: TxId::from_bytes([8; 32]),
                pool: PoolType::ORCHARD,
                index: 1,
            },
            address: "uregtest1".to_string(),
            value: 200_000_000,
            memo: Some("thanks".to_string()),
            is_change: false,
            nullifier: Some([4; 32]),
            witnessed_height: Some(12),
            spend: SpendStatus::Spent((
                TxId::from_bytes([9; 32]),
                ConfirmationStatus::Pending(14.into()),
            )),
        }
    }

    #[test]
    fn reads_what_it_wrote() {
        let mut bytes = vec![];
        output().write(&mut bytes).unwrap();
        assert_eq!(WalletOutput::read(&bytes[..]).unwrap(), output());
    }

    #[test]
    fn only_transparent_outputs_have_outpoints() {
        let mut utxo = output();
        assert_eq!(utxo.outpoint(), None);
        utxo.output_id.pool = PoolType::TRANSPARENT;
        assert_eq!(utxo.outpoint().map(|o| o.index), Some(1));
    }

    #[test]
    fn json_reports_pending_spend() {
        let json = output().to_json(&ConfirmationStatus::Confirmed(10.into()));
        assert_eq!(json["pool"], "orchard");
        assert_eq!(json["status"], "confirmed");
        assert_eq!(json["pending_spent"], true);
        assert_eq!(json["spent_at_height"], 14);
    }
}
