//! Everything the wallet knows about one transaction that involves it.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use zcash_encoding::{Optional, Vector};
use zcash_protocol::{PoolType, TxId};

use walletcore_status::confirmation_status::ConfirmationStatus;

use crate::chain::transaction::{read_txid, write_txid, OutPoint};

use super::notes::{
    read_confirmation_status, read_pool, read_string, write_confirmation_status, write_pool,
    write_string, WalletOutput,
};

/// A payment this wallet sent to someone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingTxData {
    pub recipient_address: String,
    pub value: u64,
    pub memo: Option<String>,
    pub pool: PoolType,
    pub output_index: u32,
}

impl OutgoingTxData {
    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(OutgoingTxData {
            recipient_address: read_string(&mut reader)?,
            value: reader.read_u64::<LittleEndian>()?,
            memo: Optional::read(&mut reader, |r| read_string(r))?,
            pool: read_pool(&mut reader)?,
            output_index: reader.read_u32::<LittleEndian>()?,
        })
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write_string(&mut writer, &self.recipient_address)?;
        writer.write_u64::<LittleEndian>(self.value)?;
        Optional::write(&mut writer, self.memo.as_deref(), |w, memo| {
            write_string(w, memo)
        })?;
        write_pool(&mut writer, self.pool)?;
        writer.write_u32::<LittleEndian>(self.output_index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub txid: TxId,
    pub status: ConfirmationStatus,
    /// Block time for mined transactions, creation time for local ones.
    pub datetime: u64,
    pub outputs: Vec<WalletOutput>,
    /// Nullifiers of wallet notes this transaction spends.
    pub spent_nullifiers: Vec<[u8; 32]>,
    /// Wallet UTXOs this transaction spends.
    pub spent_outpoints: Vec<OutPoint>,
    pub outgoing_tx_data: Vec<OutgoingTxData>,
    /// Known only for transactions the wallet built or fully fetched.
    pub fee: Option<u64>,
    pub zec_price: Option<f64>,
    pub expiry_height: u64,
}

impl TransactionRecord {
    pub const fn serialized_version() -> u8 {
        1
    }

    pub fn new(txid: TxId, status: ConfirmationStatus, datetime: u64) -> Self {
        TransactionRecord {
            txid,
            status,
            datetime,
            outputs: vec![],
            spent_nullifiers: vec![],
            spent_outpoints: vec![],
            outgoing_tx_data: vec![],
            fee: None,
            zec_price: None,
            expiry_height: 0,
        }
    }

    /// Whether the wallet funded this transaction.
    pub fn is_outgoing(&self) -> bool {
        !self.spent_nullifiers.is_empty() || !self.spent_outpoints.is_empty()
    }

    pub fn total_value_received(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    pub fn total_value_received_in(&self, pool: PoolType) -> u64 {
        self.outputs
            .iter()
            .filter(|o| o.pool() == pool)
            .map(|o| o.value)
            .sum()
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let _version = reader.read_u8()?;
        let txid = read_txid(&mut reader)?;
        let status = read_confirmation_status(&mut reader)?;
        let datetime = reader.read_u64::<LittleEndian>()?;
        let outputs = Vector::read(&mut reader, |r| WalletOutput::read(r))?;
        let spent_nullifiers = Vector::read(&mut reader, |r| {
            let mut nf = [0u8; 32];
            r.read_exact(&mut nf)?;
            Ok(nf)
        })?;
        let spent_outpoints = Vector::read(&mut reader, |r| OutPoint::read(r))?;
        let outgoing_tx_data = Vector::read(&mut reader, |r| OutgoingTxData::read(r))?;
        let fee = Optional::read(&mut reader, |r| r.read_u64::<LittleEndian>())?;
        let zec_price = Optional::read(&mut reader, |r| r.read_f64::<LittleEndian>())?;
        let expiry_height = reader.read_u64::<LittleEndian>()?;

        Ok(TransactionRecord {
            txid,
            status,
            datetime,
            outputs,
            spent_nullifiers,
            spent_outpoints,
            outgoing_tx_data,
            fee,
            zec_price,
            expiry_height,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u8(Self::serialized_version())?;
        write_txid(&mut writer, &self.txid)?;
        write_confirmation_status(&mut writer, &self.status)?;
        writer.write_u64::<LittleEndian>(self.datetime)?;
        Vector::write(&mut writer, &self.outputs, |w, o| o.write(w))?;
        Vector::write(&mut writer, &self.spent_nullifiers, |w, nf| w.write_all(nf))?;
        Vector::write(&mut writer, &self.spent_outpoints, |w, o| o.write(w))?;
        Vector::write(&mut writer, &self.outgoing_tx_data, |w, o| o.write(w))?;
        Optional::write(&mut writer, self.fee, |w, fee| {
            w.write_u64::<LittleEndian>(fee)
        })?;
        Optional::write(&mut writer, self.zec_price, |w, price| {
            w.write_f64::<LittleEndian>(price)
        })?;
        writer.write_u64::<LittleEndian>(self.expiry_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::notes::OutputId;
    use walletcore_status::spend_status::SpendStatus;

    #[test]
    fn reads_what_it_wrote() {
        let txid = TxId::from_bytes([1; 32]);
        let mut record = TransactionRecord::new(txid, ConfirmationStatus::Confirmed(7.into()), 1_700_000_000);
        record.outputs.push(WalletOutput {
            output_id: OutputId {
                txid,
                pool: PoolType::TRANSPARENT,
                index: 0,
            },
            address: "tm".to_string(),
            value: 5,
            memo: None,
            is_change: false,
            nullifier: None,
            witnessed_height: None,
            spend: SpendStatus::Unspent,
        });
        record.spent_nullifiers.push([2; 32]);
        record.outgoing_tx_data.push(OutgoingTxData {
            recipient_address: "u1x".to_string(),
            value: 10,
            memo: Some("(1/2)hi".to_string()),
            pool: PoolType::ORCHARD,
            output_index: 0,
        });
        record.fee = Some(10_000);
        record.zec_price = Some(31.5);
        record.expiry_height = 47;

        let mut bytes = vec![];
        record.write(&mut bytes).unwrap();
        assert_eq!(TransactionRecord::read(&bytes[..]).unwrap(), record);
        assert!(record.is_outgoing());
        assert_eq!(record.total_value_received_in(PoolType::ORCHARD), 0);
    }
}
