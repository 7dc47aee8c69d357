//! The full transaction format carried by the chain.
//!
//! Values are little-endian. Shielded outputs carry an `enc_ciphertext` readable by the
//! recipient and an `out_ciphertext` readable by the sender's outgoing viewing key.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};
use zcash_encoding::Vector;
use zcash_protocol::{ShieldedProtocol, TxId};

/// Serialization version written at the head of every transaction.
pub const TX_VERSION: u32 = 1;

pub(crate) fn read_txid<R: Read>(mut reader: R) -> io::Result<TxId> {
    let mut bytes = [0u8; 32];
    reader.read_exact(&mut bytes)?;
    Ok(TxId::from_bytes(bytes))
}

pub(crate) fn write_txid<W: Write>(mut writer: W, txid: &TxId) -> io::Result<()> {
    let bytes: &[u8; 32] = txid.as_ref();
    writer.write_all(bytes)
}

pub(crate) fn read_protocol<R: Read>(mut reader: R) -> io::Result<ShieldedProtocol> {
    match reader.read_u8()? {
        0 => Ok(ShieldedProtocol::Sapling),
        1 => Ok(ShieldedProtocol::Orchard),
        tag => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown shielded protocol {tag}"),
        )),
    }
}

pub(crate) fn write_protocol<W: Write>(mut writer: W, protocol: ShieldedProtocol) -> io::Result<()> {
    writer.write_u8(match protocol {
        ShieldedProtocol::Sapling => 0,
        ShieldedProtocol::Orchard => 1,
    })
}

fn read_array<R: Read, const N: usize>(mut reader: R) -> io::Result<[u8; N]> {
    let mut bytes = [0u8; N];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Double SHA-256 of a serialized transaction.
pub fn txid_of(data: &[u8]) -> TxId {
    let first = Sha256::digest(data);
    let second = Sha256::digest(&first);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&second);
    TxId::from_bytes(hash)
}

/// A reference to a transparent output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: TxId,
    pub index: u32,
}

impl OutPoint {
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let txid = read_txid(&mut reader)?;
        let index = reader.read_u32::<LittleEndian>()?;
        Ok(OutPoint { txid, index })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write_txid(&mut writer, &self.txid)?;
        writer.write_u32::<LittleEndian>(self.index)
    }

    pub fn to_bytes(&self) -> [u8; 36] {
        let mut bytes = [0u8; 36];
        let txid: &[u8; 32] = self.txid.as_ref();
        bytes[..32].copy_from_slice(txid);
        bytes[32..].copy_from_slice(&self.index.to_le_bytes());
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransparentScript {
    P2pkh([u8; 20]),
    P2sh([u8; 20]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub spend_auth: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: u64,
    pub script: TransparentScript,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShieldedSpend {
    pub protocol: ShieldedProtocol,
    pub nullifier: [u8; 32],
    pub spend_auth: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShieldedOutput {
    pub protocol: ShieldedProtocol,
    pub cmx: [u8; 32],
    pub enc_ciphertext: Vec<u8>,
    /// Empty when the sender chose not to make the output recoverable, as for change.
    pub out_ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    pub expiry_height: u32,
    pub fee: u64,
    pub transparent_inputs: Vec<TxIn>,
    pub transparent_outputs: Vec<TxOut>,
    pub shielded_spends: Vec<ShieldedSpend>,
    pub shielded_outputs: Vec<ShieldedOutput>,
}

impl Transaction {
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let version = reader.read_u32::<LittleEndian>()?;
        if version != TX_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported transaction version {version}"),
            ));
        }
        let expiry_height = reader.read_u32::<LittleEndian>()?;
        let fee = reader.read_u64::<LittleEndian>()?;

        let transparent_inputs = Vector::read(&mut reader, |r| {
            Ok(TxIn {
                prevout: OutPoint::read(&mut *r)?,
                spend_auth: read_array(r)?,
            })
        })?;
        let transparent_outputs = Vector::read(&mut reader, |r| {
            let value = r.read_u64::<LittleEndian>()?;
            let script = match r.read_u8()? {
                0 => TransparentScript::P2pkh(read_array(&mut *r)?),
                1 => TransparentScript::P2sh(read_array(&mut *r)?),
                tag => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("unknown script kind {tag}"),
                    ))
                }
            };
            Ok(TxOut { value, script })
        })?;
        let shielded_spends = Vector::read(&mut reader, |r| {
            Ok(ShieldedSpend {
                protocol: read_protocol(&mut *r)?,
                nullifier: read_array(&mut *r)?,
                spend_auth: read_array(r)?,
            })
        })?;
        let shielded_outputs = Vector::read(&mut reader, |r| {
            Ok(ShieldedOutput {
                protocol: read_protocol(&mut *r)?,
                cmx: read_array(&mut *r)?,
                enc_ciphertext: Vector::read(&mut *r, |r| r.read_u8())?,
                out_ciphertext: Vector::read(r, |r| r.read_u8())?,
            })
        })?;

        Ok(Transaction {
            expiry_height,
            fee,
            transparent_inputs,
            transparent_outputs,
            shielded_spends,
            shielded_outputs,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(TX_VERSION)?;
        writer.write_u32::<LittleEndian>(self.expiry_height)?;
        writer.write_u64::<LittleEndian>(self.fee)?;

        Vector::write(&mut writer, &self.transparent_inputs, |w, input| {
            input.prevout.write(&mut *w)?;
            w.write_all(&input.spend_auth)
        })?;
        Vector::write(&mut writer, &self.transparent_outputs, |w, output| {
            w.write_u64::<LittleEndian>(output.value)?;
            match output.script {
                TransparentScript::P2pkh(hash) => {
                    w.write_u8(0)?;
                    w.write_all(&hash)
                }
                TransparentScript::P2sh(hash) => {
                    w.write_u8(1)?;
                    w.write_all(&hash)
                }
            }
        })?;
        Vector::write(&mut writer, &self.shielded_spends, |w, spend| {
            write_protocol(&mut *w, spend.protocol)?;
            w.write_all(&spend.nullifier)?;
            w.write_all(&spend.spend_auth)
        })?;
        Vector::write(&mut writer, &self.shielded_outputs, |w, output| {
            write_protocol(&mut *w, output.protocol)?;
            w.write_all(&output.cmx)?;
            Vector::write(&mut *w, &output.enc_ciphertext, |w, b| w.write_u8(*b))?;
            Vector::write(&mut *w, &output.out_ciphertext, |w, b| w.write_u8(*b))
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.write(&mut bytes)
            .expect("writing to a Vec cannot fail");
        bytes
    }

    pub fn txid(&self) -> TxId {
        txid_of(&self.to_bytes())
    }

    pub fn spends_protocol(&self, protocol: ShieldedProtocol) -> bool {
        self.shielded_spends.iter().any(|s| s.protocol == protocol)
    }
}
