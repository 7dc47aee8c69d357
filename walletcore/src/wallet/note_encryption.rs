//! Shielded output encryption.
//!
//! The note plaintext (value, randomness, memo) is sealed with CHACHA20_POLY1305 under a
//! key derived from the recipient's receiver, so only the holder of the receiver's
//! viewing key can find it by trial decryption. The commitment binds the receiver, value
//! and randomness, and a successful decryption is only accepted if it reproduces the
//! commitment. The sender can additionally seal the recipient, value and memo under its
//! outgoing viewing key to recover what it sent on a rescan.

use rand::{rngs::OsRng, RngCore};
use ring::aead;
use sha2::{Digest, Sha256};

use super::keys::prf;

pub const MEMO_SIZE: usize = walletcore_memo::MEMO_SIZE;

const NOTE_PLAINTEXT_SIZE: usize = 8 + 32 + MEMO_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoError {
    #[error("memo is {0} bytes, the maximum is {MEMO_SIZE}")]
    TooLong(usize),
}

/// Pads a memo to its fixed on-chain size. No memo is all zeroes.
pub fn encode_memo(memo: Option<&str>) -> Result<[u8; MEMO_SIZE], MemoError> {
    let mut bytes = [0u8; MEMO_SIZE];
    if let Some(memo) = memo {
        if memo.len() > MEMO_SIZE {
            return Err(MemoError::TooLong(memo.len()));
        }
        bytes[..memo.len()].copy_from_slice(memo.as_bytes());
    }
    Ok(bytes)
}

pub fn decode_memo(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().rposition(|b| *b != 0)? + 1;
    Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotePlaintext {
    pub value: u64,
    pub rseed: [u8; 32],
    pub memo: Option<String>,
}

pub fn note_commitment(receiver: &[u8], value: u64, rseed: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"walletcore-note-commitment");
    hasher.update(receiver);
    hasher.update(&value.to_le_bytes());
    hasher.update(rseed);
    let mut cmx = [0u8; 32];
    cmx.copy_from_slice(&hasher.finalize());
    cmx
}

fn sealing_key(key_material: &[u8], label: &[u8]) -> Option<aead::LessSafeKey> {
    let key = prf(key_material, &[label]);
    aead::UnboundKey::new(&aead::CHACHA20_POLY1305, &key[..32])
        .ok()
        .map(aead::LessSafeKey::new)
}

fn nonce(cmx: &[u8; 32], outgoing: bool) -> aead::Nonce {
    let mut nonce = [0u8; 12];
    let start = if outgoing { 12 } else { 0 };
    nonce.copy_from_slice(&cmx[start..start + 12]);
    aead::Nonce::assume_unique_for_key(nonce)
}

fn seal(key: &aead::LessSafeKey, cmx: &[u8; 32], outgoing: bool, mut plaintext: Vec<u8>) -> Vec<u8> {
    match key.seal_in_place_append_tag(nonce(cmx, outgoing), aead::Aad::empty(), &mut plaintext) {
        Ok(()) => plaintext,
        Err(_) => vec![],
    }
}

fn open(key: &aead::LessSafeKey, cmx: &[u8; 32], outgoing: bool, ciphertext: &[u8]) -> Option<Vec<u8>> {
    let mut buffer = ciphertext.to_vec();
    key.open_in_place(nonce(cmx, outgoing), aead::Aad::empty(), &mut buffer)
        .ok()
        .map(|plaintext| plaintext.to_vec())
}

/// A freshly encrypted shielded output.
pub struct EncryptedNote {
    pub cmx: [u8; 32],
    pub enc_ciphertext: Vec<u8>,
}

pub fn encrypt_note(
    receiver: &[u8],
    value: u64,
    memo: &[u8; MEMO_SIZE],
) -> EncryptedNote {
    let mut rseed = [0u8; 32];
    OsRng.fill_bytes(&mut rseed);
    let cmx = note_commitment(receiver, value, &rseed);

    let mut plaintext = Vec::with_capacity(NOTE_PLAINTEXT_SIZE);
    plaintext.extend_from_slice(&value.to_le_bytes());
    plaintext.extend_from_slice(&rseed);
    plaintext.extend_from_slice(memo);

    let enc_ciphertext = match sealing_key(receiver, b"walletcore-note") {
        Some(key) => seal(&key, &cmx, false, plaintext),
        None => vec![],
    };
    EncryptedNote {
        cmx,
        enc_ciphertext,
    }
}

/// Trial decryption of one output for one receiver.
pub fn try_decrypt_note(receiver: &[u8], cmx: &[u8; 32], ciphertext: &[u8]) -> Option<NotePlaintext> {
    let key = sealing_key(receiver, b"walletcore-note")?;
    let plaintext = open(&key, cmx, false, ciphertext)?;
    if plaintext.len() != NOTE_PLAINTEXT_SIZE {
        return None;
    }
    let mut value = [0u8; 8];
    value.copy_from_slice(&plaintext[..8]);
    let value = u64::from_le_bytes(value);
    let mut rseed = [0u8; 32];
    rseed.copy_from_slice(&plaintext[8..40]);
    if note_commitment(receiver, value, &rseed) != *cmx {
        return None;
    }
    Some(NotePlaintext {
        value,
        rseed,
        memo: decode_memo(&plaintext[40..]),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPlaintext {
    pub recipient: String,
    pub value: u64,
    pub memo: Option<String>,
}

pub fn encrypt_outgoing(
    ovk: &[u8; 32],
    cmx: &[u8; 32],
    recipient: &str,
    value: u64,
    memo: &[u8; MEMO_SIZE],
) -> Vec<u8> {
    let mut plaintext = Vec::with_capacity(8 + MEMO_SIZE + recipient.len());
    plaintext.extend_from_slice(&value.to_le_bytes());
    plaintext.extend_from_slice(memo);
    plaintext.extend_from_slice(recipient.as_bytes());
    match sealing_key(ovk, b"walletcore-outgoing") {
        Some(key) => seal(&key, cmx, true, plaintext),
        None => vec![],
    }
}

pub fn try_decrypt_outgoing(ovk: &[u8; 32], cmx: &[u8; 32], ciphertext: &[u8]) -> Option<OutgoingPlaintext> {
    if ciphertext.is_empty() {
        return None;
    }
    let key = sealing_key(ovk, b"walletcore-outgoing")?;
    let plaintext = open(&key, cmx, true, ciphertext)?;
    if plaintext.len() < 8 + MEMO_SIZE {
        return None;
    }
    let mut value = [0u8; 8];
    value.copy_from_slice(&plaintext[..8]);
    Some(OutgoingPlaintext {
        value: u64::from_le_bytes(value),
        memo: decode_memo(&plaintext[8..8 + MEMO_SIZE]),
        recipient: String::from_utf8(plaintext[8 + MEMO_SIZE..].to_vec()).ok()?,
    })
}
