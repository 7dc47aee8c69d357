//! Account keys, their derivation from a BIP-39 seed, and encryption of the seed at rest.
//!
//! Keys form a chain: the seed gives a [`SpendingKey`], the spending key gives a 96 byte
//! [`ViewingKey`], and the viewing key gives incoming and outgoing viewing keys, the
//! nullifier key and every receiver of every address. Each step is an HMAC-SHA512 keyed
//! by the previous key with a domain separating label.

use std::{
    io::{self, Read, Write},
    num::NonZeroU32,
};

use bip0039::Mnemonic;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::{rngs::OsRng, RngCore};
use ring::{aead, hmac, pbkdf2};
use zcash_address::unified::{self, Container, Encoding, Fvk};
use zcash_encoding::{Optional, Vector};

use crate::{chain::transaction::OutPoint, config::ChainType};

use super::{
    address::{AddressRegistry, ReceiverSelection, WalletAddress},
    error::{AddressError, KeyError},
};

const SEED_DOMAIN: &[u8] = b"walletcore-account-seed";

const PBKDF2_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(iterations) => iterations,
    None => panic!("iteration count is non-zero"),
};

/// HMAC-SHA512 of `parts` under `key`.
pub(crate) fn prf(key: &[u8], parts: &[&[u8]]) -> [u8; 64] {
    let key = hmac::Key::new(hmac::HMAC_SHA512, key);
    let mut context = hmac::Context::with_key(&key);
    for part in parts {
        context.update(part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(context.sign().as_ref());
    out
}

fn prf_32(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&prf(key, parts)[..32]);
    out
}

pub struct SpendingKey([u8; 32]);

impl SpendingKey {
    pub fn from_seed(bip39_seed: &[u8], account: u32) -> Self {
        SpendingKey(prf_32(SEED_DOMAIN, &[bip39_seed, &account.to_le_bytes()]))
    }

    pub fn viewing_key(&self) -> ViewingKey {
        let mut bytes = [0u8; 96];
        bytes[..32].copy_from_slice(&prf_32(&self.0, &[b"ak"]));
        bytes[32..64].copy_from_slice(&prf_32(&self.0, &[b"nk"]));
        bytes[64..].copy_from_slice(&prf_32(&self.0, &[b"rivk"]));
        ViewingKey(bytes)
    }

    /// Authorizes spending a shielded note.
    pub fn authorize_spend(&self, nullifier: &[u8; 32]) -> [u8; 32] {
        prf_32(&self.0, &[b"spend", nullifier])
    }

    /// Authorizes spending a transparent output.
    pub fn authorize_input(&self, prevout: &OutPoint) -> [u8; 32] {
        prf_32(&self.0, &[b"input", &prevout.to_bytes()])
    }

    /// The private key exported for the address at `index`.
    pub fn address_private_key(&self, index: u32) -> [u8; 32] {
        prf_32(&self.0, &[b"address", &index.to_le_bytes()])
    }
}

/// Full viewing key: `ak || nk || rivk`.
#[derive(Clone, PartialEq, Eq)]
pub struct ViewingKey([u8; 96]);

impl std::fmt::Debug for ViewingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ViewingKey(..)")
    }
}

impl ViewingKey {
    pub fn from_bytes(bytes: [u8; 96]) -> Self {
        ViewingKey(bytes)
    }

    pub fn to_bytes(&self) -> [u8; 96] {
        self.0
    }

    fn nk(&self) -> &[u8] {
        &self.0[32..64]
    }

    pub fn ivk(&self) -> [u8; 32] {
        prf_32(&self.0, &[b"ivk"])
    }

    pub fn ovk(&self) -> [u8; 32] {
        prf_32(&self.0, &[b"ovk"])
    }

    pub fn orchard_receiver(&self, index: u32) -> [u8; 43] {
        let mut receiver = [0u8; 43];
        receiver.copy_from_slice(&prf(&self.ivk(), &[b"orchard", &index.to_le_bytes()])[..43]);
        receiver
    }

    pub fn sapling_receiver(&self, index: u32) -> [u8; 43] {
        let mut receiver = [0u8; 43];
        receiver.copy_from_slice(&prf(&self.ivk(), &[b"sapling", &index.to_le_bytes()])[..43]);
        receiver
    }

    pub fn transparent_receiver(&self, index: u32) -> [u8; 20] {
        let mut receiver = [0u8; 20];
        receiver
            .copy_from_slice(&prf(&self.ivk(), &[b"transparent", &index.to_le_bytes()])[..20]);
        receiver
    }

    /// Nullifier revealed when the note with commitment `cmx` is spent.
    pub fn nullifier(&self, cmx: &[u8; 32]) -> [u8; 32] {
        prf_32(self.nk(), &[b"nf", cmx])
    }

    pub fn encode_ufvk(&self, chain: ChainType) -> Result<String, KeyError> {
        let ufvk = unified::Ufvk::try_from_items(vec![Fvk::Orchard(self.0)])
            .map_err(|e| KeyError::InvalidUfvk(e.to_string()))?;
        Ok(ufvk.encode(&chain.to_zcash_address_network()))
    }

    pub fn decode_ufvk(encoded: &str, chain: ChainType) -> Result<Self, KeyError> {
        let (network, ufvk) =
            unified::Ufvk::decode(encoded).map_err(|e| KeyError::InvalidUfvk(e.to_string()))?;
        if network != chain.to_zcash_address_network() {
            return Err(KeyError::network_mismatch(
                chain.to_zcash_address_network(),
                network,
            ));
        }
        ufvk.items()
            .into_iter()
            .find_map(|item| match item {
                Fvk::Orchard(bytes) => Some(ViewingKey(bytes)),
                _ => None,
            })
            .ok_or_else(|| KeyError::InvalidUfvk("no orchard viewing key".to_string()))
    }
}

/// The seed sealed under a password.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedSeed {
    salt: [u8; 16],
    nonce: [u8; 12],
    ciphertext: Vec<u8>,
}

impl EncryptedSeed {
    fn password_key(password: &str, salt: &[u8; 16]) -> Result<aead::LessSafeKey, KeyError> {
        let mut key = [0u8; 32];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            PBKDF2_ITERATIONS,
            salt,
            password.as_bytes(),
            &mut key,
        );
        let unbound = aead::UnboundKey::new(&aead::CHACHA20_POLY1305, &key)
            .map_err(|_| KeyError::Encryption)?;
        Ok(aead::LessSafeKey::new(unbound))
    }

    fn seal(entropy: &[u8], password: &str) -> Result<Self, KeyError> {
        let mut salt = [0u8; 16];
        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);

        let key = Self::password_key(password, &salt)?;
        let mut ciphertext = entropy.to_vec();
        key.seal_in_place_append_tag(
            aead::Nonce::assume_unique_for_key(nonce),
            aead::Aad::empty(),
            &mut ciphertext,
        )
        .map_err(|_| KeyError::Encryption)?;

        Ok(EncryptedSeed {
            salt,
            nonce,
            ciphertext,
        })
    }

    fn open(&self, password: &str) -> Result<Mnemonic, KeyError> {
        let key = Self::password_key(password, &self.salt)?;
        let mut buffer = self.ciphertext.clone();
        let entropy = key
            .open_in_place(
                aead::Nonce::assume_unique_for_key(self.nonce),
                aead::Aad::empty(),
                &mut buffer,
            )
            .map_err(|_| KeyError::WrongPassword)?;
        Mnemonic::from_entropy(entropy.to_vec()).map_err(|_| KeyError::WrongPassword)
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut salt = [0u8; 16];
        reader.read_exact(&mut salt)?;
        let mut nonce = [0u8; 12];
        reader.read_exact(&mut nonce)?;
        let ciphertext = Vector::read(reader, |r| r.read_u8())?;
        Ok(EncryptedSeed {
            salt,
            nonce,
            ciphertext,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.salt)?;
        writer.write_all(&self.nonce)?;
        Vector::write(writer, &self.ciphertext, |w, b| w.write_u8(*b))
    }
}

/// What the wallet can do with its keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletKind {
    /// Seed known; spending possible while unlocked.
    Seeded,
    /// Viewing key only.
    ViewOnly,
}

/// The account's keys and addresses.
///
/// Spending material is held as the mnemonic, and is absent for view-only wallets and
/// while an encrypted wallet is locked.
pub struct WalletCapability {
    chain: ChainType,
    account: u32,
    mnemonic: Option<Mnemonic>,
    encrypted_seed: Option<EncryptedSeed>,
    viewing_key: ViewingKey,
    pub(crate) addresses: AddressRegistry,
}

impl WalletCapability {
    pub const fn serialized_version() -> u8 {
        1
    }

    pub fn new_from_phrase(chain: ChainType, mnemonic: &Mnemonic, account: u32) -> Self {
        let viewing_key = SpendingKey::from_seed(&mnemonic.to_seed(""), account).viewing_key();
        WalletCapability {
            chain,
            account,
            mnemonic: Some(mnemonic.clone()),
            encrypted_seed: None,
            viewing_key,
            addresses: AddressRegistry::default(),
        }
    }

    pub fn new_from_ufvk(chain: ChainType, ufvk: &str) -> Result<Self, KeyError> {
        Ok(WalletCapability {
            chain,
            account: 0,
            mnemonic: None,
            encrypted_seed: None,
            viewing_key: ViewingKey::decode_ufvk(ufvk, chain)?,
            addresses: AddressRegistry::default(),
        })
    }

    pub fn kind(&self) -> WalletKind {
        if self.mnemonic.is_some() || self.encrypted_seed.is_some() {
            WalletKind::Seeded
        } else {
            WalletKind::ViewOnly
        }
    }

    pub fn viewing_key(&self) -> &ViewingKey {
        &self.viewing_key
    }

    pub fn account(&self) -> u32 {
        self.account
    }

    pub fn chain(&self) -> ChainType {
        self.chain
    }

    /// The mnemonic, if the wallet has one and it is not locked.
    pub fn mnemonic(&self) -> Option<&Mnemonic> {
        self.mnemonic.as_ref()
    }

    /// Whether notes can be spent right now.
    pub fn can_spend(&self) -> bool {
        self.mnemonic.is_some()
    }

    pub fn spending_key(&self) -> Result<SpendingKey, KeyError> {
        match (&self.mnemonic, &self.encrypted_seed) {
            (Some(mnemonic), _) => Ok(SpendingKey::from_seed(&mnemonic.to_seed(""), self.account)),
            (None, Some(_)) => Err(KeyError::Locked),
            (None, None) => Err(KeyError::NoSpendCapability),
        }
    }

    pub fn new_address(&mut self, selection: ReceiverSelection) -> Result<&WalletAddress, AddressError> {
        self.addresses
            .new_address(&self.viewing_key, selection, self.chain)
    }

    pub fn ufvk(&self) -> Result<String, KeyError> {
        self.viewing_key.encode_ufvk(self.chain)
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted_seed.is_some()
    }

    pub fn is_unlocked_for_spending(&self) -> bool {
        self.mnemonic.is_some()
    }

    /// Seals the seed under `password` and locks the wallet.
    pub fn encrypt(&mut self, password: &str) -> Result<(), KeyError> {
        if self.encrypted_seed.is_some() {
            return Err(KeyError::AlreadyEncrypted);
        }
        let mnemonic = self.mnemonic.as_ref().ok_or(KeyError::NoSpendCapability)?;
        self.encrypted_seed = Some(EncryptedSeed::seal(mnemonic.entropy(), password)?);
        self.mnemonic = None;
        Ok(())
    }

    pub fn lock(&mut self) -> Result<(), KeyError> {
        if self.encrypted_seed.is_none() {
            return Err(KeyError::NotEncrypted);
        }
        if self.mnemonic.is_none() {
            return Err(KeyError::AlreadyLocked);
        }
        self.mnemonic = None;
        Ok(())
    }

    pub fn unlock(&mut self, password: &str) -> Result<(), KeyError> {
        let sealed = self.encrypted_seed.as_ref().ok_or(KeyError::NotEncrypted)?;
        if self.mnemonic.is_some() {
            return Err(KeyError::AlreadyUnlocked);
        }
        self.mnemonic = Some(self.checked_open(sealed, password)?);
        Ok(())
    }

    /// Removes encryption, leaving the wallet unlocked.
    pub fn remove_encryption(&mut self, password: &str) -> Result<(), KeyError> {
        let sealed = self.encrypted_seed.as_ref().ok_or(KeyError::NotEncrypted)?;
        let mnemonic = self.checked_open(sealed, password)?;
        self.mnemonic = Some(mnemonic);
        self.encrypted_seed = None;
        Ok(())
    }

    // A seed that opens but derives someone else's viewing key means a corrupted file.
    fn checked_open(&self, sealed: &EncryptedSeed, password: &str) -> Result<Mnemonic, KeyError> {
        let mnemonic = sealed.open(password)?;
        let viewing_key = SpendingKey::from_seed(&mnemonic.to_seed(""), self.account).viewing_key();
        if viewing_key != self.viewing_key {
            return Err(KeyError::WrongPassword);
        }
        Ok(mnemonic)
    }

    pub fn read<R: Read>(mut reader: R, chain: ChainType) -> io::Result<Self> {
        let version = reader.read_u8()?;
        if version > Self::serialized_version() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Don't know how to read key version {version}"),
            ));
        }
        let account = reader.read_u32::<LittleEndian>()?;
        let mut vk = [0u8; 96];
        reader.read_exact(&mut vk)?;
        let viewing_key = ViewingKey(vk);

        let mnemonic = Optional::read(&mut reader, |r| {
            let entropy = Vector::read(r, |r| r.read_u8())?;
            Mnemonic::from_entropy(entropy).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("Error parsing phrase: {e}"))
            })
        })?;
        let encrypted_seed = Optional::read(&mut reader, EncryptedSeed::read)?;
        let addresses = AddressRegistry::read(&mut reader, &viewing_key, chain)?;

        Ok(WalletCapability {
            chain,
            account,
            mnemonic,
            encrypted_seed,
            viewing_key,
            addresses,
        })
    }

    /// Writes the keys. An encrypted wallet never writes its plaintext seed, so it
    /// reads back locked.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u8(Self::serialized_version())?;
        writer.write_u32::<LittleEndian>(self.account)?;
        writer.write_all(&self.viewing_key.0)?;

        let plaintext = if self.encrypted_seed.is_some() {
            None
        } else {
            self.mnemonic.as_ref()
        };
        Optional::write(&mut writer, plaintext, |w, mnemonic| {
            Vector::write(w, mnemonic.entropy(), |w, b| w.write_u8(*b))
        })?;
        Optional::write(&mut writer, self.encrypted_seed.as_ref(), |w, sealed| {
            sealed.write(w)
        })?;
        self.addresses.write(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mnemonic() -> Mnemonic {
        Mnemonic::from_entropy(vec![7u8; 32]).unwrap()
    }

    fn capability() -> WalletCapability {
        WalletCapability::new_from_phrase(ChainType::Regtest, &test_mnemonic(), 0)
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = capability();
        let b = capability();
        assert_eq!(a.viewing_key(), b.viewing_key());
        assert_eq!(
            a.viewing_key().orchard_receiver(0),
            b.viewing_key().orchard_receiver(0)
        );
        assert_ne!(
            a.viewing_key().orchard_receiver(0),
            a.viewing_key().orchard_receiver(1)
        );
        let other = WalletCapability::new_from_phrase(ChainType::Regtest, &test_mnemonic(), 1);
        assert_ne!(a.viewing_key(), other.viewing_key());
    }

    #[test]
    fn ufvk_round_trips_and_checks_network() {
        let keys = capability();
        let ufvk = keys.ufvk().unwrap();
        assert!(ufvk.starts_with("uviewregtest"));

        let view_only = WalletCapability::new_from_ufvk(ChainType::Regtest, &ufvk).unwrap();
        assert_eq!(view_only.viewing_key(), keys.viewing_key());
        assert_eq!(view_only.kind(), WalletKind::ViewOnly);
        assert_eq!(
            view_only.spending_key().err(),
            Some(KeyError::NoSpendCapability)
        );

        assert!(matches!(
            WalletCapability::new_from_ufvk(ChainType::Mainnet, &ufvk),
            Err(KeyError::NetworkMismatch { .. })
        ));
    }

    #[test]
    fn encryption_lifecycle() {
        let mut keys = capability();
        assert_eq!(keys.lock(), Err(KeyError::NotEncrypted));
        assert_eq!(keys.unlock("pw"), Err(KeyError::NotEncrypted));

        keys.encrypt("pw").unwrap();
        assert!(keys.is_encrypted());
        assert!(!keys.can_spend());
        assert_eq!(keys.encrypt("pw"), Err(KeyError::AlreadyEncrypted));
        assert_eq!(keys.lock(), Err(KeyError::AlreadyLocked));
        assert_eq!(keys.spending_key().err(), Some(KeyError::Locked));

        assert_eq!(keys.unlock("wrong"), Err(KeyError::WrongPassword));
        keys.unlock("pw").unwrap();
        assert!(keys.can_spend());
        assert_eq!(keys.unlock("pw"), Err(KeyError::AlreadyUnlocked));

        keys.lock().unwrap();
        assert_eq!(keys.remove_encryption("wrong"), Err(KeyError::WrongPassword));
        keys.remove_encryption("pw").unwrap();
        assert!(!keys.is_encrypted());
        assert_eq!(
            keys.mnemonic().map(|m| m.phrase()),
            Some(test_mnemonic().phrase())
        );
    }

    #[test]
    fn encrypted_keys_read_back_locked() {
        let mut keys = capability();
        keys.new_address("o".parse().unwrap()).unwrap();
        keys.encrypt("pw").unwrap();
        keys.unlock("pw").unwrap();

        let mut bytes = vec![];
        keys.write(&mut bytes).unwrap();
        let mut read = WalletCapability::read(&bytes[..], ChainType::Regtest).unwrap();
        assert!(read.is_encrypted());
        assert!(!read.can_spend());
        assert_eq!(read.addresses.len(), 1);
        read.unlock("pw").unwrap();
        assert_eq!(
            read.mnemonic().map(|m| m.phrase()),
            Some(test_mnemonic().phrase())
        );
    }

    #[test]
    fn spend_authorization_depends_on_nullifier() {
        let sk = capability().spending_key().unwrap();
        assert_ne!(sk.authorize_spend(&[1; 32]), sk.authorize_spend(&[2; 32]));
        assert_ne!(sk.address_private_key(0), sk.address_private_key(1));
    }
}
