//! Errors for [`crate::wallet`] and sub-modules

use zcash_address::Network;

use super::address::network_name;

/// Errors from key management and wallet encryption.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Wallet is already encrypted")]
    AlreadyEncrypted,
    #[error("Wallet is not encrypted")]
    NotEncrypted,
    #[error("Wallet is already locked")]
    AlreadyLocked,
    #[error("Wallet is already unlocked")]
    AlreadyUnlocked,
    #[error("Decryption failed. Is your password correct?")]
    WrongPassword,
    #[error("Wallet is locked")]
    Locked,
    #[error("Wallet has no spend capability")]
    NoSpendCapability,
    #[error("Error parsing phrase: {0}")]
    InvalidMnemonic(String),
    #[error("Invalid unified full viewing key: {0}")]
    InvalidUfvk(String),
    #[error("Key is for the {actual} network, this wallet is on {expected}")]
    NetworkMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("Encryption failed")]
    Encryption,
}

impl KeyError {
    pub(crate) fn network_mismatch(expected: Network, actual: Network) -> Self {
        KeyError::NetworkMismatch {
            expected: network_name(expected),
            actual: network_name(actual),
        }
    }
}

/// Errors from parsing or deriving addresses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Invalid address {0}")]
    Invalid(String),
    #[error("Address {address} is for the {actual} network, this wallet is on {expected}")]
    WrongNetwork {
        address: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("Unsupported address {0}")]
    Unsupported(String),
    #[error("Invalid receiver selection {0:?}, expected a combination of 'o', 'z' and 't'")]
    InvalidReceiverSelection(String),
    #[error("Could not encode address: {0}")]
    Encoding(String),
}
