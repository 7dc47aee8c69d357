//! The error every layer's failure converts into at the command boundary.

use std::io;

use thiserror::Error;

use crate::{
    chain::ChainError,
    commands::CommandError,
    lightclient::send::ConfirmError,
    scan::{ScanError, SyncError},
    wallet::{
        error::KeyError,
        propose::{ProposeError, ShieldError},
        send::BuildError,
    },
};

/// What a caller can do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The server could not be reached or misbehaved; the same command may succeed later.
    Transient,
    /// The arguments were wrong; retry with different ones.
    Validation,
    /// The wallet is not in a state where the command applies.
    StateConflict,
    /// The wallet itself is unusable as it stands; prompt for recovery.
    Fatal,
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Light Client is not initialized")]
    NotInitialized,
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Keys(#[from] KeyError),
    #[error(transparent)]
    Propose(#[from] ProposeError),
    #[error(transparent)]
    Shield(#[from] ShieldError),
    #[error(transparent)]
    Confirm(#[from] ConfirmError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn chain_class(e: &ChainError) -> ErrorClass {
    if e.is_transient() {
        ErrorClass::Transient
    } else {
        ErrorClass::StateConflict
    }
}

fn key_class(e: &KeyError) -> ErrorClass {
    match e {
        KeyError::InvalidMnemonic(_) | KeyError::InvalidUfvk(_) | KeyError::NetworkMismatch { .. } => {
            ErrorClass::Validation
        }
        KeyError::WrongPassword | KeyError::Encryption => ErrorClass::Fatal,
        KeyError::AlreadyEncrypted
        | KeyError::NotEncrypted
        | KeyError::AlreadyLocked
        | KeyError::AlreadyUnlocked
        | KeyError::Locked
        | KeyError::NoSpendCapability => ErrorClass::StateConflict,
    }
}

impl WalletError {
    pub fn class(&self) -> ErrorClass {
        match self {
            WalletError::NotInitialized => ErrorClass::StateConflict,
            WalletError::Chain(e) => chain_class(e),
            WalletError::Sync(e) if e.is_transient() => ErrorClass::Transient,
            WalletError::Sync(SyncError::Scan(ScanError::PrevHashMismatch { .. })) => {
                ErrorClass::Transient
            }
            WalletError::Sync(_) => ErrorClass::Fatal,
            WalletError::Keys(e)
            | WalletError::Propose(ProposeError::Keys(e))
            | WalletError::Shield(ShieldError::Keys(e))
            | WalletError::Confirm(ConfirmError::Build(BuildError::Keys(e))) => key_class(e),
            WalletError::Propose(ProposeError::NoChangeAddress)
            | WalletError::Shield(ShieldError::NoOrchardReceiver) => ErrorClass::StateConflict,
            WalletError::Propose(_) | WalletError::Shield(_) => ErrorClass::Validation,
            WalletError::Confirm(ConfirmError::NoProposal)
            | WalletError::Confirm(ConfirmError::UnknownProposal(_)) => ErrorClass::StateConflict,
            WalletError::Confirm(ConfirmError::Build(_)) => ErrorClass::Validation,
            WalletError::Confirm(ConfirmError::Broadcast(e)) => chain_class(e),
            WalletError::Command(_) => ErrorClass::Validation,
            WalletError::Io(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                ErrorClass::StateConflict
            }
            WalletError::Io(_) => ErrorClass::Fatal,
        }
    }

    /// The `{"error": ...}` object commands answer with.
    pub fn to_json(&self) -> json::JsonValue {
        json::object! { "error" => self.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::wallet::propose::ProposalId;

    #[test_case(ChainError::Unavailable("down".to_string()).into(), ErrorClass::Transient ; "server down")]
    #[test_case(ChainError::Rejected("duplicate nullifier".to_string()).into(), ErrorClass::StateConflict ; "rejected")]
    #[test_case(SyncError::ReorgTooDeep(100).into(), ErrorClass::Fatal ; "deep reorg")]
    #[test_case(SyncError::Scan(ScanError::IncompleteRange { start: 1, end: 100, returned: 50 }).into(), ErrorClass::Transient ; "short block range")]
    #[test_case(ProposeError::AmountOutOfRange(0).into(), ErrorClass::Validation ; "bad amount")]
    #[test_case(ProposeError::FundsReserved(ProposalId(1)).into(), ErrorClass::Validation ; "duplicate proposal")]
    #[test_case(ProposeError::Keys(KeyError::Locked).into(), ErrorClass::StateConflict ; "locked wallet")]
    #[test_case(ConfirmError::NoProposal.into(), ErrorClass::StateConflict ; "confirm without propose")]
    #[test_case(KeyError::WrongPassword.into(), ErrorClass::Fatal ; "wrong password")]
    #[test_case(io::Error::new(io::ErrorKind::InvalidData, "bad version").into(), ErrorClass::Fatal ; "corrupt wallet file")]
    #[test_case(CommandError::InvalidArguments.into(), ErrorClass::Validation ; "bad arguments")]
    fn errors_are_classified(error: WalletError, class: ErrorClass) {
        assert_eq!(error.class(), class);
    }

    #[test]
    fn json_carries_the_message() {
        let error = WalletError::from(ConfirmError::NoProposal);
        assert_eq!(
            error.to_json()["error"],
            "No proposal. Call send or shield first."
        );
    }
}
