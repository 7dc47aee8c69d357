//! An output may have up to one spend.

use zcash_protocol::TxId;

use super::confirmation_status::ConfirmationStatus;

/// an output may be spent. we enumerate the relationship
/// of the spending transaction to the blockchain
/// i.e. ConfirmationStatus, including height.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SpendStatus {
    /// the output has never been known to be spent.
    Unspent,
    /// the output has been spent by this transaction. it may be confirmed or pending.
    Spent((TxId, ConfirmationStatus)),
}

impl SpendStatus {
    /// Not spent by any known transaction.
    pub fn is_unspent(&self) -> bool {
        matches!(self, Self::Unspent)
    }

    /// Spent by a transaction that is not yet mined.
    pub fn is_pending_spent(&self) -> bool {
        matches!(self, Self::Spent((_, ConfirmationStatus::Pending(_))))
    }

    /// Spent by a mined transaction.
    pub fn is_confirmed_spent(&self) -> bool {
        matches!(self, Self::Spent((_, ConfirmationStatus::Confirmed(_))))
    }

    /// The spending transaction, if any.
    pub fn spending_txid(&self) -> Option<TxId> {
        match self {
            Self::Unspent => None,
            Self::Spent((txid, _)) => Some(*txid),
        }
    }
}

impl std::fmt::Display for SpendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpendStatus::Unspent => write!(f, "unspent"),
            SpendStatus::Spent((txid, ConfirmationStatus::Pending(_))) => {
                write!(f, "pending spent in {}", txid)
            }
            SpendStatus::Spent((txid, ConfirmationStatus::Confirmed(_))) => {
                write!(f, "spent in {}", txid)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spend_predicates() {
        let txid = TxId::from_bytes([1; 32]);
        let pending = SpendStatus::Spent((txid, ConfirmationStatus::Pending(5.into())));
        let confirmed = SpendStatus::Spent((txid, ConfirmationStatus::Confirmed(5.into())));

        assert!(SpendStatus::Unspent.is_unspent());
        assert!(pending.is_pending_spent() && !pending.is_confirmed_spent());
        assert!(confirmed.is_confirmed_spent() && !confirmed.is_pending_spent());
        assert_eq!(confirmed.spending_txid(), Some(txid));
        assert!(pending.to_string().starts_with("pending spent in "));
    }
}
