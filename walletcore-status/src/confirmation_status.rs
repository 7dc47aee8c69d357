//! A transaction is either pending (built and broadcast, not yet in a block) or
//! confirmed at a block height.

use zcash_protocol::consensus::BlockHeight;

/// Transaction confirmation states. Every transaction record includes exactly one of these variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfirmationStatus {
    /// The transaction is waiting to be mined.
    /// The BlockHeight is the target height it was built for, i.e. 1 + the chain tip at broadcast.
    Pending(BlockHeight),
    /// The transaction has been included in a block at this height.
    Confirmed(BlockHeight),
}

impl ConfirmationStatus {
    /// Converts from a blockheight and `pending`.
    pub fn from_blockheight_and_pending_bool(blockheight: BlockHeight, pending: bool) -> Self {
        if pending {
            Self::Pending(blockheight)
        } else {
            Self::Confirmed(blockheight)
        }
    }

    /// Is pending.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Is confirmed.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    /// Returns true if confirmed at or above `comparison_height`.
    ///
    /// # Examples
    ///
    /// ```
    /// use walletcore_status::confirmation_status::ConfirmationStatus;
    /// use zcash_protocol::consensus::BlockHeight;
    ///
    /// let status = ConfirmationStatus::Confirmed(10.into());
    /// assert!(status.is_confirmed_after_or_at(&9.into()));
    /// assert!(status.is_confirmed_after_or_at(&10.into()));
    /// assert!(!status.is_confirmed_after_or_at(&11.into()));
    /// ```
    pub fn is_confirmed_after_or_at(&self, comparison_height: &BlockHeight) -> bool {
        matches!(self, Self::Confirmed(height) if height >= comparison_height)
    }

    /// Returns true if confirmed at or below `comparison_height`.
    pub fn is_confirmed_before_or_at(&self, comparison_height: &BlockHeight) -> bool {
        matches!(self, Self::Confirmed(height) if height <= comparison_height)
    }

    /// Returns the height at which the transaction was mined, if it was.
    pub fn get_confirmed_height(&self) -> Option<BlockHeight> {
        match self {
            Self::Confirmed(height) => Some(*height),
            Self::Pending(_) => None,
        }
    }

    /// Returns the height of the status, be it target height or mined height.
    pub fn get_height(&self) -> BlockHeight {
        match self {
            Self::Pending(height) | Self::Confirmed(height) => *height,
        }
    }

    /// The lowercase label reported to callers: `pending` or `confirmed`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending(_) => "pending",
            Self::Confirmed(_) => "confirmed",
        }
    }
}

impl std::fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending(height) => {
                write!(f, "Transaction pending, targeting height {}.", height)
            }
            Self::Confirmed(height) => {
                write!(f, "Transaction confirmed on chain at height {}.", height)
            }
        }
    }
}

impl From<ConfirmationStatus> for String {
    fn from(value: ConfirmationStatus) -> Self {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ConfirmationStatus::Confirmed(10.into()), 11, true ; "confirmed below")]
    #[test_case(ConfirmationStatus::Confirmed(10.into()), 10, true ; "confirmed at")]
    #[test_case(ConfirmationStatus::Confirmed(10.into()), 9, false ; "confirmed above")]
    #[test_case(ConfirmationStatus::Pending(10.into()), 11, false ; "pending is never confirmed")]
    fn confirmed_before_or_at(status: ConfirmationStatus, height: u32, expected: bool) {
        assert_eq!(
            status.is_confirmed_before_or_at(&BlockHeight::from_u32(height)),
            expected
        );
    }

    #[test]
    fn confirmed_height_only_for_confirmed() {
        assert_eq!(
            ConfirmationStatus::Confirmed(7.into()).get_confirmed_height(),
            Some(BlockHeight::from_u32(7))
        );
        assert_eq!(
            ConfirmationStatus::Pending(7.into()).get_confirmed_height(),
            None
        );
    }

    #[test]
    fn from_pending_bool() {
        let height = BlockHeight::from_u32(3);
        assert!(ConfirmationStatus::from_blockheight_and_pending_bool(height, true).is_pending());
        assert!(ConfirmationStatus::from_blockheight_and_pending_bool(height, false).is_confirmed());
    }
}
