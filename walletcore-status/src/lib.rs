//! Status types shared by the wallet's transaction records and outputs.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod confirmation_status;
pub mod spend_status;
