#![forbid(unsafe_code)]
//! Wallet engine behind a desktop wallet UI.
//!
//! The UI drives everything through string commands (see [`bridge::execute_async`]):
//! chain sync, note tracking across the orchard, sapling and transparent pools,
//! two-phase send (propose, then confirm) and value transfer history.

pub mod bridge;
pub mod chain;
pub mod commands;
pub mod config;
pub mod error;
pub mod lightclient;
pub mod scan;
pub mod wallet;

// This line includes the generated `git_description()` and `git_commit()` functions directly into this scope.
include!(concat!(env!("OUT_DIR"), "/git_description.rs"));
