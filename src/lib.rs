//! Minichain - a persistent, single-writer UTXO ledger engine
//!
//! This library implements the core of a value-transfer ledger:
//! - Append-only block store with height-based fork choice
//! - Incrementally maintained unspent-output index
//! - Per-input transaction signing and verification
//!
//! Proof-of-work, peer sync and wallets live outside this core; block
//! sealing is pluggable through the `BlockProducer` trait.

pub mod core;
pub mod crypto;
pub mod mining;
pub mod storage;
pub mod error;
pub mod config;

pub use error::{ChainError, Result};
