//! Persistent block storage

pub mod database;

pub use database::LedgerStore;
