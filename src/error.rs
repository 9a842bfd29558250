use crate::crypto::hash::Hash256;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChainError>;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Block not found: {0}")]
    BlockNotFound(Hash256),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(Hash256),

    #[error("Referenced transaction missing: {0}")]
    MissingReference(Hash256),

    #[error("Invalid transaction rejected during mining: {0}")]
    InvalidTransaction(Hash256),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
