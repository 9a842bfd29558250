//! Core ledger components

pub mod block;
pub mod blockchain;
pub mod iterator;
pub mod transaction;
pub mod utxo;

pub use block::Block;
pub use blockchain::Blockchain;
pub use iterator::ChainIterator;
pub use transaction::{Transaction, TxInput, TxOutput};
pub use utxo::{UnspentOutput, UtxoIndex};
