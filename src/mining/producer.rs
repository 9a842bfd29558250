use crate::core::{Block, Transaction};
use crate::crypto::hash::Hash256;
use crate::Result;

/// External block producer: given ordered transactions, the previous hash
/// and the target height, returns a sealed block with its hash computed and
/// any consensus puzzle solved. A proof-of-work implementation plugs in
/// here; the ledger core never looks inside the seal.
pub trait BlockProducer: Send + Sync {
    fn produce(
        &self,
        transactions: Vec<Transaction>,
        prev_hash: Hash256,
        height: u64,
    ) -> Result<Block>;
}

/// Default producer: timestamps the block and seals it with its content
/// hash. No difficulty, no nonce search.
#[derive(Debug, Default, Clone)]
pub struct HashSealer;

impl BlockProducer for HashSealer {
    fn produce(
        &self,
        transactions: Vec<Transaction>,
        prev_hash: Hash256,
        height: u64,
    ) -> Result<Block> {
        let mut block = Block::new(transactions, prev_hash, height);
        block.hash = block.content_hash();
        Ok(block)
    }
}
