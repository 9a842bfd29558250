use crate::core::Transaction;
use crate::crypto::hash::{Hash256, Hashable};
use serde::{Deserialize, Serialize};

/// A committed ledger block. Immutable once persisted; the hash is sealed by
/// the block producer over the block content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub timestamp: i64,
    pub prev_hash: Hash256,
    pub hash: Hash256,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Builds an unsealed block; the producer fills in the hash.
    pub fn new(transactions: Vec<Transaction>, prev_hash: Hash256, height: u64) -> Self {
        Self {
            height,
            timestamp: chrono::Utc::now().timestamp(),
            prev_hash,
            hash: Hash256::zero(),
            transactions,
        }
    }

    /// Genesis factory: wraps a coinbase transaction into an unsealed
    /// height-0 block with an empty previous hash.
    pub fn genesis(coinbase: Transaction) -> Self {
        Self::new(vec![coinbase], Hash256::zero(), 0)
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_zero()
    }

    /// Content hash over everything except the hash slot itself.
    pub fn content_hash(&self) -> Hash256 {
        let mut unsealed = self.clone();
        unsealed.hash = Hash256::zero();
        let data = bincode::serialize(&unsealed).expect("block serialization cannot fail");
        Hash256::hash(&data)
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

impl Hashable for Block {
    fn hash(&self) -> Hash256 {
        self.content_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_shape() {
        let coinbase = Transaction::new_coinbase(
            &crate::crypto::KeyPair::new().address(),
            10,
            b"genesis".to_vec(),
        )
        .unwrap();
        let block = Block::genesis(coinbase);

        assert_eq!(block.height, 0);
        assert!(block.is_genesis());
        assert!(block.hash.is_zero());
        assert_eq!(block.transaction_count(), 1);
    }

    #[test]
    fn test_content_hash_ignores_seal() {
        let coinbase = Transaction::new_coinbase(
            &crate::crypto::KeyPair::new().address(),
            10,
            b"genesis".to_vec(),
        )
        .unwrap();
        let mut block = Block::genesis(coinbase);
        let before = block.content_hash();

        block.hash = before;
        assert_eq!(block.content_hash(), before);
    }
}
