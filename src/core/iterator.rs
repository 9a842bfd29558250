use crate::core::Block;
use crate::crypto::hash::Hash256;
use crate::storage::LedgerStore;
use crate::Result;
use std::sync::Arc;

/// Lazy backward cursor over the chain, starting hash (normally the tip)
/// down to genesis. The starting hash is captured at construction, so a tip
/// advance during iteration does not affect a cursor already in progress.
/// Not restartable; build a new one to iterate again.
pub struct ChainIterator {
    store: Arc<LedgerStore>,
    current: Hash256,
    exhausted: bool,
}

impl ChainIterator {
    pub fn new(store: Arc<LedgerStore>, start: Hash256) -> Self {
        Self {
            store,
            current: start,
            exhausted: start.is_zero(),
        }
    }
}

impl Iterator for ChainIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        match self.store.block(&self.current) {
            Ok(block) => {
                self.current = block.prev_hash;
                if block.prev_hash.is_zero() {
                    // Genesis reached; the walk ends after yielding it.
                    self.exhausted = true;
                }
                Some(Ok(block))
            }
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}
