use crate::core::iterator::ChainIterator;
use crate::core::{Block, TxOutput};
use crate::crypto::hash::{Hash160, Hash256};
use crate::storage::LedgerStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One still-unspent output of an indexed transaction, tagged with its
/// original position so spends can remove it precisely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub vout: u32,
    pub output: TxOutput,
}

/// Persistent index of unspent outputs, keyed by transaction id. Kept in
/// sync with the ledger by `reindex` (full rebuild) and `update` (one block
/// appended at the tip).
#[derive(Debug, Clone)]
pub struct UtxoIndex {
    store: Arc<LedgerStore>,
}

impl UtxoIndex {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Full rebuild: walks the chain from `tip` once, keeps every output not
    /// referenced by any non-coinbase input anywhere in the chain, and
    /// replaces the stored index with the result.
    pub fn reindex(&self, tip: Hash256) -> Result<()> {
        let mut outputs_by_tx: HashMap<Hash256, Vec<UnspentOutput>> = HashMap::new();
        let mut spent: HashMap<Hash256, HashSet<i32>> = HashMap::new();

        for block in ChainIterator::new(self.store.clone(), tip) {
            let block = block?;
            for tx in &block.transactions {
                let outputs = tx
                    .outputs
                    .iter()
                    .enumerate()
                    .map(|(vout, output)| UnspentOutput {
                        vout: vout as u32,
                        output: output.clone(),
                    })
                    .collect();
                outputs_by_tx.insert(tx.id, outputs);

                if !tx.is_coinbase() {
                    for input in &tx.inputs {
                        spent.entry(input.txid).or_default().insert(input.vout);
                    }
                }
            }
        }

        let entries: Vec<(Hash256, Vec<UnspentOutput>)> = outputs_by_tx
            .into_iter()
            .filter_map(|(txid, mut outputs)| {
                if let Some(spent_vouts) = spent.get(&txid) {
                    outputs.retain(|unspent| !spent_vouts.contains(&(unspent.vout as i32)));
                }
                if outputs.is_empty() {
                    None
                } else {
                    Some((txid, outputs))
                }
            })
            .collect();

        self.store.replace_utxo_entries(&entries)?;
        log::info!("Rebuilt UTXO index: {} transactions with unspent outputs", entries.len());
        Ok(())
    }

    /// Incremental step for a block just committed at the tip: removes each
    /// output its inputs consume (dropping entries that become empty) and
    /// inserts a fresh entry for every transaction, coinbase included.
    /// Applied exactly once per committed block; after a reorganization only
    /// `reindex` restores consistency.
    pub fn update(&self, block: &Block) -> Result<()> {
        // Pending view layered over the stored index, so spends of outputs
        // created earlier in this same block resolve correctly.
        let mut pending: HashMap<Hash256, Vec<UnspentOutput>> = HashMap::new();
        let mut touched: Vec<Hash256> = Vec::new();

        for tx in &block.transactions {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    let mut outputs = match pending.get(&input.txid) {
                        Some(outputs) => outputs.clone(),
                        None => self.store.utxo_entry(&input.txid)?.unwrap_or_default(),
                    };
                    outputs.retain(|unspent| unspent.vout as i32 != input.vout);

                    if !pending.contains_key(&input.txid) {
                        touched.push(input.txid);
                    }
                    pending.insert(input.txid, outputs);
                }
            }

            let fresh = tx
                .outputs
                .iter()
                .enumerate()
                .map(|(vout, output)| UnspentOutput {
                    vout: vout as u32,
                    output: output.clone(),
                })
                .collect();
            if !pending.contains_key(&tx.id) {
                touched.push(tx.id);
            }
            pending.insert(tx.id, fresh);
        }

        let mut deletes = Vec::new();
        let mut upserts = Vec::new();
        for txid in touched {
            match pending.remove(&txid) {
                Some(outputs) if outputs.is_empty() => deletes.push(txid),
                Some(outputs) => upserts.push((txid, outputs)),
                None => {}
            }
        }

        self.store.apply_utxo_changes(&deletes, &upserts)?;
        log::debug!(
            "UTXO index updated for block {}: {} entries removed, {} upserted",
            block.hash,
            deletes.len(),
            upserts.len()
        );
        Ok(())
    }

    /// All unspent outputs locked to `pub_key_hash`, as
    /// (transaction id, output index, output) triples.
    pub fn find_unspent_owned_by(
        &self,
        pub_key_hash: &Hash160,
    ) -> Result<Vec<(Hash256, u32, TxOutput)>> {
        let mut owned = Vec::new();

        for (txid, outputs) in self.store.utxo_entries()? {
            for unspent in outputs {
                if unspent.output.is_locked_with(pub_key_hash) {
                    owned.push((txid, unspent.vout, unspent.output));
                }
            }
        }

        Ok(owned)
    }

    /// Greedy first-fit selection in index order: accumulates owned outputs
    /// until the total reaches `amount`, then stops. May over-select; never
    /// under-selects unless the owner's total is itself below `amount`.
    pub fn find_spendable(
        &self,
        pub_key_hash: &Hash160,
        amount: u64,
    ) -> Result<(u64, Vec<(Hash256, u32)>)> {
        let mut accumulated = 0u64;
        let mut selection = Vec::new();

        'outer: for (txid, outputs) in self.store.utxo_entries()? {
            for unspent in outputs {
                if !unspent.output.is_locked_with(pub_key_hash) {
                    continue;
                }
                accumulated += unspent.output.value;
                selection.push((txid, unspent.vout));
                if accumulated >= amount {
                    break 'outer;
                }
            }
        }

        Ok((accumulated, selection))
    }

    /// Number of transactions that still have unspent outputs.
    pub fn count(&self) -> usize {
        self.store.utxo_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Transaction, TxInput};
    use crate::crypto::KeyPair;
    use tempfile::TempDir;

    fn sealed(mut block: Block) -> Block {
        block.hash = block.content_hash();
        block
    }

    fn setup() -> (TempDir, Arc<LedgerStore>, UtxoIndex) {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LedgerStore::open(dir.path().join("ledger")).unwrap());
        let index = UtxoIndex::new(store.clone());
        (dir, store, index)
    }

    fn unsigned_spend(prev: &Transaction, vout: i32, to: &KeyPair, value: u64) -> Transaction {
        let input = TxInput {
            txid: prev.id,
            vout,
            signature: Vec::new(),
            pub_key: Vec::new(),
        };
        Transaction::new(vec![input], vec![TxOutput::new(value, to.public_key.pubkey_hash())])
    }

    #[test]
    fn test_update_inserts_coinbase_outputs() {
        let (_dir, store, index) = setup();
        let owner = KeyPair::new();
        let coinbase = Transaction::new_coinbase(&owner.address(), 10, b"g".to_vec()).unwrap();
        let genesis = sealed(Block::genesis(coinbase.clone()));

        store.commit(&genesis).unwrap();
        index.update(&genesis).unwrap();

        let owned = index
            .find_unspent_owned_by(&owner.public_key.pubkey_hash())
            .unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].0, coinbase.id);
        assert_eq!(owned[0].2.value, 10);
        assert_eq!(index.count(), 1);
    }

    #[test]
    fn test_update_removes_spent_entry() {
        let (_dir, store, index) = setup();
        let owner = KeyPair::new();
        let recipient = KeyPair::new();
        let coinbase = Transaction::new_coinbase(&owner.address(), 10, b"g".to_vec()).unwrap();
        let genesis = sealed(Block::genesis(coinbase.clone()));

        store.commit(&genesis).unwrap();
        index.update(&genesis).unwrap();

        let spend = unsigned_spend(&coinbase, 0, &recipient, 10);
        let block = sealed(Block::new(vec![spend.clone()], genesis.hash, 1));
        store.commit(&block).unwrap();
        index.update(&block).unwrap();

        assert!(index
            .find_unspent_owned_by(&owner.public_key.pubkey_hash())
            .unwrap()
            .is_empty());
        let owned = index
            .find_unspent_owned_by(&recipient.public_key.pubkey_hash())
            .unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].2.value, 10);
        // The coinbase entry is fully spent and must be gone.
        assert!(store.utxo_entry(&coinbase.id).unwrap().is_none());
    }

    #[test]
    fn test_update_handles_same_block_spend() {
        let (_dir, store, index) = setup();
        let owner = KeyPair::new();
        let recipient = KeyPair::new();
        let coinbase = Transaction::new_coinbase(&owner.address(), 10, b"g".to_vec()).unwrap();
        let genesis = sealed(Block::genesis(coinbase.clone()));
        store.commit(&genesis).unwrap();
        index.update(&genesis).unwrap();

        // One block containing a spend of the coinbase and a spend of that
        // spend's own output.
        let first = unsigned_spend(&coinbase, 0, &owner, 10);
        let second = unsigned_spend(&first, 0, &recipient, 10);
        let block = sealed(Block::new(vec![first.clone(), second.clone()], genesis.hash, 1));
        store.commit(&block).unwrap();
        index.update(&block).unwrap();

        assert!(store.utxo_entry(&first.id).unwrap().is_none());
        let owned = index
            .find_unspent_owned_by(&recipient.public_key.pubkey_hash())
            .unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].0, second.id);
    }

    #[test]
    fn test_reindex_matches_incremental_updates() {
        let (_dir, store, index) = setup();
        let owner = KeyPair::new();
        let recipient = KeyPair::new();
        let coinbase = Transaction::new_coinbase(&owner.address(), 10, b"g".to_vec()).unwrap();
        let genesis = sealed(Block::genesis(coinbase.clone()));
        store.commit(&genesis).unwrap();
        index.update(&genesis).unwrap();

        let reward = Transaction::new_coinbase(&owner.address(), 10, b"b1".to_vec()).unwrap();
        let spend = unsigned_spend(&coinbase, 0, &recipient, 10);
        let block = sealed(Block::new(vec![reward, spend], genesis.hash, 1));
        store.commit(&block).unwrap();
        index.update(&block).unwrap();

        let mut incremental = store.utxo_entries().unwrap();
        index.reindex(block.hash).unwrap();
        let mut rebuilt = store.utxo_entries().unwrap();

        incremental.sort_by_key(|(txid, _)| *txid.as_bytes());
        rebuilt.sort_by_key(|(txid, _)| *txid.as_bytes());
        assert_eq!(incremental, rebuilt);
    }

    #[test]
    fn test_find_spendable_bounds() {
        let (_dir, store, index) = setup();
        let owner = KeyPair::new();
        let hash = owner.public_key.pubkey_hash();

        let cb1 = Transaction::new_coinbase(&owner.address(), 4, b"a".to_vec()).unwrap();
        let genesis = sealed(Block::genesis(cb1));
        store.commit(&genesis).unwrap();
        index.update(&genesis).unwrap();

        let cb2 = Transaction::new_coinbase(&owner.address(), 7, b"b".to_vec()).unwrap();
        let block = sealed(Block::new(vec![cb2], genesis.hash, 1));
        store.commit(&block).unwrap();
        index.update(&block).unwrap();

        // Enough funds: selection covers the request and stops early.
        let (accumulated, selection) = index.find_spendable(&hash, 5).unwrap();
        assert!(accumulated >= 5);
        assert!(!selection.is_empty());
        let unspent = index.find_unspent_owned_by(&hash).unwrap();
        for (txid, vout) in &selection {
            assert!(unspent.iter().any(|(id, v, _)| id == txid && v == vout));
        }

        // Short funds: everything owned is accumulated, still below target.
        let (accumulated, selection) = index.find_spendable(&hash, 1_000).unwrap();
        assert_eq!(accumulated, 11);
        assert_eq!(selection.len(), 2);

        // Foreign owner sees nothing.
        let stranger = KeyPair::new();
        let (accumulated, selection) = index
            .find_spendable(&stranger.public_key.pubkey_hash(), 1)
            .unwrap();
        assert_eq!(accumulated, 0);
        assert!(selection.is_empty());
    }
}
