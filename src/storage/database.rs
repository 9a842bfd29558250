use crate::core::utxo::UnspentOutput;
use crate::core::Block;
use crate::crypto::hash::Hash256;
use crate::{ChainError, Result};
use sled::{Batch, Db, Tree};
use std::path::Path;

const TREE_BLOCKS: &str = "blocks";
const TREE_UTXOS: &str = "utxos";

/// Reserved key inside the blocks tree holding the current tip hash.
const TIP_KEY: &[u8] = b"l";

/// File-backed ledger store: block hash -> serialized block, plus the tip
/// pointer. Multi-key mutations go through `sled::Batch` so a crash never
/// leaves the tip pointing at an unpersisted block.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    db: Db,
    blocks: Tree,
    utxos: Tree,
}

impl LedgerStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            ChainError::Storage(format!(
                "Failed to open ledger at {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let blocks = db.open_tree(TREE_BLOCKS)?;
        let utxos = db.open_tree(TREE_UTXOS)?;

        Ok(Self { db, blocks, utxos })
    }

    // Block operations

    pub fn put_block(&self, block: &Block) -> Result<()> {
        let data = bincode::serialize(block)?;
        self.blocks.insert(block.hash.as_bytes(), data)?;
        self.blocks.flush()?;
        log::debug!("Saved block {} at height {}", block.hash, block.height);
        Ok(())
    }

    /// Persists a block and moves the tip to it in one atomic commit.
    pub fn commit(&self, block: &Block) -> Result<()> {
        let data = bincode::serialize(block)?;

        let mut batch = Batch::default();
        batch.insert(block.hash.as_bytes().to_vec(), data);
        batch.insert(TIP_KEY.to_vec(), block.hash.as_bytes().to_vec());
        self.blocks.apply_batch(batch)?;

        self.blocks.flush()?;
        log::debug!("Committed block {} as new tip", block.hash);
        Ok(())
    }

    pub fn block(&self, hash: &Hash256) -> Result<Block> {
        match self.blocks.get(hash.as_bytes())? {
            Some(data) => Ok(bincode::deserialize(&data)?),
            None => Err(ChainError::BlockNotFound(*hash)),
        }
    }

    pub fn contains(&self, hash: &Hash256) -> Result<bool> {
        Ok(self.blocks.contains_key(hash.as_bytes())?)
    }

    pub fn tip(&self) -> Result<Option<Hash256>> {
        match self.blocks.get(TIP_KEY)? {
            Some(bytes) => {
                let hash = Hash256::from_slice(&bytes)
                    .ok_or_else(|| ChainError::Storage("Corrupt tip pointer".to_string()))?;
                Ok(Some(hash))
            }
            None => Ok(None),
        }
    }

    pub fn set_tip(&self, hash: &Hash256) -> Result<()> {
        self.blocks.insert(TIP_KEY, hash.as_bytes().as_slice())?;
        self.blocks.flush()?;
        Ok(())
    }

    // UTXO index operations. One entry per transaction id, holding the
    // outputs of that transaction not yet spent.

    pub fn utxo_entry(&self, txid: &Hash256) -> Result<Option<Vec<UnspentOutput>>> {
        match self.utxos.get(txid.as_bytes())? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    /// Iterates all index entries in key order.
    pub fn utxo_entries(&self) -> Result<Vec<(Hash256, Vec<UnspentOutput>)>> {
        let mut entries = Vec::new();

        for item in self.utxos.iter() {
            let (key, value) = item?;
            let txid = Hash256::from_slice(&key)
                .ok_or_else(|| ChainError::Storage("Corrupt UTXO index key".to_string()))?;
            let outputs: Vec<UnspentOutput> = bincode::deserialize(&value)?;
            entries.push((txid, outputs));
        }

        Ok(entries)
    }

    pub fn utxo_count(&self) -> usize {
        self.utxos.len()
    }

    /// Applies one block's worth of index changes atomically: removals of
    /// fully spent entries and upserts of shrunk or fresh ones.
    pub fn apply_utxo_changes(
        &self,
        deletes: &[Hash256],
        upserts: &[(Hash256, Vec<UnspentOutput>)],
    ) -> Result<()> {
        let mut batch = Batch::default();

        for txid in deletes {
            batch.remove(txid.as_bytes().to_vec());
        }
        for (txid, outputs) in upserts {
            let data = bincode::serialize(outputs)?;
            batch.insert(txid.as_bytes().to_vec(), data);
        }

        self.utxos.apply_batch(batch)?;
        self.utxos.flush()?;
        Ok(())
    }

    /// Replaces the whole index with a freshly rebuilt one.
    pub fn replace_utxo_entries(&self, entries: &[(Hash256, Vec<UnspentOutput>)]) -> Result<()> {
        self.utxos.clear()?;

        let mut batch = Batch::default();
        for (txid, outputs) in entries {
            let data = bincode::serialize(outputs)?;
            batch.insert(txid.as_bytes().to_vec(), data);
        }
        self.utxos.apply_batch(batch)?;

        self.utxos.flush()?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
