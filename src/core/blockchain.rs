use crate::config::Config;
use crate::core::iterator::ChainIterator;
use crate::core::utxo::UtxoIndex;
use crate::core::{Block, Transaction, TxInput, TxOutput};
use crate::crypto::hash::{Hash160, Hash256};
use crate::crypto::keys::{KeyPair, PrivateKey};
use crate::mining::{BlockProducer, HashSealer};
use crate::storage::LedgerStore;
use crate::{ChainError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// The ledger controller: owns the tip, the block store and the UTXO index,
/// and keeps them consistent. Every mutating operation takes `&mut self`;
/// that is the single serialization boundary of the single-writer model.
/// Iterators read concurrently but reflect the tip they were built from.
pub struct Blockchain {
    tip: Hash256,
    store: Arc<LedgerStore>,
    utxo: UtxoIndex,
    producer: Box<dyn BlockProducer>,
}

impl Blockchain {
    /// Opens the ledger with the default sealer. An empty store gets a
    /// genesis block crediting `genesis_address` with the configured reward.
    pub fn open(config: &Config, genesis_address: &str) -> Result<Self> {
        Self::open_with_producer(config, genesis_address, Box::new(HashSealer))
    }

    pub fn open_with_producer(
        config: &Config,
        genesis_address: &str,
        producer: Box<dyn BlockProducer>,
    ) -> Result<Self> {
        let store = Arc::new(LedgerStore::open(&config.storage.data_dir)?);
        let utxo = UtxoIndex::new(store.clone());

        let tip = match store.tip()? {
            Some(tip) => {
                log::info!("Loaded existing chain, tip {}", tip);
                tip
            }
            None => {
                let coinbase = Transaction::new_coinbase(
                    genesis_address,
                    config.genesis.coinbase_reward,
                    config.genesis.payload.clone().into_bytes(),
                )?;
                let genesis = producer.produce(vec![coinbase], Hash256::zero(), 0)?;
                store.commit(&genesis)?;
                utxo.reindex(genesis.hash)?;
                log::info!("Created new chain, genesis {}", genesis.hash);
                genesis.hash
            }
        };

        Ok(Self {
            tip,
            store,
            utxo,
            producer,
        })
    }

    /// Verifies every candidate transaction against the chain, requests a
    /// sealed block at tip height + 1, commits block + tip atomically and
    /// applies the incremental index update. The first invalid transaction
    /// fails the whole call; mining is a trusted local operation with no
    /// partial rejection.
    pub fn mine_block(&mut self, transactions: Vec<Transaction>) -> Result<Block> {
        for tx in &transactions {
            if !self.verify_transaction(tx)? {
                return Err(ChainError::InvalidTransaction(tx.id));
            }
            log::debug!("Transaction {} verified", tx.id);
        }

        let tip_height = self.best_height()?;
        let block = self
            .producer
            .produce(transactions, self.tip, tip_height + 1)?;

        self.store.commit(&block)?;
        self.tip = block.hash;
        self.utxo.update(&block)?;

        log::info!("Mined block {} at height {}", block.hash, block.height);
        Ok(block)
    }

    /// Idempotent ingestion of an externally produced block. The tip only
    /// advances when the new height exceeds the current tip height (height
    /// fork choice, not cumulative work). The UTXO index is left untouched;
    /// a caller that adopts a competing branch must call `reindex_utxos`.
    /// Returns whether the tip moved.
    pub fn add_block(&mut self, block: &Block) -> Result<bool> {
        if self.store.contains(&block.hash)? {
            log::debug!("Block {} already present, ignoring", block.hash);
            return Ok(false);
        }

        if block.height > self.best_height()? {
            self.store.commit(block)?;
            self.tip = block.hash;
            log::info!("Accepted block {} as new tip, height {}", block.hash, block.height);
            Ok(true)
        } else {
            self.store.put_block(block)?;
            log::debug!("Stored non-tip block {} at height {}", block.hash, block.height);
            Ok(false)
        }
    }

    /// Resolves every transaction referenced by `tx` and signs each input.
    pub fn sign_transaction(&self, tx: &mut Transaction, private_key: &PrivateKey) -> Result<()> {
        let prev_txs = self.referenced_transactions(tx)?;
        tx.sign(private_key, &prev_txs)
    }

    /// Resolves references and verifies. A reference that cannot be found
    /// on the chain makes the transaction invalid rather than erroring.
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }

        let prev_txs = match self.referenced_transactions(tx) {
            Ok(prev_txs) => prev_txs,
            Err(ChainError::TransactionNotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        Ok(tx.verify(&prev_txs))
    }

    /// Builds and signs a transfer of `amount` from `from`'s unspent outputs
    /// to `to_address`, returning change to the sender. First-fit selection;
    /// the caller commits the result through `mine_block`.
    pub fn create_transaction(
        &self,
        from: &KeyPair,
        to_address: &str,
        amount: u64,
    ) -> Result<Transaction> {
        let pub_key_hash = from.public_key.pubkey_hash();
        let (accumulated, selection) = self.utxo.find_spendable(&pub_key_hash, amount)?;

        if accumulated < amount {
            return Err(ChainError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let inputs = selection
            .into_iter()
            .map(|(txid, vout)| TxInput {
                txid,
                vout: vout as i32,
                signature: Vec::new(),
                pub_key: Vec::new(),
            })
            .collect();

        let mut outputs = vec![TxOutput::locked_to_address(amount, to_address)?];
        if accumulated > amount {
            outputs.push(TxOutput::new(accumulated - amount, pub_key_hash));
        }

        let mut tx = Transaction::new(inputs, outputs);
        self.sign_transaction(&mut tx, &from.private_key)?;
        Ok(tx)
    }

    /// Linear scan from the tip for a transaction by id.
    pub fn find_transaction(&self, id: &Hash256) -> Result<Transaction> {
        for block in self.iter() {
            let block = block?;
            for tx in block.transactions {
                if tx.id == *id {
                    return Ok(tx);
                }
            }
        }

        Err(ChainError::TransactionNotFound(*id))
    }

    fn referenced_transactions(&self, tx: &Transaction) -> Result<HashMap<Hash256, Transaction>> {
        let mut prev_txs = HashMap::new();

        if tx.is_coinbase() {
            return Ok(prev_txs);
        }

        for input in &tx.inputs {
            let prev = self.find_transaction(&input.txid)?;
            prev_txs.insert(prev.id, prev);
        }

        Ok(prev_txs)
    }

    // Read accessors

    pub fn tip(&self) -> Hash256 {
        self.tip
    }

    pub fn best_height(&self) -> Result<u64> {
        Ok(self.store.block(&self.tip)?.height)
    }

    pub fn get_block(&self, hash: &Hash256) -> Result<Block> {
        self.store.block(hash)
    }

    /// Hashes of every block on the current chain, tip first.
    pub fn block_hashes(&self) -> Result<Vec<Hash256>> {
        let mut hashes = Vec::new();
        for block in self.iter() {
            hashes.push(block?.hash);
        }
        Ok(hashes)
    }

    pub fn iter(&self) -> ChainIterator {
        ChainIterator::new(self.store.clone(), self.tip)
    }

    // UTXO index views

    pub fn find_unspent_owned_by(
        &self,
        pub_key_hash: &Hash160,
    ) -> Result<Vec<(Hash256, u32, TxOutput)>> {
        self.utxo.find_unspent_owned_by(pub_key_hash)
    }

    pub fn find_spendable(
        &self,
        pub_key_hash: &Hash160,
        amount: u64,
    ) -> Result<(u64, Vec<(Hash256, u32)>)> {
        self.utxo.find_spendable(pub_key_hash, amount)
    }

    /// Sum of all unspent value locked to `pub_key_hash`.
    pub fn balance_of(&self, pub_key_hash: &Hash160) -> Result<u64> {
        let owned = self.utxo.find_unspent_owned_by(pub_key_hash)?;
        Ok(owned.iter().map(|(_, _, output)| output.value).sum())
    }

    /// Full index rebuild from the current tip. Required after accepting a
    /// competing branch through `add_block`.
    pub fn reindex_utxos(&self) -> Result<()> {
        self.utxo.reindex(self.tip)
    }
}
