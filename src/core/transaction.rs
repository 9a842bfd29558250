use crate::crypto::hash::{Hash160, Hash256, Hashable};
use crate::crypto::keys::{address_to_pubkey_hash, PrivateKey, PublicKey};
use crate::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Output index sentinel marking the coinbase input.
pub const COINBASE_VOUT: i32 = -1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Hash256,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInput {
    /// Id of the transaction whose output is being spent; zero for coinbase.
    pub txid: Hash256,
    /// Index of the referenced output; `COINBASE_VOUT` for coinbase.
    pub vout: i32,
    /// Compact ECDSA signature over the canonical signing payload.
    pub signature: Vec<u8>,
    /// Serialized public key of the spender. The coinbase input carries
    /// arbitrary payload bytes here instead.
    pub pub_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub pub_key_hash: Hash160,
}

impl TxOutput {
    pub fn new(value: u64, pub_key_hash: Hash160) -> Self {
        Self {
            value,
            pub_key_hash,
        }
    }

    pub fn locked_to_address(value: u64, address: &str) -> Result<Self> {
        Ok(Self::new(value, address_to_pubkey_hash(address)?))
    }

    /// Owner predicate: byte equality against a candidate locking hash.
    pub fn is_locked_with(&self, pub_key_hash: &Hash160) -> bool {
        self.pub_key_hash == *pub_key_hash
    }
}

impl Transaction {
    /// Builds a transaction from prepared inputs and outputs and derives its
    /// id. Inputs are expected unsigned; sign afterwards.
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            id: Hash256::zero(),
            inputs,
            outputs,
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Coinbase factory: one sentinel input carrying `payload`, one output
    /// minting `value` to `address`.
    pub fn new_coinbase(address: &str, value: u64, payload: Vec<u8>) -> Result<Self> {
        let input = TxInput {
            txid: Hash256::zero(),
            vout: COINBASE_VOUT,
            signature: Vec::new(),
            pub_key: payload,
        };
        let output = TxOutput::locked_to_address(value, address)?;

        Ok(Self::new(vec![input], vec![output]))
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].txid.is_zero()
            && self.inputs[0].vout == COINBASE_VOUT
    }

    /// Content hash with the id slot zeroed. Computed when the transaction
    /// is built, before signatures exist, so the id excludes them.
    fn compute_id(&self) -> Hash256 {
        let mut unsealed = self.clone();
        unsealed.id = Hash256::zero();
        let data = bincode::serialize(&unsealed).expect("transaction serialization cannot fail");
        Hash256::hash(&data)
    }

    /// Copy with every input's signature and public key stripped; the shared
    /// base of all per-input signing payloads.
    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TxInput {
                txid: input.txid,
                vout: input.vout,
                signature: Vec::new(),
                pub_key: Vec::new(),
            })
            .collect();

        Transaction {
            id: Hash256::zero(),
            inputs,
            outputs: self.outputs.clone(),
        }
    }

    /// Resolves the output spent by input `index` out of the supplied
    /// referenced transactions.
    fn referenced_output<'a>(
        &self,
        index: usize,
        prev_txs: &'a HashMap<Hash256, Transaction>,
    ) -> Result<&'a TxOutput> {
        let input = &self.inputs[index];
        let prev = prev_txs
            .get(&input.txid)
            .ok_or(ChainError::MissingReference(input.txid))?;

        usize::try_from(input.vout)
            .ok()
            .and_then(|vout| prev.outputs.get(vout))
            .ok_or_else(|| {
                ChainError::InvalidInput(format!(
                    "Input references output {} of {}, which does not exist",
                    input.vout, input.txid
                ))
            })
    }

    /// Canonical signing hash for input `index`: the trimmed copy with only
    /// that input's pub_key slot holding the locking hash of the output it
    /// references. Pure; a fresh copy is built per call.
    fn signing_hash(
        &self,
        index: usize,
        prev_txs: &HashMap<Hash256, Transaction>,
    ) -> Result<Hash256> {
        let referenced = self.referenced_output(index, prev_txs)?;

        let mut payload = self.trimmed_copy();
        payload.inputs[index].pub_key = referenced.pub_key_hash.as_bytes().to_vec();

        let data = bincode::serialize(&payload)?;
        Ok(Hash256::hash(&data))
    }

    /// Signs every input with `private_key`, storing the compact signature
    /// and the real public key back into the input. `prev_txs` must hold
    /// every referenced transaction, keyed by id.
    pub fn sign(
        &mut self,
        private_key: &PrivateKey,
        prev_txs: &HashMap<Hash256, Transaction>,
    ) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let pub_key = private_key.public_key().to_bytes();

        for index in 0..self.inputs.len() {
            let hash = self.signing_hash(index, prev_txs)?;
            let signature = private_key.sign(&hash)?;

            self.inputs[index].signature = signature.to_vec();
            self.inputs[index].pub_key = pub_key.clone();
        }

        Ok(())
    }

    /// Checks every input's embedded signature against its embedded public
    /// key over the reconstructed canonical payload. Coinbase transactions
    /// verify unconditionally. Any missing reference, malformed key or
    /// failed check makes the whole transaction false; mining treats that
    /// as a rejection, so no structured error is produced here.
    pub fn verify(&self, prev_txs: &HashMap<Hash256, Transaction>) -> bool {
        if self.is_coinbase() {
            return true;
        }

        for (index, input) in self.inputs.iter().enumerate() {
            let referenced = match self.referenced_output(index, prev_txs) {
                Ok(output) => output,
                Err(_) => return false,
            };
            let hash = match self.signing_hash(index, prev_txs) {
                Ok(hash) => hash,
                Err(_) => return false,
            };
            let pub_key = match PublicKey::from_bytes(&input.pub_key) {
                Ok(key) => key,
                Err(_) => return false,
            };

            // The embedded key must be the one the referenced output is
            // locked to, and its signature must cover the canonical payload.
            if !referenced.is_locked_with(&pub_key.pubkey_hash()) {
                return false;
            }
            if !pub_key.verify(&hash, &input.signature) {
                return false;
            }
        }

        true
    }
}

impl Hashable for Transaction {
    fn hash(&self) -> Hash256 {
        self.compute_id()
    }
}
