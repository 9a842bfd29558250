use crate::crypto::hash::{Hash160, Hash256};
use crate::{ChainError, Result};
use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey};
use std::fmt;

const ADDRESS_VERSION: u8 = 0x00;

#[derive(Debug, Clone)]
pub struct PrivateKey {
    key: SecretKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    key: Secp256k1PublicKey,
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
}

impl PrivateKey {
    pub fn new() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, _) = secp.generate_keypair(&mut OsRng);
        Self { key: secret_key }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| ChainError::Crypto(format!("Invalid private key: {}", e)))?;

        Ok(Self { key: secret_key })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.secret_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::new();
        PublicKey {
            key: Secp256k1PublicKey::from_secret_key(&secp, &self.key),
        }
    }

    /// Signs a 32-byte content hash, returning the compact 64-byte signature.
    pub fn sign(&self, message: &Hash256) -> Result<[u8; 64]> {
        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(message.as_bytes())
            .map_err(|e| ChainError::Crypto(format!("Invalid message: {}", e)))?;

        let signature = secp.sign_ecdsa(&message, &self.key);
        Ok(signature.serialize_compact())
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key = Secp256k1PublicKey::from_slice(bytes)
            .map_err(|e| ChainError::Crypto(format!("Invalid public key: {}", e)))?;

        Ok(Self { key })
    }

    /// Compressed 33-byte SEC encoding, the form embedded in signed inputs.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.key.serialize().to_vec()
    }

    /// Locking hash of this key: RIPEMD160(SHA256(serialized key)).
    pub fn pubkey_hash(&self) -> Hash160 {
        Hash160::hash_sha256(&self.key.serialize())
    }

    pub fn to_address(&self) -> String {
        pubkey_hash_to_address(&self.pubkey_hash())
    }

    /// Checks a compact signature over a content hash. Malformed signatures
    /// verify as false rather than erroring.
    pub fn verify(&self, message: &Hash256, signature: &[u8]) -> bool {
        let secp = Secp256k1::new();

        let message = match Message::from_digest_slice(message.as_bytes()) {
            Ok(m) => m,
            Err(_) => return false,
        };
        let signature = match Signature::from_compact(signature) {
            Ok(s) => s,
            Err(_) => return false,
        };

        secp.verify_ecdsa(&message, &signature, &self.key).is_ok()
    }
}

impl KeyPair {
    pub fn new() -> Self {
        let private_key = PrivateKey::new();
        let public_key = private_key.public_key();

        Self {
            private_key,
            public_key,
        }
    }

    pub fn address(&self) -> String {
        self.public_key.to_address()
    }
}

impl Default for KeyPair {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.key.serialize()))
    }
}

/// Base58check-encodes a locking hash as a spendable address.
pub fn pubkey_hash_to_address(hash: &Hash160) -> String {
    let mut data = Vec::with_capacity(25);
    data.push(ADDRESS_VERSION);
    data.extend_from_slice(hash.as_bytes());

    let checksum = Hash256::double_hash(&data);
    data.extend_from_slice(&checksum.as_bytes()[0..4]);

    bs58::encode(data).into_string()
}

/// Decodes a base58check address back to the locking hash it carries.
pub fn address_to_pubkey_hash(address: &str) -> Result<Hash160> {
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|e| ChainError::Crypto(format!("Invalid address encoding: {}", e)))?;

    if decoded.len() != 25 || decoded[0] != ADDRESS_VERSION {
        return Err(ChainError::Crypto("Invalid address format".to_string()));
    }

    let payload = &decoded[0..21];
    let checksum = &decoded[21..25];
    let hash = Hash256::double_hash(payload);

    if &hash.as_bytes()[0..4] != checksum {
        return Err(ChainError::Crypto("Invalid address checksum".to_string()));
    }

    Hash160::from_slice(&decoded[1..21])
        .ok_or_else(|| ChainError::Crypto("Invalid address payload".to_string()))
}

pub fn is_valid_address(address: &str) -> bool {
    address_to_pubkey_hash(address).is_ok()
}
