#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod protocol;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const BLAKE3_HASH_SIZE: usize = 32;

pub const ETH_ADDRESS_SIZE: usize = 20;

pub const ECDSA_SIGNATURE_SIZE: usize = 65;

/// Lifetime of an issued handshake challenge.
pub const CHALLENGE_TTL_SECS: i64 = 60;

/// Validity window for an authenticated node record and its session token.
pub const NODE_VALIDITY_SECS: i64 = 86_400;

/// Capabilities every registered node is granted.
pub const NODE_CAPABILITIES: &[&str] = &["cache", "relay", "receive"];

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type PulseResult<T> = Result<T, PulseError>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blake3Hash(pub [u8; BLAKE3_HASH_SIZE]);

impl Blake3Hash {
    pub fn from_bytes(bytes: [u8; BLAKE3_HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BLAKE3_HASH_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> PulseResult<Self> {
        let bytes = hex::decode(s).map_err(|e| PulseError::Crypto(e.to_string()))?;
        if bytes.len() != BLAKE3_HASH_SIZE {
            return Err(PulseError::Crypto("Invalid hash length".into()));
        }
        let mut arr = [0u8; BLAKE3_HASH_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn zero() -> Self {
        Self([0u8; BLAKE3_HASH_SIZE])
    }
}

impl fmt::Debug for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blake3Hash({})", self.to_hex())
    }
}

impl fmt::Display for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Blake3Hash {
    fn default() -> Self {
        Self::zero()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EthAddress(pub [u8; ETH_ADDRESS_SIZE]);

impl EthAddress {
    pub fn from_bytes(bytes: [u8; ETH_ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ETH_ADDRESS_SIZE] {
        &self.0
    }

    pub fn to_checksum(&self) -> String {
        let hex_addr = hex::encode(self.0);
        let hash = blake3::hash(hex_addr.as_bytes());
        let hash_hex = hex::encode(hash.as_bytes());

        let mut checksummed = String::with_capacity(42);
        checksummed.push_str("0x");

        for (i, c) in hex_addr.chars().enumerate() {
            if c.is_ascii_alphabetic() {
                let hash_char = hash_hex.chars().nth(i).unwrap_or('0');
                if hash_char >= '8' {
                    checksummed.push(c.to_ascii_uppercase());
                } else {
                    checksummed.push(c.to_ascii_lowercase());
                }
            } else {
                checksummed.push(c);
            }
        }
        checksummed
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> PulseResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| PulseError::InvalidAddress(e.to_string()))?;
        if bytes.len() != ETH_ADDRESS_SIZE {
            return Err(PulseError::InvalidAddress("Invalid address length".into()));
        }
        let mut arr = [0u8; ETH_ADDRESS_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn zero() -> Self {
        Self([0u8; ETH_ADDRESS_SIZE])
    }
}

impl fmt::Debug for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthAddress({})", self.to_checksum())
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_checksum())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EcdsaSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl EcdsaSignature {
    pub fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    pub fn to_bytes(&self) -> [u8; ECDSA_SIGNATURE_SIZE] {
        let mut bytes = [0u8; ECDSA_SIGNATURE_SIZE];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    pub fn from_bytes(bytes: &[u8; ECDSA_SIGNATURE_SIZE]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Self {
            r,
            s,
            v: bytes[64],
        }
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    pub fn from_hex(s: &str) -> PulseResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| PulseError::InvalidSignature(e.to_string()))?;
        if bytes.len() != ECDSA_SIGNATURE_SIZE {
            return Err(PulseError::InvalidSignature("Invalid signature length".into()));
        }
        let mut arr = [0u8; ECDSA_SIGNATURE_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self::from_bytes(&arr))
    }
}

impl fmt::Debug for EcdsaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EcdsaSignature(v={})", self.v)
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn generate() -> Self {
        Self(format!("pulse_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
