//! Deterministic slot key material.
//!
//! Every slot signer is derived from the pool seed and the slot index, so a
//! pool rebuilt with the same seed comes back with the same addresses and any
//! roles granted to them on-chain stay valid across restarts.

use crate::error::PoolError;
use alloy::primitives::{keccak256, hex, Address, B256};
use alloy::signers::local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain tag mixed into every derivation so pool keys never collide with
/// other keys produced from the same seed.
const DERIVATION_TAG: &[u8] = b"aspen-signing-pool";

/// Upper bound on re-hash attempts for a digest that is not a valid scalar.
const MAX_DERIVATION_ATTEMPTS: u32 = 16;

/// 32 bytes of seed material for a signing pool.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Seed(B256);

impl Seed {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(B256::new(bytes))
    }

    /// Fresh random seed for pools whose identities need not survive a restart.
    pub fn random() -> Self {
        Self(PrivateKeySigner::random().to_bytes())
    }

    /// Parse a `0x`-prefixed (or bare) 64 character hex string.
    pub fn from_hex(s: &str) -> Result<Self, PoolError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| PoolError::Config(format!("Invalid seed hex: {e}")))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            PoolError::Config(format!("Seed must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Self::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }
}

// Never print seed material
impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(..)")
    }
}

impl TryFrom<String> for Seed {
    type Error = PoolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Seed> for String {
    fn from(seed: Seed) -> Self {
        hex::encode_prefixed(seed.as_bytes())
    }
}

/// Derive the signer for slot `index` of a pool seeded with `seed`.
pub fn derive_slot_signer(seed: &Seed, index: usize) -> Result<PrivateKeySigner, PoolError> {
    let index = u32::try_from(index)
        .map_err(|_| PoolError::KeyDerivation(format!("Slot index {index} out of range")))?;

    for attempt in 0..MAX_DERIVATION_ATTEMPTS {
        let mut preimage = Vec::with_capacity(32 + DERIVATION_TAG.len() + 8);
        preimage.extend_from_slice(seed.as_bytes());
        preimage.extend_from_slice(DERIVATION_TAG);
        preimage.extend_from_slice(&index.to_be_bytes());
        preimage.extend_from_slice(&attempt.to_be_bytes());

        // Zero or >= the curve order is rejected; hash again with the next attempt
        if let Ok(signer) = PrivateKeySigner::from_bytes(&keccak256(&preimage)) {
            return Ok(signer);
        }
    }

    Err(PoolError::KeyDerivation(format!(
        "No valid key for slot {index} after {MAX_DERIVATION_ATTEMPTS} attempts"
    )))
}

/// Derive the signers for slots `0..size` in index order.
pub fn derive_slot_signers(seed: &Seed, size: usize) -> Result<Vec<PrivateKeySigner>, PoolError> {
    (0..size).map(|i| derive_slot_signer(seed, i)).collect()
}

/// Addresses of the signers `derive_slot_signers` would produce.
pub fn derive_slot_addresses(seed: &Seed, size: usize) -> Result<Vec<Address>, PoolError> {
    Ok(derive_slot_signers(seed, size)?
        .iter()
        .map(|s| s.address())
        .collect())
}

/// OpenZeppelin `AccessControl` role identifier for a role name.
pub fn role_id(name: &str) -> B256 {
    match name {
        "DEFAULT_ADMIN_ROLE" => B256::ZERO,
        other => keccak256(other.as_bytes()),
    }
}

/// Role identifier from a config value: a `0x`-prefixed 32-byte hex id is
/// taken as is, anything else is a role name passed to [`role_id`].
pub fn parse_role(value: &str) -> Result<B256, PoolError> {
    let value = value.trim();
    if value.starts_with("0x") || value.starts_with("0X") {
        return value
            .parse::<B256>()
            .map_err(|e| PoolError::Config(format!("Invalid role id {value:?}: {e}")));
    }
    Ok(role_id(value))
}
