//! Pool of funded transaction signers for Aspen contracts.
//!
//! A [`SigningPool`] owns a fixed number of slots, each with a signer derived
//! from the pool seed. [`SigningPool::with_signer`] lends one idle slot to a
//! caller at a time, topping its balance up from a reserve account when it has
//! run low. Pools built with [`SigningPool::from_access_control_contract`]
//! also grant every slot a role on the contract before first use.

pub mod chain;
pub mod config;
mod error;
pub mod keys;
pub mod pool;

pub use chain::{ChainProvider, MemoryChain, RpcChain};
pub use config::{AccessControlConfig, PoolConfig};
pub use error::PoolError;
pub use keys::{derive_slot_addresses, parse_role, role_id, Seed};
pub use pool::{
    PoolOptions, PoolStatus, ReplenishPolicy, SigningPool, SlotInfo, SlotSigner, SlotState,
    DEFAULT_SLOT_ROLE,
};
