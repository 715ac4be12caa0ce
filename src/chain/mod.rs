//! Chain access consumed by the signing pool.
//!
//! The pool never talks to a node directly. It needs balance reads, value
//! transfers with a separate confirmation wait, and (for pools bound to an
//! access-control contract) role checks and grants. [`rpc::RpcChain`] serves
//! these over JSON-RPC; [`memory::MemoryChain`] simulates them in-process.

pub mod memory;
pub mod rpc;

use crate::error::PoolError;
use alloy::primitives::{Address, TxHash, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use std::future::Future;
use std::sync::Arc;

pub use memory::MemoryChain;
pub use rpc::RpcChain;

pub trait ChainProvider: Send + Sync {
    /// Native-currency balance of `address` at the latest block.
    fn balance(&self, address: Address) -> impl Future<Output = Result<U256, PoolError>> + Send;

    /// Submit a plain value transfer signed by `from`. Resolves once the node
    /// has accepted the transaction, not when it is mined.
    fn transfer(
        &self,
        from: &PrivateKeySigner,
        to: Address,
        value: U256,
    ) -> impl Future<Output = Result<TxHash, PoolError>> + Send;

    /// Wait until `tx` is mined. A reverted transaction is an error.
    fn wait_for_confirmation(&self, tx: TxHash)
        -> impl Future<Output = Result<(), PoolError>> + Send;

    /// `hasRole(role, account)` on an `AccessControl` contract.
    fn has_role(
        &self,
        contract: Address,
        role: B256,
        account: Address,
    ) -> impl Future<Output = Result<bool, PoolError>> + Send;

    /// Submit `grantRole(role, account)` signed by `admin`.
    fn grant_role(
        &self,
        admin: &PrivateKeySigner,
        contract: Address,
        role: B256,
        account: Address,
    ) -> impl Future<Output = Result<TxHash, PoolError>> + Send;
}

impl<T: ChainProvider> ChainProvider for Arc<T> {
    fn balance(&self, address: Address) -> impl Future<Output = Result<U256, PoolError>> + Send {
        (**self).balance(address)
    }

    fn transfer(
        &self,
        from: &PrivateKeySigner,
        to: Address,
        value: U256,
    ) -> impl Future<Output = Result<TxHash, PoolError>> + Send {
        (**self).transfer(from, to, value)
    }

    fn wait_for_confirmation(
        &self,
        tx: TxHash,
    ) -> impl Future<Output = Result<(), PoolError>> + Send {
        (**self).wait_for_confirmation(tx)
    }

    fn has_role(
        &self,
        contract: Address,
        role: B256,
        account: Address,
    ) -> impl Future<Output = Result<bool, PoolError>> + Send {
        (**self).has_role(contract, role, account)
    }

    fn grant_role(
        &self,
        admin: &PrivateKeySigner,
        contract: Address,
        role: B256,
        account: Address,
    ) -> impl Future<Output = Result<TxHash, PoolError>> + Send {
        (**self).grant_role(admin, contract, role, account)
    }
}
