use crate::chain::ChainProvider;
use crate::error::PoolError;
use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, TxHash, B256, U256};
use alloy::providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use std::time::Duration;
use url::Url;

alloy::sol! {
    #[sol(rpc)]
    interface IAccessControl {
        function hasRole(bytes32 role, address account) external view returns (bool);
        function grantRole(bytes32 role, address account) external;
    }
}

const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// JSON-RPC chain access over HTTP
pub struct RpcChain {
    url: Url,
    reader: DynProvider,
    confirmation_timeout: Duration,
}

impl RpcChain {
    pub fn new(url: Url) -> Self {
        let reader = ProviderBuilder::new().connect_http(url.clone()).erased();

        Self {
            url,
            reader,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }

    /// How long `wait_for_confirmation` waits for a receipt before failing.
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Provider that fills nonce, gas and chain id and signs with `signer`.
    fn sending_provider(&self, signer: &PrivateKeySigner) -> DynProvider {
        ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer.clone()))
            .connect_http(self.url.clone())
            .erased()
    }
}

impl ChainProvider for RpcChain {
    async fn balance(&self, address: Address) -> Result<U256, PoolError> {
        self.reader
            .get_balance(address)
            .await
            .map_err(|e| PoolError::Rpc(format!("Balance query for {address} failed: {e}")))
    }

    async fn transfer(
        &self,
        from: &PrivateKeySigner,
        to: Address,
        value: U256,
    ) -> Result<TxHash, PoolError> {
        let tx = TransactionRequest::default().with_to(to).with_value(value);
        let pending = self
            .sending_provider(from)
            .send_transaction(tx)
            .await
            .map_err(|e| {
                PoolError::Transaction(format!(
                    "Transfer from {} to {to} rejected: {e}",
                    from.address()
                ))
            })?;

        Ok(*pending.tx_hash())
    }

    async fn wait_for_confirmation(&self, tx: TxHash) -> Result<(), PoolError> {
        let receipt = PendingTransactionBuilder::new(self.reader.root().clone(), tx)
            .with_timeout(Some(self.confirmation_timeout))
            .get_receipt()
            .await
            .map_err(|e| PoolError::Transaction(format!("No receipt for {tx}: {e}")))?;

        if !receipt.status() {
            return Err(PoolError::Transaction(format!("Transaction {tx} reverted")));
        }
        Ok(())
    }

    async fn has_role(
        &self,
        contract: Address,
        role: B256,
        account: Address,
    ) -> Result<bool, PoolError> {
        IAccessControl::new(contract, self.reader.clone())
            .hasRole(role, account)
            .call()
            .await
            .map_err(|e| PoolError::Rpc(format!("hasRole({role}, {account}) failed: {e}")))
    }

    async fn grant_role(
        &self,
        admin: &PrivateKeySigner,
        contract: Address,
        role: B256,
        account: Address,
    ) -> Result<TxHash, PoolError> {
        let pending = IAccessControl::new(contract, self.sending_provider(admin))
            .grantRole(role, account)
            .send()
            .await
            .map_err(|e| {
                PoolError::Transaction(format!("grantRole({role}, {account}) rejected: {e}"))
            })?;

        Ok(*pending.tx_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_without_connecting() {
        let url: Url = "http://127.0.0.1:8545".parse().unwrap();
        let chain = RpcChain::new(url.clone()).with_confirmation_timeout(Duration::from_secs(5));
        assert_eq!(chain.url(), &url);
        assert_eq!(chain.confirmation_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unreachable_node_surfaces_rpc_error() {
        // Port 9 (discard) is closed on test machines
        let chain = RpcChain::new("http://127.0.0.1:9".parse().unwrap());
        let err = chain.balance(Address::ZERO).await.unwrap_err();
        assert!(matches!(err, PoolError::Rpc(_)), "got {err:?}");
    }
}
