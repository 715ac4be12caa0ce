use crate::chain::ChainProvider;
use crate::error::PoolError;
use alloy::primitives::{utils::format_ether, Address, U256};
use alloy::signers::local::PrivateKeySigner;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How slots are kept funded.
#[derive(Clone, Debug)]
pub struct ReplenishPolicy {
    /// Funded account that pays for every top-up
    pub reserve: PrivateKeySigner,
    /// Amount sent to a slot that has dropped below `low_water`
    pub top_up: U256,
    pub low_water: U256,
}

impl ReplenishPolicy {
    pub fn new(reserve: PrivateKeySigner, top_up: U256, low_water: U256) -> Result<Self, PoolError> {
        if top_up.is_zero() {
            return Err(PoolError::Config("top_up must be greater than zero".into()));
        }
        if top_up < low_water {
            return Err(PoolError::Config(format!(
                "top_up ({} ETH) is below low_water ({} ETH); a topped-up slot would still be depleted",
                format_ether(top_up),
                format_ether(low_water)
            )));
        }
        Ok(Self {
            reserve,
            top_up,
            low_water,
        })
    }
}

/// Applies a [`ReplenishPolicy`]. Every send from the reserve goes through
/// one lock, held from submission until confirmation, so the reserve's nonce
/// sequence is never contended even when several slots run dry together.
pub(crate) struct Replenisher {
    policy: ReplenishPolicy,
    reserve_lock: Mutex<()>,
}

impl Replenisher {
    pub(crate) fn new(policy: ReplenishPolicy) -> Self {
        Self {
            policy,
            reserve_lock: Mutex::new(()),
        }
    }

    pub(crate) fn policy(&self) -> &ReplenishPolicy {
        &self.policy
    }

    /// Top up `address` if it is below the low-water mark. Returns whether a
    /// top-up was sent and confirmed.
    pub(crate) async fn ensure_funded<C: ChainProvider>(
        &self,
        chain: &C,
        slot: usize,
        address: Address,
    ) -> Result<bool, PoolError> {
        let balance = chain.balance(address).await?;
        if balance >= self.policy.low_water {
            debug!(slot, balance = %format_ether(balance), "Slot balance above low water");
            return Ok(false);
        }

        let _reserve = self.reserve_lock.lock().await;
        info!(
            slot,
            %address,
            balance = %format_ether(balance),
            amount = %format_ether(self.policy.top_up),
            "Topping up slot from reserve"
        );

        let wrap = |e: PoolError| {
            warn!(slot, "Top-up failed: {e}");
            PoolError::TopUp {
                slot,
                source: Box::new(e),
            }
        };

        let tx = chain
            .transfer(&self.policy.reserve, address, self.policy.top_up)
            .await
            .map_err(&wrap)?;
        chain.wait_for_confirmation(tx).await.map_err(&wrap)?;

        info!(slot, %tx, "Top-up confirmed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryChain;
    use alloy::primitives::utils::parse_ether;

    fn policy(chain: &MemoryChain) -> ReplenishPolicy {
        let reserve = PrivateKeySigner::random();
        chain.set_balance(reserve.address(), parse_ether("1").unwrap());
        ReplenishPolicy::new(
            reserve,
            parse_ether("0.1").unwrap(),
            parse_ether("0.001").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_zero_or_undersized_top_up() {
        let reserve = PrivateKeySigner::random();
        assert!(ReplenishPolicy::new(reserve.clone(), U256::ZERO, U256::ZERO).is_err());
        assert!(ReplenishPolicy::new(reserve, U256::from(1), U256::from(2)).is_err());
    }

    #[tokio::test]
    async fn tops_up_depleted_slot_once() {
        let chain = MemoryChain::new();
        let replenisher = Replenisher::new(policy(&chain));
        let slot = Address::repeat_byte(0xab);

        assert!(replenisher.ensure_funded(&chain, 0, slot).await.unwrap());
        assert_eq!(chain.balance_of(slot), parse_ether("0.1").unwrap());

        // Now above low water
        assert!(!replenisher.ensure_funded(&chain, 0, slot).await.unwrap());
        let reserve = replenisher.policy().reserve.address();
        assert_eq!(chain.transfers_from(reserve).len(), 1);
    }

    #[tokio::test]
    async fn funded_slot_is_left_alone() {
        let chain = MemoryChain::new();
        let replenisher = Replenisher::new(policy(&chain));
        let slot = Address::repeat_byte(0xcd);
        chain.set_balance(slot, parse_ether("0.001").unwrap());

        assert!(!replenisher.ensure_funded(&chain, 2, slot).await.unwrap());
        assert!(chain.transactions().is_empty());
    }

    #[tokio::test]
    async fn confirmation_failure_is_a_top_up_error() {
        let chain = MemoryChain::new();
        let replenisher = Replenisher::new(policy(&chain));
        chain.fail_confirmations(true);

        let err = replenisher
            .ensure_funded(&chain, 1, Address::repeat_byte(0xef))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::TopUp { slot: 1, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn balance_query_failure_is_not_wrapped() {
        let chain = MemoryChain::new();
        let replenisher = Replenisher::new(policy(&chain));
        chain.fail_balance_queries(true);

        let err = replenisher
            .ensure_funded(&chain, 0, Address::repeat_byte(0x01))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Rpc(_)));
        assert!(chain.transactions().is_empty());
    }
}
