//! The signing pool.
//!
//! A fixed set of slots, each owning one signer derived from the pool seed.
//! [`SigningPool::with_signer`] hands a caller exclusive use of one idle slot,
//! topped up from the reserve first when its balance is below the low-water
//! mark, and releases the slot once the caller's future settles. Callbacks on
//! different slots run concurrently; callbacks on the same slot never overlap.

mod replenish;
mod slots;

pub use replenish::ReplenishPolicy;
pub use slots::{PoolStatus, SlotInfo, SlotState};

use crate::chain::ChainProvider;
use crate::error::PoolError;
use crate::keys::{derive_slot_signers, role_id, Seed};
use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use replenish::Replenisher;
use slots::SlotTable;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

/// Role granted to slot signers when none is set with [`SigningPool::with_role`].
pub const DEFAULT_SLOT_ROLE: &str = "MINTER_ROLE";

/// Everything a pool needs besides its chain access
#[derive(Clone, Debug)]
pub struct PoolOptions {
    pub max_size: usize,
    pub seed: Seed,
    pub replenish: ReplenishPolicy,
}

/// Role every slot must hold on an access-control contract before use
#[derive(Clone, Debug)]
struct RoleBinding {
    admin: PrivateKeySigner,
    contract: Address,
    role: B256,
}

/// The signer of one slot, as handed to a [`SigningPool::with_signer`] callback.
#[derive(Clone, Debug)]
pub struct SlotSigner {
    index: usize,
    signer: PrivateKeySigner,
}

impl SlotSigner {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    pub fn into_signer(self) -> PrivateKeySigner {
        self.signer
    }
}

pub struct SigningPool<C> {
    chain: C,
    seed: Seed,
    slots: SlotTable,
    replenisher: Replenisher,
    binding: Option<RoleBinding>,
    // Success and failure are both memoised; a failed initialisation is final
    signers: OnceCell<Result<Vec<PrivateKeySigner>, Arc<PoolError>>>,
}

impl<C: ChainProvider> SigningPool<C> {
    pub fn new(options: PoolOptions, chain: C) -> Result<Self, PoolError> {
        if options.max_size == 0 {
            return Err(PoolError::Config("max_size must be at least 1".into()));
        }

        Ok(Self {
            chain,
            seed: options.seed,
            slots: SlotTable::new(options.max_size),
            replenisher: Replenisher::new(options.replenish),
            binding: None,
            signers: OnceCell::new(),
        })
    }

    /// Pool whose slot signers are granted [`DEFAULT_SLOT_ROLE`] on `contract`
    /// during initialisation, signed by `admin`. Slots that already hold the
    /// role (same seed as an earlier run) are not granted again.
    pub fn from_access_control_contract(
        admin: PrivateKeySigner,
        contract: Address,
        options: PoolOptions,
        chain: C,
    ) -> Result<Self, PoolError> {
        let mut pool = Self::new(options, chain)?;
        pool.binding = Some(RoleBinding {
            admin,
            contract,
            role: role_id(DEFAULT_SLOT_ROLE),
        });
        Ok(pool)
    }

    /// Grant `role` instead of the default. No effect on pools built with
    /// [`SigningPool::new`].
    pub fn with_role(mut self, role: B256) -> Self {
        if let Some(binding) = self.binding.as_mut() {
            binding.role = role;
        }
        self
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn replenish_policy(&self) -> &ReplenishPolicy {
        self.replenisher.policy()
    }

    /// Readiness barrier. The first call derives every slot signer and, for
    /// access-control pools, confirms the role grants; concurrent and later
    /// calls share that single run and its outcome.
    pub async fn initialise(&self) -> Result<(), PoolError> {
        self.signers().await.map(|_| ())
    }

    /// Slot addresses in index order, initialising the pool if needed.
    pub async fn addresses(&self) -> Result<Vec<Address>, PoolError> {
        Ok(self.signers().await?.iter().map(|s| s.address()).collect())
    }

    pub fn status(&self) -> PoolStatus {
        let addresses: Option<Vec<Address>> = match self.signers.get() {
            Some(Ok(signers)) => Some(signers.iter().map(|s| s.address()).collect()),
            _ => None,
        };
        self.slots.snapshot(addresses.as_deref())
    }

    /// Run `f` with exclusive use of one slot.
    ///
    /// Waits for an idle slot, tops it up from the reserve if it is below the
    /// low-water mark, then calls `f`. The slot is released when `f`'s future
    /// settles, when any step before it fails, or when this future is dropped.
    /// Pool failures are converted into `E`; errors from `f` are returned as is.
    pub async fn with_signer<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(SlotSigner) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<PoolError>,
    {
        let signers = self.signers().await?;
        let lease = self.slots.acquire().await?;
        let index = lease.index();
        let signer = signers[index].clone();

        if self
            .replenisher
            .ensure_funded(&self.chain, index, signer.address())
            .await?
        {
            lease.record_top_up();
        }

        debug!(slot = index, address = %signer.address(), "Running callback");
        let result = f(SlotSigner { index, signer }).await;
        drop(lease);
        result
    }

    async fn signers(&self) -> Result<&[PrivateKeySigner], PoolError> {
        let outcome = self
            .signers
            .get_or_init(|| async {
                self.run_initialisation().await.map_err(|e| {
                    error!("Signing pool initialisation failed: {e}");
                    Arc::new(e)
                })
            })
            .await;

        match outcome {
            Ok(signers) => Ok(signers.as_slice()),
            Err(cause) => Err(PoolError::Initialisation(Arc::clone(cause))),
        }
    }

    async fn run_initialisation(&self) -> Result<Vec<PrivateKeySigner>, PoolError> {
        info!(size = self.size(), "Deriving slot signers");
        let signers = derive_slot_signers(&self.seed, self.size())?;

        if let Some(binding) = &self.binding {
            self.grant_roles(binding, &signers).await?;
        }

        info!(size = signers.len(), "Signing pool ready");
        Ok(signers)
    }

    /// Grants are sent one at a time from the admin account, each confirmed
    /// before the next, keeping the admin nonce sequence linear.
    async fn grant_roles(
        &self,
        binding: &RoleBinding,
        signers: &[PrivateKeySigner],
    ) -> Result<(), PoolError> {
        let RoleBinding {
            admin,
            contract,
            role,
        } = binding;

        for (index, signer) in signers.iter().enumerate() {
            let account = signer.address();
            let wrap = |e: PoolError| PoolError::RoleGrant {
                account: account.to_string(),
                source: Box::new(e),
            };

            if self
                .chain
                .has_role(*contract, *role, account)
                .await
                .map_err(&wrap)?
            {
                debug!(slot = index, %account, "Role already granted");
                continue;
            }

            let tx = self
                .chain
                .grant_role(admin, *contract, *role, account)
                .await
                .map_err(&wrap)?;
            self.chain
                .wait_for_confirmation(tx)
                .await
                .map_err(&wrap)?;
            info!(slot = index, %account, %tx, "Role granted to slot signer");
        }
        Ok(())
    }
}
