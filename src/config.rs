//! File-based pool configuration.
//!
//! Private keys never live in the file; it names the environment variables
//! that hold them.

use crate::chain::RpcChain;
use crate::error::PoolError;
use crate::keys::{parse_role, Seed};
use crate::pool::{PoolOptions, ReplenishPolicy, SigningPool, DEFAULT_SLOT_ROLE};
use alloy::primitives::{utils::parse_ether, Address, U256};
use alloy::signers::local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

fn default_max_size() -> usize {
    4
}

fn default_reserve_key_env() -> String {
    "ASPEN_RESERVE_KEY".to_string()
}

fn default_admin_key_env() -> String {
    "ASPEN_ADMIN_KEY".to_string()
}

fn default_role() -> String {
    DEFAULT_SLOT_ROLE.to_string()
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

/// Signing pool settings from `~/.aspen/signing-pool.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub rpc_url: Url,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    pub seed: Seed,
    #[serde(default = "default_reserve_key_env")]
    pub reserve_key_env: String,
    /// Ether amount, e.g. `"0.1"`
    pub top_up: String,
    /// Ether amount, e.g. `"0.001"`
    pub low_water: String,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default)]
    pub access_control: Option<AccessControlConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControlConfig {
    pub contract: Address,
    #[serde(default = "default_admin_key_env")]
    pub admin_key_env: String,
    /// Role name such as `MINTER_ROLE`, or a literal `0x` 32-byte role id
    #[serde(default = "default_role")]
    pub role: String,
}

impl PoolConfig {
    pub fn default_path() -> Result<PathBuf, PoolError> {
        Ok(dirs::home_dir()
            .ok_or_else(|| PoolError::Config("No home dir".into()))?
            .join(".aspen")
            .join("signing-pool.json"))
    }

    pub fn load(path: &Path) -> Result<Self, PoolError> {
        if !path.exists() {
            return Err(PoolError::Config(format!(
                "Config file {} not found",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        let config: PoolConfig = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::info!("Loaded signing pool config from {}", path.display());
        Ok(config)
    }

    pub fn load_default() -> Result<Self, PoolError> {
        Self::load(&Self::default_path()?)
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_size == 0 {
            return Err(PoolError::Config("max_size must be at least 1".into()));
        }
        let (top_up, low_water) = self.amounts()?;
        if top_up.is_zero() {
            return Err(PoolError::Config("top_up must be greater than zero".into()));
        }
        if top_up < low_water {
            return Err(PoolError::Config(format!(
                "top_up {} is below low_water {}",
                self.top_up, self.low_water
            )));
        }
        if let Some(ac) = &self.access_control {
            parse_role(&ac.role)?;
        }
        Ok(())
    }

    /// `(top_up, low_water)` in wei
    pub fn amounts(&self) -> Result<(U256, U256), PoolError> {
        Ok((
            parse_amount("top_up", &self.top_up)?,
            parse_amount("low_water", &self.low_water)?,
        ))
    }

    pub fn pool_options(&self) -> Result<PoolOptions, PoolError> {
        let (top_up, low_water) = self.amounts()?;
        let reserve = signer_from_env(&self.reserve_key_env)?;
        Ok(PoolOptions {
            max_size: self.max_size,
            seed: self.seed,
            replenish: ReplenishPolicy::new(reserve, top_up, low_water)?,
        })
    }

    pub fn chain(&self) -> RpcChain {
        RpcChain::new(self.rpc_url.clone())
            .with_confirmation_timeout(Duration::from_secs(self.confirmation_timeout_secs))
    }

    /// Pool over JSON-RPC, bound to the access-control contract when one is
    /// configured. Nothing is sent until the pool is first used.
    pub fn build_pool(&self) -> Result<SigningPool<RpcChain>, PoolError> {
        let options = self.pool_options()?;
        let chain = self.chain();

        match &self.access_control {
            None => SigningPool::new(options, chain),
            Some(ac) => {
                let admin = signer_from_env(&ac.admin_key_env)?;
                Ok(
                    SigningPool::from_access_control_contract(admin, ac.contract, options, chain)?
                        .with_role(parse_role(&ac.role)?),
                )
            }
        }
    }
}

fn parse_amount(field: &str, value: &str) -> Result<U256, PoolError> {
    parse_ether(value.trim())
        .map_err(|e| PoolError::Config(format!("Invalid {field} amount {value:?}: {e}")))
}

fn signer_from_env(var: &str) -> Result<PrivateKeySigner, PoolError> {
    let key = std::env::var(var)
        .map_err(|_| PoolError::Config(format!("Environment variable {var} is not set")))?;
    key.trim()
        .parse::<PrivateKeySigner>()
        .map_err(|e| PoolError::Config(format!("{var} does not hold a private key: {e}")))
}
