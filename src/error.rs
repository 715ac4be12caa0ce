use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("Transaction failed: {0}")]
    Transaction(String),
    #[error("Top-up of slot {slot} failed: {source}")]
    TopUp {
        slot: usize,
        #[source]
        source: Box<PoolError>,
    },
    #[error("Role grant for {account} failed: {source}")]
    RoleGrant {
        account: String,
        #[source]
        source: Box<PoolError>,
    },
    #[error("Pool initialisation failed: {0}")]
    Initialisation(#[source] Arc<PoolError>),
    #[error("Callback failed: {0}")]
    Callback(String),
    #[error("Free permit but no idle slot")]
    NoIdleSlot,
    #[error("Slot table closed")]
    Closed(#[from] tokio::sync::AcquireError),
}

impl PoolError {
    /// True for errors raised while topping up a slot from the reserve.
    pub fn is_top_up(&self) -> bool {
        matches!(self, PoolError::TopUp { .. })
    }
}

// Status snapshots and config reports carry errors as plain strings
impl Serialize for PoolError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
