use crate::error::PoolError;
use alloy::primitives::Address;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    #[default]
    Idle,
    InUse,
}

#[derive(Debug, Default)]
struct SlotEntry {
    state: SlotState,
    uses: u64,
    top_ups: u64,
}

/// Point-in-time view of one slot
#[derive(Debug, Clone, Serialize)]
pub struct SlotInfo {
    pub index: usize,
    /// `None` until the pool has derived its signers
    pub address: Option<Address>,
    pub state: SlotState,
    pub uses: u64,
    /// Top-ups whose transfer was confirmed. A transfer that landed without a
    /// receipt (confirmation timed out) is not counted.
    pub top_ups: u64,
}

/// Point-in-time view of the whole pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub slots: Vec<SlotInfo>,
    pub total: usize,
    pub active: usize,
    pub idle: usize,
}

/// Slot state table.
///
/// The semaphore holds one permit per idle slot. A caller first waits for a
/// permit (waiters are queued FIFO), then claims the lowest-indexed idle slot
/// while holding the table lock. Nothing awaits between the scan and the
/// claim, so two callers can never pick the same slot.
pub(crate) struct SlotTable {
    entries: Mutex<Vec<SlotEntry>>,
    idle: Semaphore,
}

impl SlotTable {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            entries: Mutex::new((0..size).map(|_| SlotEntry::default()).collect()),
            idle: Semaphore::new(size),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    /// Wait for an idle slot and claim it.
    pub(crate) async fn acquire(&self) -> Result<SlotLease<'_>, PoolError> {
        let permit = self.idle.acquire().await?;

        let index = {
            let mut entries = self.entries();
            // One permit is outstanding per claimed slot, so a permit in hand
            // means at least one entry is idle.
            let (index, entry) = entries
                .iter_mut()
                .enumerate()
                .find(|(_, e)| e.state == SlotState::Idle)
                .ok_or(PoolError::NoIdleSlot)?;
            entry.state = SlotState::InUse;
            entry.uses += 1;
            index
        };

        debug!(slot = index, "Slot claimed");
        Ok(SlotLease {
            table: self,
            index,
            _permit: permit,
        })
    }

    pub(crate) fn snapshot(&self, addresses: Option<&[Address]>) -> PoolStatus {
        let entries = self.entries();
        let slots: Vec<SlotInfo> = entries
            .iter()
            .enumerate()
            .map(|(index, e)| SlotInfo {
                index,
                address: addresses.and_then(|a| a.get(index).copied()),
                state: e.state,
                uses: e.uses,
                top_ups: e.top_ups,
            })
            .collect();

        let total = slots.len();
        let active = slots
            .iter()
            .filter(|s| s.state == SlotState::InUse)
            .count();

        PoolStatus {
            slots,
            total,
            active,
            idle: total - active,
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<SlotEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive claim on one slot. Dropping the lease marks the slot idle and
/// then returns its permit, whatever the holder's outcome.
pub(crate) struct SlotLease<'a> {
    table: &'a SlotTable,
    index: usize,
    _permit: SemaphorePermit<'a>,
}

impl SlotLease<'_> {
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn record_top_up(&self) {
        self.table.entries()[self.index].top_ups += 1;
    }
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        self.table.entries()[self.index].state = SlotState::Idle;
        debug!(slot = self.index, "Slot released");
        // `_permit` is dropped after this, once the slot is already idle
    }
}
