mod error;
mod inventory;
mod ledger;
mod mutations;
mod queries;

pub use error::EngineError;
pub use inventory::Inventory;
pub use ledger::BookingLedger;

use tokio::sync::{Mutex, MutexGuard};

use crate::catalog::Catalog;

/// Everything the critical section protects. Catalogue and ledger share
/// one guard so `capacity - available == Σ holdings` is never observed torn.
#[derive(Debug)]
pub struct LedgerState {
    pub inventory: Inventory,
    pub ledger: BookingLedger,
}

/// The inventory ledger core.
///
/// Every operation, reads included, runs under a single process-wide
/// exclusive lock. Nothing awaits while the guard is held, and no operation
/// re-enters the engine, so an operation's effects are all-or-nothing with
/// respect to every other caller.
pub struct Engine {
    state: Mutex<LedgerState>,
}

impl Engine {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                inventory: Inventory::new(catalog),
                ledger: BookingLedger::new(),
            }),
        }
    }

    /// Acquire the critical section.
    pub(super) async fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().await
    }
}
