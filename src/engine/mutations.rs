use crate::model::Holding;

use super::{Engine, EngineError};

impl Engine {
    /// Reserve one seat on `trip_id` for `caller`.
    ///
    /// On failure neither availability nor the ledger changes.
    pub async fn book(&self, caller: &str, trip_id: &str) -> Result<Holding, EngineError> {
        debug_assert!(!caller.is_empty(), "caller id must be non-empty");
        debug_assert!(!trip_id.is_empty(), "trip id must be non-empty");

        let mut guard = self.lock().await;
        guard.inventory.reserve(trip_id)?;
        let count = guard.ledger.credit(caller, trip_id);
        Ok(Holding {
            trip_id: trip_id.to_string(),
            count,
        })
    }

    /// Give back one seat `caller` holds on `trip_id`. Returns what the
    /// caller still holds there; a zero count means the holding is gone.
    pub async fn cancel(&self, caller: &str, trip_id: &str) -> Result<Holding, EngineError> {
        debug_assert!(!caller.is_empty(), "caller id must be non-empty");
        debug_assert!(!trip_id.is_empty(), "trip id must be non-empty");

        let mut guard = self.lock().await;
        if !guard.inventory.contains(trip_id) {
            return Err(EngineError::NotFound(trip_id.to_string()));
        }
        if guard.ledger.held(caller, trip_id) == 0 {
            return Err(EngineError::NoHolding {
                caller: caller.to_string(),
                trip_id: trip_id.to_string(),
            });
        }

        // Release first: it is the only step left that can refuse, and the
        // ledger must stay untouched if it does.
        guard.inventory.release(trip_id)?;
        let count = guard.ledger.debit(caller, trip_id)?;
        Ok(Holding {
            trip_id: trip_id.to_string(),
            count,
        })
    }
}
