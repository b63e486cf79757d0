use std::collections::HashMap;

use crate::model::Holding;

use super::EngineError;

/// caller id → trip id → seats held.
///
/// Neither level ever keeps an empty entry: a holding is dropped when its
/// count reaches zero and a caller is dropped with its last holding.
#[derive(Debug, Default)]
pub struct BookingLedger {
    callers: HashMap<String, HashMap<String, u32>>,
}

impl BookingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held(&self, caller: &str, trip_id: &str) -> u32 {
        self.callers
            .get(caller)
            .and_then(|trips| trips.get(trip_id))
            .copied()
            .unwrap_or(0)
    }

    /// Add one seat to the caller's holding, creating it if needed.
    /// Returns the new count.
    pub fn credit(&mut self, caller: &str, trip_id: &str) -> u32 {
        let count = self
            .callers
            .entry(caller.to_string())
            .or_default()
            .entry(trip_id.to_string())
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Remove one seat from the caller's holding. Returns the remaining
    /// count; zero means the holding is gone.
    pub fn debit(&mut self, caller: &str, trip_id: &str) -> Result<u32, EngineError> {
        let no_holding = || EngineError::NoHolding {
            caller: caller.to_string(),
            trip_id: trip_id.to_string(),
        };
        let trips = self.callers.get_mut(caller).ok_or_else(no_holding)?;
        let count = trips.get_mut(trip_id).ok_or_else(no_holding)?;

        *count -= 1;
        let remaining = *count;
        if remaining == 0 {
            trips.remove(trip_id);
            if trips.is_empty() {
                self.callers.remove(caller);
            }
        }
        Ok(remaining)
    }

    /// Holdings sorted by trip id. Unknown callers get an empty list.
    pub fn holdings_of(&self, caller: &str) -> Vec<Holding> {
        let mut holdings: Vec<Holding> = self
            .callers
            .get(caller)
            .map(|trips| {
                trips
                    .iter()
                    .map(|(trip_id, &count)| Holding {
                        trip_id: trip_id.clone(),
                        count,
                    })
                    .collect()
            })
            .unwrap_or_default();
        holdings.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));
        holdings
    }

    /// Seats held on a trip across all callers.
    #[cfg(test)]
    pub(super) fn held_on(&self, trip_id: &str) -> u32 {
        self.callers
            .values()
            .filter_map(|trips| trips.get(trip_id))
            .sum()
    }

    #[cfg(test)]
    pub(super) fn caller_count(&self) -> usize {
        self.callers.len()
    }

    #[cfg(test)]
    pub(super) fn entries(&self) -> impl Iterator<Item = (&str, &str, u32)> {
        self.callers.iter().flat_map(|(caller, trips)| {
            trips
                .iter()
                .map(move |(trip_id, &count)| (caller.as_str(), trip_id.as_str(), count))
        })
    }
}
