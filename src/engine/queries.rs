use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn get_trip(&self, id: &str) -> Result<Trip, EngineError> {
        let guard = self.lock().await;
        guard.inventory.get(id).cloned()
    }

    /// Trips with at least one seat left, sorted by id.
    pub async fn list_available(&self) -> Vec<Trip> {
        self.search(&TripFilter::default()).await
    }

    /// Bookable trips matching every filter present, sorted by id.
    pub async fn search(&self, filter: &TripFilter) -> Vec<Trip> {
        let guard = self.lock().await;
        let mut trips: Vec<Trip> = guard
            .inventory
            .trips()
            .filter(|t| t.has_seats() && filter.matches(t))
            .cloned()
            .collect();
        drop(guard);

        trips.sort_by(|a, b| a.id.cmp(&b.id));
        trips
    }

    /// What `caller` currently holds, sorted by trip id. Empty for callers
    /// that never booked or have cancelled everything.
    pub async fn holdings_of(&self, caller: &str) -> Vec<Holding> {
        let guard = self.lock().await;
        guard.ledger.holdings_of(caller)
    }

    pub async fn trip_count(&self) -> usize {
        self.lock().await.inventory.len()
    }
}
