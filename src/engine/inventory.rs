use std::collections::HashMap;

use crate::catalog::Catalog;
use crate::model::*;

use super::EngineError;

/// Trip catalogue and availability counters.
///
/// Holds no lock of its own: every call happens inside the engine's
/// critical section.
#[derive(Debug, Default)]
pub struct Inventory {
    trips: HashMap<String, Trip>,
}

impl Inventory {
    pub fn new(catalog: Catalog) -> Self {
        let trips = catalog
            .into_trips()
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        Self { trips }
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.trips.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Result<&Trip, EngineError> {
        self.trips
            .get(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    /// All trips, bookable or not, in no particular order.
    pub fn trips(&self) -> impl Iterator<Item = &Trip> {
        self.trips.values()
    }

    /// Take one seat. The only operation that lowers `available`.
    pub fn reserve(&mut self, id: &str) -> Result<(), EngineError> {
        let trip = self
            .trips
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if trip.available == 0 {
            return Err(EngineError::NoCapacity(id.to_string()));
        }
        trip.available -= 1;
        Ok(())
    }

    /// Return one seat. Refuses to go past `capacity`.
    pub fn release(&mut self, id: &str) -> Result<(), EngineError> {
        let trip = self
            .trips
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if trip.available >= trip.capacity {
            return Err(EngineError::OverRelease(id.to_string()));
        }
        trip.available += 1;
        Ok(())
    }
}
