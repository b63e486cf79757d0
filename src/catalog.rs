use std::collections::HashSet;
use std::path::Path;

use crate::model::*;

/// A validated initial catalogue: unique non-empty ids, non-zero capacities,
/// every trip full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    trips: Vec<Trip>,
}

impl Catalog {
    pub fn from_seeds(seeds: Vec<TripSeed>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(seeds.len());
        let mut trips = Vec::with_capacity(seeds.len());
        for seed in seeds {
            if seed.id.is_empty() {
                return Err(CatalogError::EmptyId);
            }
            if seed.capacity == 0 {
                return Err(CatalogError::ZeroCapacity(seed.id));
            }
            if !seen.insert(seed.id.clone()) {
                return Err(CatalogError::DuplicateId(seed.id));
            }
            trips.push(Trip::from_seed(seed));
        }
        Ok(Self { trips })
    }

    /// Parse a JSON array of trip records.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let seeds: Vec<TripSeed> =
            serde_json::from_str(json).map_err(|e| CatalogError::Json(e.to_string()))?;
        Self::from_seeds(seeds)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// The timetable the service ships with.
    pub fn builtin() -> Self {
        let seeds = [
            ("G100", "Beijing", "Shanghai", "2025-06-01", "08:00", "13:30", 100),
            ("D200", "Guangzhou", "Shenzhen", "2025-06-01", "09:15", "10:45", 80),
            ("K300", "Chengdu", "Xi'an", "2025-06-01", "18:20", "07:40", 3),
            ("G101", "Beijing", "Shanghai", "2025-06-02", "08:00", "13:30", 100),
            ("D201", "Guangzhou", "Shenzhen", "2025-06-02", "09:15", "10:45", 80),
            ("G102", "Shanghai", "Beijing", "2025-06-01", "14:00", "19:30", 100),
        ];
        let trips = seeds
            .into_iter()
            .map(|(id, origin, destination, date, departure, arrival, capacity)| {
                Trip::from_seed(TripSeed {
                    id: id.into(),
                    origin: origin.into(),
                    destination: destination.into(),
                    date: Some(date.into()),
                    departure: departure.into(),
                    arrival: arrival.into(),
                    capacity,
                })
            })
            .collect();
        Self { trips }
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn trips(&self) -> &[Trip] {
        &self.trips
    }

    pub fn into_trips(self) -> Vec<Trip> {
        self.trips
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum CatalogError {
    EmptyId,
    DuplicateId(String),
    ZeroCapacity(String),
    Io(String),
    Json(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::EmptyId => write!(f, "trip with empty id"),
            CatalogError::DuplicateId(id) => write!(f, "duplicate trip id: {id}"),
            CatalogError::ZeroCapacity(id) => write!(f, "trip {id} has zero capacity"),
            CatalogError::Io(e) => write!(f, "cannot read catalogue: {e}"),
            CatalogError::Json(e) => write!(f, "bad catalogue JSON: {e}"),
        }
    }
}

impl std::error::Error for CatalogError {}
