use serde::{Deserialize, Serialize};

/// Caller identity used when the session supplies none.
pub const DEFAULT_CALLER: &str = "default";

/// A scheduled trip. Everything except `available` is fixed once the
/// catalogue is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    /// Catalogue key. Lookups by id are case-sensitive.
    pub id: String,
    pub origin: String,
    pub destination: String,
    /// `YYYY-MM-DD`. Dateless trips never match a date filter.
    pub date: Option<String>,
    pub departure: String,
    pub arrival: String,
    pub capacity: u32,
    /// Remaining seats, always within `0..=capacity`.
    pub available: u32,
}

impl Trip {
    /// A fresh trip starts with every seat available.
    pub fn from_seed(seed: TripSeed) -> Self {
        Self {
            id: seed.id,
            origin: seed.origin,
            destination: seed.destination,
            date: seed.date,
            departure: seed.departure,
            arrival: seed.arrival,
            capacity: seed.capacity,
            available: seed.capacity,
        }
    }

    pub fn has_seats(&self) -> bool {
        self.available > 0
    }

    /// Seats currently held by callers.
    pub fn sold(&self) -> u32 {
        self.capacity - self.available
    }
}

/// Catalogue entry as written in a bootstrap file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripSeed {
    pub id: String,
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub date: Option<String>,
    pub departure: String,
    pub arrival: String,
    pub capacity: u32,
}

/// Seats one caller currently holds on one trip. Never zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub trip_id: String,
    pub count: u32,
}

/// Optional search filters, ANDed together.
///
/// `origin` and `destination` compare case-insensitively against the whole
/// field; `date` compares exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripFilter {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub date: Option<String>,
}

impl TripFilter {
    pub fn is_empty(&self) -> bool {
        self.origin.is_none() && self.destination.is_none() && self.date.is_none()
    }

    pub fn matches(&self, trip: &Trip) -> bool {
        if let Some(ref origin) = self.origin
            && !eq_fold(&trip.origin, origin)
        {
            return false;
        }
        if let Some(ref destination) = self.destination
            && !eq_fold(&trip.destination, destination)
        {
            return false;
        }
        if let Some(ref date) = self.date
            && trip.date.as_deref() != Some(date.as_str())
        {
            return false;
        }
        true
    }
}

fn eq_fold(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}
