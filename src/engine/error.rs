#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Trip id is not in the catalogue.
    NotFound(String),
    /// Reservation against a trip with no seats left.
    NoCapacity(String),
    /// Cancellation by a caller holding no seats on the trip.
    NoHolding { caller: String, trip_id: String },
    /// Release would push `available` above `capacity`.
    OverRelease(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::NoCapacity(_) => "no_capacity",
            EngineError::NoHolding { .. } => "no_holding",
            EngineError::OverRelease(_) => "over_release",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "train not found: {id}"),
            EngineError::NoCapacity(id) => write!(f, "no tickets available: {id}"),
            EngineError::NoHolding { caller, trip_id } => {
                write!(f, "no tickets to cancel for {caller} on {trip_id}")
            }
            EngineError::OverRelease(id) => {
                write!(f, "release on {id} would exceed capacity")
            }
        }
    }
}

impl std::error::Error for EngineError {}
