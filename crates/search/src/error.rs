use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid time window '{0}' (expected e.g. \"7 days\", \"24 hours\", \"2 weeks\")")]
    InvalidTimeWindow(String),

    #[error("Invalid runtime floor {0} (must be a finite number >= 0)")]
    InvalidRuntimeFloor(f64),

    #[error("Ladder step '{0}' changes nothing")]
    EmptyStep(String),
}
