//! Error types for the repflow_core library.

use std::io;
use uuid::Uuid;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for repflow_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workout definition failed validation
    #[error("Workout validation error: {0}")]
    WorkoutValidation(String),

    /// A workout, session or exercise could not be found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The workout expands to zero steps, so no session can start
    #[error("Workout {0} has no steps to perform")]
    EmptyWorkout(String),

    /// A session has no workout association
    #[error("Session {0} is not associated with a workout")]
    MissingWorkout(Uuid),

    /// Exercise swap could not be applied
    #[error("Swap failed: {0}")]
    Swap(String),

    /// Persistence backend rejected an operation
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Session state machine misuse
    #[error("State error: {0}")]
    State(String),
}
