//! Custom error types for studyplan-sync

use thiserror::Error;

/// Main error type for study plan synchronization
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A content unit's catalog location could not be determined.
    /// Recovered per unit: the unit is dropped and the batch continues.
    #[error("Structure resolution failed for {unit_id}: {reason}")]
    Resolution { unit_id: String, reason: String },

    /// A read against the catalog or the plan repository failed before any write
    #[error("Lookup failed in {step}: {source}")]
    Lookup {
        step: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// A step of the write transaction failed; the whole batch was rolled back
    #[error("Write failed in {step}: {source}")]
    Write {
        step: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// The inbound event is malformed
    #[error("Invalid event: {0}")]
    Validation(String),

    #[error("Study plan not found: {0}")]
    StudyPlanNotFound(String),

    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),

    #[error("Not initialized: run 'studyplan-sync init' first")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn lookup(step: &'static str, source: Error) -> Self {
        Error::Lookup {
            step,
            source: Box::new(source),
        }
    }

    pub fn write(step: &'static str, source: Error) -> Self {
        Error::Write {
            step,
            source: Box::new(source),
        }
    }

    /// Whether the caller may retry the whole batch.
    ///
    /// Read and write failures leave persisted state untouched, so replaying the
    /// event is safe. Malformed events and missing targets fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Lookup { .. } | Error::Write { .. })
    }

    /// Name of the repository or catalog call that failed, if any
    pub fn failed_step(&self) -> Option<&'static str> {
        match self {
            Error::Lookup { step, .. } | Error::Write { step, .. } => Some(step),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Result type alias for studyplan-sync
pub type Result<T> = std::result::Result<T, Error>;
