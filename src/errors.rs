//! Error hierarchy of the change-notification pipeline.
//!
//! Nothing in this crate is fatal to the process: store failures are retried
//! on the next scan tick, malformed requests become bad-request responses and
//! delivery callback panics are caught at the dispatch boundary.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Persistent store failures (transient, retried by the scanner)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Malformed watch or fetch request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend temporarily unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A query failed with a backend-specific cause
    #[error("Store query {operation} failed")]
    Query {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The addressed row does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether the failure is worth retrying on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Store(StoreError::Unavailable(_)) | Error::Store(StoreError::Query { .. })
        )
    }
}
