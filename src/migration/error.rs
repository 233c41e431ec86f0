//! Migration-specific error types

use crate::executor::StoreError;
use crate::migration::chain::ChainError;
use crate::migration::migration::Direction;

/// Coarse error category, used by operators (and the CLI exit code) to decide
/// whether re-running the same walk is safe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed chain or drifted step definitions; fix the code, not the store
    Configuration,
    /// The requested walk is not allowed from the current applied state
    Precondition,
    /// Stored data blocks a step; fix the data, then re-run
    DataIntegrity,
    /// Connection loss, lock or statement timeout; re-run once resolved
    Store,
}

/// Migration-specific errors
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The predecessor links do not form a single chain
    #[error("Invalid migration chain: {0}")]
    Chain(#[from] ChainError),

    /// Any other defect in the declared migrations or engine configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Migration already registered under this identifier
    #[error("Migration '{0}' is already registered")]
    AlreadyRegistered(String),

    /// An applied step no longer matches its definition
    #[error(
        "Migration '{id}' has been modified after being applied.\n\
         Stored checksum: {stored}\n\
         Current checksum: {current}\n\
         Applied migrations must not be edited; add a new step instead."
    )]
    ChecksumMismatch {
        id: String,
        stored: String,
        current: String,
    },

    /// The walk would violate the applied-prefix invariant
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The requested target does not name a known step
    #[error("Unknown migration '{0}'")]
    UnknownMigration(String),

    /// Stored rows prevent the step from completing
    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    /// Store failure (connection loss, statement timeout, rejected DDL)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The advisory lock could not be acquired in time
    #[error(
        "Migration lock timeout: advisory lock {key} not acquired within {seconds} seconds.\n\
         Another process may be running migrations. If this persists, check pg_locks \
         for a session holding advisory lock {key}."
    )]
    LockTimeout { key: i64, seconds: u64 },

    /// A step's own action failed; the walk halted right before it
    #[error("Migration '{id}' failed during {direction}: {source}")]
    StepFailed {
        id: String,
        direction: Direction,
        #[source]
        source: Box<MigrationError>,
    },
}

impl MigrationError {
    /// Wrap an error raised while running step `id`
    #[must_use]
    pub fn step_failed(id: impl Into<String>, direction: Direction, source: MigrationError) -> Self {
        MigrationError::StepFailed {
            id: id.into(),
            direction,
            source: Box::new(source),
        }
    }

    /// `DataIntegrity` from anything displayable
    pub fn data_integrity(msg: impl Into<String>) -> Self {
        MigrationError::DataIntegrity(msg.into())
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrationError::Chain(_)
            | MigrationError::Configuration(_)
            | MigrationError::AlreadyRegistered(_)
            | MigrationError::ChecksumMismatch { .. } => ErrorKind::Configuration,
            MigrationError::Precondition(_) | MigrationError::UnknownMigration(_) => {
                ErrorKind::Precondition
            }
            MigrationError::DataIntegrity(_) => ErrorKind::DataIntegrity,
            MigrationError::Store(_) | MigrationError::LockTimeout { .. } => ErrorKind::Store,
            MigrationError::StepFailed { source, .. } => source.kind(),
        }
    }

    /// The innermost error, unwrapping `StepFailed` layers
    #[must_use]
    pub fn root(&self) -> &MigrationError {
        match self {
            MigrationError::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }
}
