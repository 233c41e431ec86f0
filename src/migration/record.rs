//! `MigrationRecord` - Represents entries in the applied-state table

use crate::executor::StoreError;
use crate::value::Row;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Represents one applied step in the applied-state table
///
/// A record exists iff the step is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Step identifier
    pub id: String,

    /// Predecessor at the time the step was applied
    pub predecessor: Option<String>,

    /// `SHA-256` fingerprint of the step definition
    pub checksum: String,

    /// When the step was applied
    pub applied_at: DateTime<Utc>,

    /// Execution time in milliseconds (`None` if not recorded)
    pub execution_time_ms: Option<i64>,
}

impl MigrationRecord {
    /// Create a `MigrationRecord` from a tracker row
    ///
    /// Expected column order: `id`, `predecessor`, `checksum`, `applied_at` (as UTC text),
    /// `execution_time_ms`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Decode` if a column has the wrong shape or the timestamp
    /// cannot be parsed.
    pub fn from_row(row: &Row) -> Result<Self, StoreError> {
        let applied_at_str = row.get_string(3)?;
        Ok(Self {
            id: row.get_string(0)?,
            predecessor: row.get_opt_string(1)?,
            checksum: row.get_string(2)?,
            applied_at: parse_timestamp(&applied_at_str)?,
            execution_time_ms: row.get_opt_i64(4)?,
        })
    }
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a UTC timestamp rendered by PostgreSQL's `timestamp::text`
///
/// # Errors
///
/// Returns `StoreError::Decode` when no known format matches.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    let trimmed = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            StoreError::Decode(format!(
                "failed to parse timestamp '{raw}': unrecognized format"
            ))
        })
}
