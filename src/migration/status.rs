//! Migration status tracking

use crate::migration::checksum::checksums_match;
use crate::migration::{MigrationChain, MigrationError, MigrationRecord, Reversibility};

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Applied steps, in chain order
    pub applied: Vec<MigrationRecord>,

    /// Pending steps, in chain order
    pub pending: Vec<PendingMigration>,

    /// Total number of steps in the chain
    pub total: usize,

    pub applied_count: usize,

    pub pending_count: usize,
}

/// A step that is part of the chain but not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMigration {
    pub id: String,
    pub description: String,
    /// Position in the chain (0 = head of the chain)
    pub position: usize,
    pub reversibility: Reversibility,
}

impl MigrationStatus {
    /// Classify every chain step as applied or pending
    ///
    /// # Errors
    ///
    /// - `Configuration` if an applied id is not part of the chain
    /// - `ChecksumMismatch` if an applied step's definition changed
    /// - `Precondition` if the applied steps are not a prefix of the chain
    pub fn evaluate(
        chain: &MigrationChain,
        records: Vec<MigrationRecord>,
    ) -> Result<Self, MigrationError> {
        let mut positioned = Vec::with_capacity(records.len());
        for record in records {
            let Some(pos) = chain.position(&record.id) else {
                return Err(MigrationError::Configuration(format!(
                    "applied migration '{}' is not part of the migration chain. \
                     It may have been removed from the codebase after deployment.",
                    record.id
                )));
            };
            positioned.push((pos, record));
        }
        positioned.sort_by_key(|(pos, _)| *pos);

        for (expected, (pos, record)) in positioned.iter().enumerate() {
            if *pos != expected {
                let missing = chain
                    .at(expected)
                    .map_or_else(|| "?".to_string(), |s| s.id().to_string());
                return Err(MigrationError::Precondition(format!(
                    "migration '{}' is applied but its predecessor chain is not: \
                     '{missing}' is missing from the applied-state table",
                    record.id
                )));
            }
            if let Some(step) = chain.at(*pos) {
                let current = step.checksum();
                if !checksums_match(&record.checksum, &current) {
                    return Err(MigrationError::ChecksumMismatch {
                        id: record.id.clone(),
                        stored: record.checksum.clone(),
                        current,
                    });
                }
            }
        }

        let applied: Vec<MigrationRecord> = positioned.into_iter().map(|(_, r)| r).collect();
        let pending: Vec<PendingMigration> = chain
            .steps()
            .enumerate()
            .skip(applied.len())
            .map(|(position, step)| PendingMigration {
                id: step.id().to_string(),
                description: step.description().to_string(),
                position,
                reversibility: step.reversibility(),
            })
            .collect();

        Ok(Self::new(applied, pending))
    }

    #[must_use]
    pub fn new(applied: Vec<MigrationRecord>, pending: Vec<PendingMigration>) -> Self {
        let applied_count = applied.len();
        let pending_count = pending.len();
        Self {
            applied,
            pending,
            total: applied_count + pending_count,
            applied_count,
            pending_count,
        }
    }

    /// Check if all migrations are applied
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count == 0
    }

    /// The chain head: most recently applied step
    #[must_use]
    pub fn head(&self) -> Option<&str> {
        self.applied.last().map(|r| r.id.as_str())
    }

    #[must_use]
    pub fn next_pending(&self) -> Option<&str> {
        self.pending.first().map(|p| p.id.as_str())
    }

    #[must_use]
    pub fn is_applied(&self, id: &str) -> bool {
        self.applied.iter().any(|r| r.id == id)
    }
}
