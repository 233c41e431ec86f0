//! Steps declared as forward and backward SQL statement lists

use crate::migration::{
    Migration, MigrationError, Reversibility, SchemaManager, StepHeader, TransactionMode,
};

/// A step whose actions are plain SQL
///
/// ```rust
/// use ledgerline::migration::SqlMigration;
///
/// let step = SqlMigration::new("m20240420000001_rename_transaction_memo", Some("m20240410000002_drop_institution_active_flag"))
///     .forward("ALTER TABLE transactions RENAME COLUMN memo TO notes")
///     .backward("ALTER TABLE transactions RENAME COLUMN notes TO memo");
/// ```
///
/// The checksum covers every statement, so editing the SQL of an applied step
/// is reported as drift.
#[derive(Debug, Clone)]
pub struct SqlMigration {
    header: StepHeader,
    forward: Vec<String>,
    backward: Vec<String>,
    apply_mode: TransactionMode,
    revert_mode: TransactionMode,
    reversibility: Reversibility,
}

impl SqlMigration {
    pub fn new(id: impl Into<String>, predecessor: Option<&str>) -> Self {
        Self {
            header: StepHeader::new(id, predecessor),
            forward: Vec::new(),
            backward: Vec::new(),
            apply_mode: TransactionMode::Transactional,
            revert_mode: TransactionMode::Transactional,
            reversibility: Reversibility::Exact,
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.header = self.header.describe(description);
        self
    }

    /// Append a statement to the forward action
    #[must_use]
    pub fn forward(mut self, sql: impl Into<String>) -> Self {
        self.forward.push(sql.into());
        self
    }

    /// Append a statement to the backward action
    #[must_use]
    pub fn backward(mut self, sql: impl Into<String>) -> Self {
        self.backward.push(sql.into());
        self
    }

    #[must_use]
    pub fn apply_outside_transaction(mut self) -> Self {
        self.apply_mode = TransactionMode::NonTransactional;
        self
    }

    #[must_use]
    pub fn revert_outside_transaction(mut self) -> Self {
        self.revert_mode = TransactionMode::NonTransactional;
        self
    }

    #[must_use]
    pub fn best_effort(mut self, caveat: &'static str) -> Self {
        self.reversibility = Reversibility::BestEffort(caveat);
        self
    }

    #[must_use]
    pub fn irreversible(mut self, reason: &'static str) -> Self {
        self.reversibility = Reversibility::Irreversible(reason);
        self
    }

    pub fn forward_statements(&self) -> &[String] {
        &self.forward
    }

    pub fn backward_statements(&self) -> &[String] {
        &self.backward
    }
}

impl Migration for SqlMigration {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn predecessor(&self) -> Option<&str> {
        self.header.predecessor.as_deref()
    }

    fn description(&self) -> &str {
        &self.header.description
    }

    fn apply(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.execute_all(self.forward.as_slice())?;
        Ok(())
    }

    fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        if let Reversibility::Irreversible(reason) = self.reversibility {
            return Err(MigrationError::Precondition(format!(
                "'{}' cannot be reverted: {reason}",
                self.header.id
            )));
        }
        manager.execute_all(self.backward.as_slice())?;
        Ok(())
    }

    fn apply_mode(&self) -> TransactionMode {
        self.apply_mode
    }

    fn revert_mode(&self) -> TransactionMode {
        self.revert_mode
    }

    fn reversibility(&self) -> Reversibility {
        self.reversibility
    }

    fn checksum(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.forward.len() + self.backward.len() + 1);
        parts.extend(self.forward.iter().map(String::as_str));
        // a statement moved between directions must change the checksum
        parts.push("--");
        parts.extend(self.backward.iter().map(String::as_str));
        self.header.checksum_with(parts.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;

    fn rename() -> SqlMigration {
        SqlMigration::new("m20240420000001_rename_transaction_memo", Some("m20240410000002_drop_institution_active_flag"))
            .describe("Rename transactions.memo to notes")
            .forward("ALTER TABLE transactions RENAME COLUMN memo TO notes")
            .backward("ALTER TABLE transactions RENAME COLUMN notes TO memo")
    }

    #[test]
    fn test_actions_run_declared_statements() {
        let store = RecordingExecutor::new();
        let manager = SchemaManager::new(&store);
        let step = rename();

        step.apply(&manager).unwrap();
        step.revert(&manager).unwrap();
        assert_eq!(
            store.statements(),
            vec![
                "ALTER TABLE transactions RENAME COLUMN memo TO notes",
                "ALTER TABLE transactions RENAME COLUMN notes TO memo",
            ]
        );
    }

    #[test]
    fn test_checksum_tracks_statements() {
        let base = rename().checksum();
        assert_eq!(base, rename().checksum());

        let edited = rename().forward("CREATE INDEX idx_notes ON transactions(notes)");
        assert_ne!(base, edited.checksum());
    }

    #[test]
    fn test_irreversible_revert_is_refused() {
        let store = RecordingExecutor::new();
        let manager = SchemaManager::new(&store);
        let step = SqlMigration::new("m20240101000000_purge", None)
            .forward("DELETE FROM audit_log")
            .irreversible("deleted rows cannot be recovered");

        let err = step.revert(&manager).unwrap_err();
        assert!(matches!(err, MigrationError::Precondition(_)));
        assert!(store.statements().is_empty());
    }
}
