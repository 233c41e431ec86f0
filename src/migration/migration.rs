//! Migration trait definition

use super::checksum::checksum_parts;
use super::schema_manager::SchemaManager;
use super::MigrationError;
use std::fmt;

/// Direction of a step execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Run the forward action
    Apply,
    /// Run the backward action
    Revert,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Apply => write!(f, "apply"),
            Direction::Revert => write!(f, "revert"),
        }
    }
}

/// How the migrator wraps one direction of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// Step effect and tracker write commit together in one transaction
    #[default]
    Transactional,
    /// Step runs in autocommit mode (e.g. `ALTER TYPE ... ADD VALUE`), and the
    /// tracker write follows in its own unit
    NonTransactional,
}

/// How faithfully `revert()` undoes `apply()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reversibility {
    /// `apply -> revert -> apply` leaves an identical schema and data
    #[default]
    Exact,
    /// `revert()` reconstructs the prior shape from current data; logged on every revert
    BestEffort(&'static str),
    /// `revert()` is refused before any store access
    Irreversible(&'static str),
}

/// Trait that all migration steps implement
///
/// A step is identified by `id()` and linked into the chain by naming the step
/// it follows in `predecessor()`. Exactly one step in a chain has no predecessor.
///
/// Each direction completes as a single unit of work: the migrator opens the
/// transaction (unless the direction is [`TransactionMode::NonTransactional`]),
/// calls the action, writes the tracker record and commits.
///
/// Steps are synchronous; the caller blocks until the store answers.
pub trait Migration: Send + Sync {
    /// Unique identifier, `m{YYYYMMDDHHMMSS}_{name}`
    fn id(&self) -> &str;

    /// Identifier of the step this one follows (`None` for the chain head)
    fn predecessor(&self) -> Option<&str>;

    /// Human-readable summary shown in status output
    fn description(&self) -> &str {
        ""
    }

    /// Apply the migration (forward action)
    ///
    /// # Errors
    ///
    /// Any error aborts the step; transactional steps are rolled back.
    fn apply(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError>;

    /// Revert the migration (backward action)
    ///
    /// Must restore the exact prior schema shape, including indexes and
    /// constraints, unless [`Migration::reversibility`] says otherwise.
    ///
    /// # Errors
    ///
    /// Any error aborts the step; transactional steps are rolled back.
    fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError>;

    fn apply_mode(&self) -> TransactionMode {
        TransactionMode::Transactional
    }

    fn revert_mode(&self) -> TransactionMode {
        TransactionMode::Transactional
    }

    fn reversibility(&self) -> Reversibility {
        Reversibility::Exact
    }

    /// Check the live schema for this step's effect
    ///
    /// Consulted for pending steps before they run. Returning `true` makes the
    /// migrator record the step as applied without running `apply()`, which is
    /// how an interrupted non-transactional step is reconciled on restart.
    ///
    /// # Errors
    ///
    /// Returns store errors raised by the catalog query.
    fn is_present(&self, _manager: &SchemaManager<'_>) -> Result<bool, MigrationError> {
        Ok(false)
    }

    /// Fingerprint stored in the tracker and compared on every status read
    ///
    /// Steps built from SQL text should override this to include the statements.
    fn checksum(&self) -> String {
        checksum_parts(&[
            self.id(),
            self.predecessor().unwrap_or(""),
            self.description(),
        ])
    }

    fn mode(&self, direction: Direction) -> TransactionMode {
        match direction {
            Direction::Apply => self.apply_mode(),
            Direction::Revert => self.revert_mode(),
        }
    }

    fn run(&self, manager: &SchemaManager<'_>, direction: Direction) -> Result<(), MigrationError> {
        match direction {
            Direction::Apply => self.apply(manager),
            Direction::Revert => self.revert(manager),
        }
    }
}

/// Identity shared by the reusable step types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepHeader {
    pub id: String,
    pub predecessor: Option<String>,
    pub description: String,
}

impl StepHeader {
    pub fn new(id: impl Into<String>, predecessor: Option<&str>) -> Self {
        Self {
            id: id.into(),
            predecessor: predecessor.map(str::to_string),
            description: String::new(),
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Checksum over the identity followed by `parts`
    #[must_use]
    pub fn checksum_with<S: AsRef<str>>(&self, parts: &[S]) -> String {
        let mut all: Vec<&str> = vec![
            &self.id,
            self.predecessor.as_deref().unwrap_or(""),
            &self.description,
        ];
        all.extend(parts.iter().map(|p| p.as_ref()));
        checksum_parts(all.as_slice())
    }
}

impl fmt::Debug for dyn Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id())
            .field("predecessor", &self.predecessor())
            .finish()
    }
}
