//! Migration system for ledgerline
//!
//! This module provides the infrastructure for schema migrations:
//! - the `Migration` step trait and reusable step types
//! - chain resolution from predecessor links
//! - applied-state tracking
//! - the `Migrator`, which walks the chain under an advisory lock
//!
//! # Example
//!
//! ```rust,no_run
//! use ledgerline::migration::{Migration, MigrationChain, MigrationError, Migrator, SchemaManager};
//! use sea_query::{Alias, ColumnDef, Table};
//!
//! pub struct CreateNotes;
//!
//! impl Migration for CreateNotes {
//!     fn id(&self) -> &str {
//!         "m20240501000000_create_notes"
//!     }
//!
//!     fn predecessor(&self) -> Option<&str> {
//!         None
//!     }
//!
//!     fn apply(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
//!         let table = Table::create()
//!             .table(Alias::new("notes"))
//!             .col(ColumnDef::new(Alias::new("id")).uuid().not_null().primary_key())
//!             .col(ColumnDef::new(Alias::new("body")).text().not_null())
//!             .to_owned();
//!         manager.create_table(table)?;
//!         Ok(())
//!     }
//!
//!     fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
//!         manager.drop_table(Table::drop().table(Alias::new("notes")).to_owned())?;
//!         Ok(())
//!     }
//! }
//!
//! # fn run(executor: &dyn ledgerline::Executor) -> Result<(), MigrationError> {
//! let chain = MigrationChain::resolve(vec![Box::new(CreateNotes)])?;
//! Migrator::new(chain).apply_latest(executor)?;
//! # Ok(()) }
//! ```

pub mod chain;
pub mod checksum;
pub mod column_ops;
pub mod enum_type;
pub mod error;
pub mod fk_conversion;
pub mod liveness;
pub mod lock;
pub mod migration;
pub mod migrator;
pub mod record;
pub mod registry;
pub mod schema_manager;
pub mod snapshot;
pub mod sql_migration;
pub mod startup;
pub mod state_table;
pub mod status;

pub use chain::{ChainError, MigrationChain};
pub use column_ops::{AddColumn, Backfill, ColumnRestore, DropColumn, RenameColumn, RequireColumn};
pub use enum_type::{
    AddEnumValue, EnumColumn, EnumType, RemoveEnumValue, RenameEnumValue, ValuePosition,
};
pub use error::{ErrorKind, MigrationError};
pub use fk_conversion::{ConversionPhase, EnumToForeignKey, LinkSpec};
pub use liveness::{AddSoftDelete, DropActiveFlag};
pub use lock::MigrationLockGuard;
pub use migration::{Direction, Migration, Reversibility, StepHeader, TransactionMode};
pub use migrator::{MigrationPlan, MigrationReport, Migrator, PlannedStep, StepOutcome, BASE};
pub use record::MigrationRecord;
pub use registry::MigrationRegistry;
pub use schema_manager::SchemaManager;
pub use snapshot::SchemaSnapshot;
pub use sql_migration::SqlMigration;
pub use startup::startup_migrations;
pub use state_table::StateTable;
pub use status::{MigrationStatus, PendingMigration};
