//! # ledgerline
//!
//! Schema migration engine for the ledgerline personal-finance database.
//!
//! The engine applies an ordered chain of reversible steps to PostgreSQL
//! (driven through `may_postgres`), tracks what is applied in a state table,
//! and serializes writers with an advisory lock. The ledger's own schema
//! history lives in [`ledger::migrations`].

pub mod config;
pub mod connection;
pub mod executor;
pub mod ledger;
pub mod migration;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod value;

pub use config::LedgerConfig;
pub use connection::{connect, connect_executor};
pub use executor::{Executor, PostgresExecutor, StoreError};
pub use value::{Row, Value};
