//! ledgerline-migrate library
//!
//! Pieces of the CLI that are worth testing without a database: the step
//! scaffold and the mapping from error categories to exit codes.

pub mod exit;
pub mod scaffold;
