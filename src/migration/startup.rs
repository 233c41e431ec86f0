//! In-process migration execution helpers

use crate::config::LedgerConfig;
use crate::executor::Executor;
use crate::migration::{MigrationChain, MigrationError, MigrationReport, Migrator};

/// Run migrations on application startup
///
/// Applies every pending step of `chain` using the state table and lock
/// settings from `config`. When several instances start together the first
/// one to take the advisory lock migrates; the others wait, then find
/// nothing pending.
///
/// The application should not start if this fails.
///
/// # Example
///
/// ```rust,no_run
/// use ledgerline::{connect_executor, LedgerConfig};
/// use ledgerline::migration::startup_migrations;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = LedgerConfig::load()?;
///     let executor = connect_executor(&config.database.url)?;
///     startup_migrations(&executor, ledgerline::ledger::migrations::chain()?, &config)?;
///     Ok(())
/// }
/// ```
///
/// # Errors
///
/// Returns the error of the first failing step, a lock timeout, or any
/// validation failure of the applied state.
pub fn startup_migrations(
    executor: &dyn Executor,
    chain: MigrationChain,
    config: &LedgerConfig,
) -> Result<MigrationReport, MigrationError> {
    config
        .validate()
        .map_err(|e| MigrationError::Configuration(e.to_string()))?;

    let migrator = Migrator::from_config(chain, config);
    let report = migrator.apply_latest(executor)?;

    if report.count() > 0 {
        log::info!("Applied {} migration(s) on startup", report.count());
    } else {
        log::debug!("No pending migrations to apply");
    }
    Ok(report)
}
