use ledgerline::migration::{ErrorKind, MigrationError};
use ledgerline::StoreError;

pub const SUCCESS: i32 = 0;
/// Bad arguments, unreadable config or a failed scaffold
pub const USAGE: i32 = 1;
pub const CONFIGURATION: i32 = 2;
pub const PRECONDITION: i32 = 3;
pub const DATA_INTEGRITY: i32 = 4;
pub const STORE: i32 = 5;

#[must_use]
pub fn for_kind(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Configuration => CONFIGURATION,
        ErrorKind::Precondition => PRECONDITION,
        ErrorKind::DataIntegrity => DATA_INTEGRITY,
        ErrorKind::Store => STORE,
    }
}

/// Exit code for an `anyhow` error
///
/// Looks through the chain for a migration error, or a store error raised
/// outside the migrator (e.g. while connecting).
#[must_use]
pub fn for_error(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| {
            if let Some(migration) = cause.downcast_ref::<MigrationError>() {
                Some(for_kind(migration.kind()))
            } else if cause.downcast_ref::<StoreError>().is_some() {
                Some(STORE)
            } else {
                None
            }
        })
        .unwrap_or(USAGE)
}
