//! Migration registry: collects steps before they are resolved into a chain

use crate::migration::{Migration, MigrationChain, MigrationError};
use std::collections::HashSet;

/// Collects migrations by id
///
/// Registration order is irrelevant; [`MigrationRegistry::into_chain`] orders
/// the steps by their predecessor links.
#[derive(Default)]
pub struct MigrationRegistry {
    migrations: Vec<Box<dyn Migration>>,
    ids: HashSet<String>,
}

impl MigrationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::AlreadyRegistered` if a migration with the same
    /// id is already registered.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> Result<(), MigrationError> {
        let id = migration.id().to_string();
        if !self.ids.insert(id.clone()) {
            return Err(MigrationError::AlreadyRegistered(id));
        }
        self.migrations.push(migration);
        Ok(())
    }

    /// Register every migration in `migrations`, stopping at the first duplicate
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::AlreadyRegistered` on a duplicate id.
    pub fn register_all(
        &mut self,
        migrations: impl IntoIterator<Item = Box<dyn Migration>>,
    ) -> Result<(), MigrationError> {
        for migration in migrations {
            self.register(migration)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_registered(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Registered ids, sorted
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.ids.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Resolve the registered migrations into a linear chain
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Chain` if the predecessor links are malformed.
    pub fn into_chain(self) -> Result<MigrationChain, MigrationError> {
        Ok(MigrationChain::resolve(self.migrations)?)
    }
}
