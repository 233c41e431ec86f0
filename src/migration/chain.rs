//! Dependency chain resolution
//!
//! Orders steps by their declared predecessor links into a single linear
//! history and validates that the links really form one chain.

use super::migration::Migration;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

static ID_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^m\d{14}_[a-z0-9_]+$").ok());

/// Whether `id` has the `m{YYYYMMDDHHMMSS}_{snake_name}` shape
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    ID_PATTERN.as_ref().is_some_and(|pattern| pattern.is_match(id))
}

/// Malformed predecessor relation; always fatal, raised before touching the store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("no migrations were registered")]
    Empty,
    #[error("migration id '{0}' is declared more than once")]
    DuplicateId(String),
    #[error("migration id '{0}' does not match m{{YYYYMMDDHHMMSS}}_{{name}}")]
    InvalidId(String),
    #[error("no migration without a predecessor; the chain has no head")]
    NoRoot,
    #[error("several migrations have no predecessor: {}", .0.join(", "))]
    MultipleRoots(Vec<String>),
    #[error("migration '{id}' names unknown predecessor '{predecessor}'")]
    MissingPredecessor { id: String, predecessor: String },
    #[error("migration '{predecessor}' is named as predecessor by several steps: {}", .successors.join(", "))]
    Branch {
        predecessor: String,
        successors: Vec<String>,
    },
    #[error("migrations not reachable from the chain head (cycle): {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// A validated, totally ordered list of steps
pub struct MigrationChain {
    steps: Vec<Box<dyn Migration>>,
    positions: HashMap<String, usize>,
}

impl MigrationChain {
    /// Validate the predecessor relation and order the steps head-first
    ///
    /// The order depends only on the links, never on the input order, so
    /// resolving the same set twice yields the same sequence.
    ///
    /// # Arguments
    ///
    /// * `steps` - Every registered step, in any order
    ///
    /// # Returns
    ///
    /// The chain ordered from the root step to the latest one.
    ///
    /// # Errors
    ///
    /// Returns a `ChainError` for any branch, cycle, missing link or duplicate.
    pub fn resolve(steps: Vec<Box<dyn Migration>>) -> Result<Self, ChainError> {
        if steps.is_empty() {
            return Err(ChainError::Empty);
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if !is_valid_id(step.id()) {
                return Err(ChainError::InvalidId(step.id().to_string()));
            }
            if !seen.insert(step.id().to_string()) {
                return Err(ChainError::DuplicateId(step.id().to_string()));
            }
        }

        let mut roots: Vec<String> = steps
            .iter()
            .filter(|s| s.predecessor().is_none())
            .map(|s| s.id().to_string())
            .collect();
        roots.sort();
        match roots.len() {
            0 => return Err(ChainError::NoRoot),
            1 => {}
            _ => return Err(ChainError::MultipleRoots(roots)),
        }

        // predecessor id -> successor index
        let mut successor_of: HashMap<&str, usize> = HashMap::new();
        for (idx, step) in steps.iter().enumerate() {
            let Some(pred) = step.predecessor() else {
                continue;
            };
            if !seen.contains(pred) {
                return Err(ChainError::MissingPredecessor {
                    id: step.id().to_string(),
                    predecessor: pred.to_string(),
                });
            }
            if let Some(&other) = successor_of.get(pred) {
                let mut successors = vec![steps[other].id().to_string(), step.id().to_string()];
                successors.sort();
                return Err(ChainError::Branch {
                    predecessor: pred.to_string(),
                    successors,
                });
            }
            successor_of.insert(pred, idx);
        }

        let mut order = Vec::with_capacity(steps.len());
        let mut current = steps.iter().position(|s| s.predecessor().is_none());
        while let Some(idx) = current {
            order.push(idx);
            current = successor_of.get(steps[idx].id()).copied();
            if order.len() > steps.len() {
                break;
            }
        }

        if order.len() != steps.len() {
            let reached: HashSet<usize> = order.iter().copied().collect();
            let mut stranded: Vec<String> = (0..steps.len())
                .filter(|i| !reached.contains(i))
                .map(|i| steps[i].id().to_string())
                .collect();
            stranded.sort();
            return Err(ChainError::Cycle(stranded));
        }

        let mut slots: Vec<Option<Box<dyn Migration>>> = steps.into_iter().map(Some).collect();
        let ordered: Vec<Box<dyn Migration>> = order
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .collect();
        let positions = ordered
            .iter()
            .enumerate()
            .map(|(pos, s)| (s.id().to_string(), pos))
            .collect();

        Ok(Self {
            steps: ordered,
            positions,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps in application order
    pub fn steps(&self) -> impl Iterator<Item = &dyn Migration> {
        self.steps.iter().map(|s| &**s)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id()).collect()
    }

    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&dyn Migration> {
        self.position(id).map(|pos| &*self.steps[pos])
    }

    #[must_use]
    pub fn at(&self, pos: usize) -> Option<&dyn Migration> {
        self.steps.get(pos).map(|s| &**s)
    }

    /// The last step of the chain (the target of apply-to-latest)
    #[must_use]
    pub fn latest(&self) -> Option<&dyn Migration> {
        self.steps.last().map(|s| &**s)
    }

    #[must_use]
    pub fn successor(&self, id: &str) -> Option<&dyn Migration> {
        self.position(id).and_then(|pos| self.at(pos + 1))
    }
}
