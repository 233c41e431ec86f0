//! In-memory store for exercising the engine without PostgreSQL
//!
//! [`RecordingExecutor`] records every statement it receives, emulates the
//! applied-state table (including `BEGIN`/`COMMIT`/`ROLLBACK` visibility) and
//! the advisory lock, and answers any other query from scripted responses.
//! Unscripted `SELECT COUNT(*)` queries answer `0`; other unscripted queries
//! answer no rows.

use crate::config::DEFAULT_STATE_TABLE;
use crate::executor::{normalize_sql, Executor, StoreError};
use crate::value::{Row, Value};
use std::cell::RefCell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: String,
    pub predecessor: Option<String>,
    pub checksum: String,
    pub execution_time_ms: Option<i64>,
}

#[derive(Default)]
struct State {
    statements: Vec<String>,
    queries: Vec<String>,
    records: Vec<StoredRecord>,
    snapshot: Option<Vec<StoredRecord>>,
    responses: Vec<(String, Vec<Row>)>,
    failures: Vec<(String, String)>,
    lock_busy: bool,
    lock_held: bool,
    inserts: usize,
}

/// Recording, scriptable [`Executor`]
pub struct RecordingExecutor {
    table: String,
    state: RefCell<State>,
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_state_table(DEFAULT_STATE_TABLE)
    }

    #[must_use]
    pub fn with_state_table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            state: RefCell::new(State::default()),
        }
    }

    /// Pre-populate the applied-state table
    pub fn seed_applied(&self, id: &str, predecessor: Option<&str>, checksum: &str) {
        self.state.borrow_mut().records.push(StoredRecord {
            id: id.to_string(),
            predecessor: predecessor.map(str::to_string),
            checksum: checksum.to_string(),
            execution_time_ms: Some(0),
        });
    }

    /// Answer every query containing `pattern` with `rows` (first match wins)
    pub fn respond(&self, pattern: &str, rows: Vec<Row>) {
        self.state
            .borrow_mut()
            .responses
            .push((pattern.to_string(), rows));
    }

    /// Fail every statement or query containing `pattern`
    pub fn fail_on(&self, pattern: &str, message: &str) {
        self.state
            .borrow_mut()
            .failures
            .push((pattern.to_string(), message.to_string()));
    }

    /// Make `pg_try_advisory_lock` report that another session holds the lock
    pub fn hold_lock_elsewhere(&self) {
        self.state.borrow_mut().lock_busy = true;
    }

    /// Executed statements (not queries), whitespace-normalized
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.state.borrow().statements.clone()
    }

    /// Executed queries, whitespace-normalized
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.state.borrow().queries.clone()
    }

    /// Statements containing `pattern`
    #[must_use]
    pub fn statements_matching(&self, pattern: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.contains(pattern))
            .collect()
    }

    /// Records currently visible in the applied-state table
    #[must_use]
    pub fn applied(&self) -> Vec<StoredRecord> {
        self.state.borrow().records.clone()
    }

    #[must_use]
    pub fn applied_ids(&self) -> Vec<String> {
        self.applied().into_iter().map(|r| r.id).collect()
    }

    /// Number of successful tracker inserts over the executor's lifetime
    #[must_use]
    pub fn insert_count(&self) -> usize {
        self.state.borrow().inserts
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.state.borrow().snapshot.is_some()
    }

    #[must_use]
    pub fn lock_held(&self) -> bool {
        self.state.borrow().lock_held
    }

    fn check_failure(&self, label: &str) -> Result<(), StoreError> {
        let state = self.state.borrow();
        match state.failures.iter().find(|(p, _)| label.contains(p.as_str())) {
            Some((_, msg)) => Err(StoreError::Query(msg.clone())),
            None => Ok(()),
        }
    }

    fn text_param(params: &[Value], idx: usize) -> Option<String> {
        match params.get(idx) {
            Some(Value::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn record_row(record: &StoredRecord) -> Row {
        Row::new(vec![
            Value::Text(record.id.clone()),
            record.predecessor.clone().map_or(Value::Null, Value::Text),
            Value::Text(record.checksum.clone()),
            Value::Text("2024-03-01 12:00:00.000000".to_string()),
            record.execution_time_ms.map_or(Value::Null, Value::BigInt),
        ])
    }
}

impl Executor for RecordingExecutor {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        let label = normalize_sql(sql);
        self.state.borrow_mut().statements.push(label.clone());
        self.check_failure(&label)?;

        let insert_prefix = format!("INSERT INTO {} ", self.table);
        let delete_prefix = format!("DELETE FROM {} ", self.table);
        let mut state = self.state.borrow_mut();

        match label.as_str() {
            "BEGIN" => {
                if state.snapshot.is_some() {
                    return Err(StoreError::Query(
                        "there is already a transaction in progress".to_string(),
                    ));
                }
                state.snapshot = Some(state.records.clone());
                Ok(0)
            }
            "COMMIT" => {
                state.snapshot = None;
                Ok(0)
            }
            "ROLLBACK" => {
                if let Some(previous) = state.snapshot.take() {
                    state.records = previous;
                }
                Ok(0)
            }
            _ if label.starts_with(&insert_prefix) => {
                let id = Self::text_param(params, 0).unwrap_or_default();
                if state.records.iter().any(|r| r.id == id) {
                    return Err(StoreError::Query(format!(
                        "duplicate key value violates unique constraint \"{}_pkey\"",
                        self.table
                    )));
                }
                let execution_time_ms = match params.get(3) {
                    Some(Value::BigInt(ms)) => Some(*ms),
                    _ => None,
                };
                state.records.push(StoredRecord {
                    id,
                    predecessor: Self::text_param(params, 1),
                    checksum: Self::text_param(params, 2).unwrap_or_default(),
                    execution_time_ms,
                });
                state.inserts += 1;
                Ok(1)
            }
            _ if label.starts_with(&delete_prefix) => {
                let id = Self::text_param(params, 0).unwrap_or_default();
                let before = state.records.len();
                state.records.retain(|r| r.id != id);
                Ok((before - state.records.len()) as u64)
            }
            _ => Ok(0),
        }
    }

    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let label = normalize_sql(sql);
        self.state.borrow_mut().queries.push(label.clone());
        self.check_failure(&label)?;

        let mut state = self.state.borrow_mut();

        if label.contains("pg_try_advisory_lock") {
            if state.lock_busy {
                return Ok(vec![Row::new(vec![Value::Bool(false)])]);
            }
            state.lock_held = true;
            return Ok(vec![Row::new(vec![Value::Bool(true)])]);
        }
        if label.contains("pg_advisory_unlock") {
            let was_held = state.lock_held;
            state.lock_held = false;
            return Ok(vec![Row::new(vec![Value::Bool(was_held)])]);
        }

        let from_table = format!("FROM {}", self.table);
        if label.contains(&from_table) {
            if label.starts_with("SELECT COUNT(*)") {
                let id = Self::text_param(params, 0).unwrap_or_default();
                let n = state.records.iter().filter(|r| r.id == id).count();
                return Ok(vec![Row::new(vec![Value::BigInt(n as i64)])]);
            }
            return Ok(state.records.iter().map(Self::record_row).collect());
        }

        if let Some((_, rows)) = state
            .responses
            .iter()
            .find(|(p, _)| label.contains(p.as_str()))
        {
            return Ok(rows.clone());
        }

        if label.starts_with("SELECT COUNT(*)") {
            return Ok(vec![Row::new(vec![Value::BigInt(0)])]);
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_discards_tracker_writes() {
        let store = RecordingExecutor::new();
        store.execute("BEGIN", &[]).unwrap();
        store
            .execute(
                "INSERT INTO ledgerline_migrations (id, predecessor, checksum, execution_time_ms) VALUES ($1, $2, $3, $4)",
                &[Value::from("m1"), Value::Null, Value::from("abc"), Value::BigInt(3)],
            )
            .unwrap();
        assert_eq!(store.applied_ids(), vec!["m1"]);
        store.execute("ROLLBACK", &[]).unwrap();
        assert!(store.applied_ids().is_empty());
        assert!(!store.in_transaction());
    }

    #[test]
    fn test_scripted_responses_and_failures() {
        let store = RecordingExecutor::new();
        store.respond("pg_enum", vec![Row::new(vec![Value::from("pending")])]);
        store.fail_on("DROP TYPE", "cannot drop type");

        let rows = store
            .query_all("SELECT enumlabel::text FROM pg_enum", &[])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(store.execute("DROP TYPE review_status", &[]).is_err());
        assert_eq!(
            store.query_scalar_i64("SELECT COUNT(*) FROM accounts", &[]).unwrap(),
            0
        );
    }
}
