//! `Executor` - the store boundary used by migrations
//!
//! The engine talks to PostgreSQL exclusively through this trait so the
//! orchestration logic can be exercised against an in-memory recording store
//! in tests, and against `may_postgres` in production.

use crate::value::{Row, Value};
use may_postgres::types::{ToSql, Type};
use may_postgres::Client;
use std::time::Instant;

/// Errors raised at the store boundary
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `PostgreSQL` error from `may_postgres`
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] may_postgres::Error),
    /// Query failed for a reason reported as plain text
    #[error("Query error: {0}")]
    Query(String),
    /// A result column could not be decoded into a [`Value`]
    #[error("Decode error: {0}")]
    Decode(String),
    /// The connection could not be established or was lost
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Trait for executing statements against the target store
///
/// Implementations execute one statement per call in the session they own.
/// `BEGIN`/`COMMIT`/`ROLLBACK` are plain statements, so a migration's unit of
/// work spans every call made between them.
pub trait Executor {
    /// Execute a statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the statement fails.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError>;

    /// Execute a query and return all rows
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or a column cannot be decoded.
    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError>;

    /// Execute a query that must return exactly one row
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Query` if the query returns zero or several rows.
    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Row, StoreError> {
        let mut rows = self.query_all(sql, params)?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            n => Err(StoreError::Query(format!(
                "expected exactly one row, query returned {n}"
            ))),
        }
    }

    /// Execute a query whose first column is an integer (typically `COUNT(*)`)
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or does not yield one integer.
    fn query_scalar_i64(&self, sql: &str, params: &[Value]) -> Result<i64, StoreError> {
        self.query_one(sql, params)?.get_i64(0)
    }
}

static NULL_TEXT: Option<String> = None;

/// Implementation of `Executor` for `may_postgres::Client`
pub struct PostgresExecutor {
    client: Client,
}

impl PostgresExecutor {
    /// Create a new executor from a `may_postgres::Client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Consume the executor and return the underlying client
    pub fn into_client(self) -> Client {
        self.client
    }

    fn bind(params: &[Value]) -> Vec<&dyn ToSql> {
        params
            .iter()
            .map(|value| match value {
                Value::Null => &NULL_TEXT as &dyn ToSql,
                Value::Bool(b) => b as &dyn ToSql,
                Value::BigInt(i) => i as &dyn ToSql,
                Value::Text(s) => s as &dyn ToSql,
            })
            .collect()
    }

    fn decode(row: &may_postgres::Row) -> Result<Row, StoreError> {
        let mut values = Vec::with_capacity(row.len());
        for (idx, column) in row.columns().iter().enumerate() {
            let ty = column.type_();
            let value = if *ty == Type::BOOL {
                row.try_get::<_, Option<bool>>(idx)?.map_or(Value::Null, Value::Bool)
            } else if *ty == Type::INT8 {
                row.try_get::<_, Option<i64>>(idx)?.map_or(Value::Null, Value::BigInt)
            } else if *ty == Type::INT4 || *ty == Type::OID {
                if *ty == Type::OID {
                    row.try_get::<_, Option<u32>>(idx)?
                        .map_or(Value::Null, |v| Value::BigInt(i64::from(v)))
                } else {
                    row.try_get::<_, Option<i32>>(idx)?
                        .map_or(Value::Null, |v| Value::BigInt(i64::from(v)))
                }
            } else if *ty == Type::INT2 {
                row.try_get::<_, Option<i16>>(idx)?
                    .map_or(Value::Null, |v| Value::BigInt(i64::from(v)))
            } else {
                // text, varchar, name, bpchar and anything cast to text in SQL
                row.try_get::<_, Option<String>>(idx)
                    .map_err(|e| {
                        StoreError::Decode(format!(
                            "column '{}' has unsupported type {}: {e} (cast it to text in SQL)",
                            column.name(),
                            ty
                        ))
                    })?
                    .map_or(Value::Null, Value::Text)
            };
            values.push(value);
        }
        Ok(Row::new(values))
    }
}

impl Executor for PostgresExecutor {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("ledgerline.execute", sql = %statement_label(sql)).entered();

        let start = Instant::now();
        let bound = Self::bind(params);
        let result = self.client.execute(sql, &bound).map_err(StoreError::from);
        log::debug!("execute ({:?}): {}", start.elapsed(), statement_label(sql));
        result
    }

    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("ledgerline.query", sql = %statement_label(sql)).entered();

        let start = Instant::now();
        let bound = Self::bind(params);
        let rows = self.client.query(sql, &bound)?;
        log::debug!(
            "query ({:?}, {} rows): {}",
            start.elapsed(),
            rows.len(),
            statement_label(sql)
        );
        rows.iter().map(Self::decode).collect()
    }
}

/// Collapse runs of whitespace to single spaces
#[must_use]
pub fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse a statement onto one line and cap its length for log output
#[must_use]
pub fn statement_label(sql: &str) -> String {
    let flat = normalize_sql(sql);
    if flat.chars().count() > 160 {
        let cut: String = flat.chars().take(157).collect();
        format!("{cut}...")
    } else {
        flat
    }
}
