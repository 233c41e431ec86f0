//! Values and rows exchanged with the store.
//!
//! The engine only ever binds and reads a handful of scalar shapes (identifiers,
//! counts, flags and catalog text), so rows are decoded eagerly into [`Value`]s.
//! Queries that read timestamps or other rich types cast them to `text` in SQL.

use crate::executor::StoreError;
use std::fmt;

/// A scalar bound as a query parameter or decoded from a result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// SQL `NULL` (binds as a nullable `text` parameter)
    Null,
    /// `boolean`
    Bool(bool),
    /// Any integer column (`int2`, `int4`, `int8`)
    BigInt(i64),
    /// Text-like column (`text`, `varchar`, `name`, `bpchar`)
    Text(String),
}

impl Value {
    /// Returns `true` for [`Value::Null`]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::BigInt(i) => write!(f, "{i}"),
            Value::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::BigInt(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A decoded result row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Build a row from already-decoded values
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Borrow the raw value at `idx`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Decode` if the index is out of range.
    pub fn value(&self, idx: usize) -> Result<&Value, StoreError> {
        self.values.get(idx).ok_or_else(|| {
            StoreError::Decode(format!(
                "column index {idx} out of range (row has {} columns)",
                self.values.len()
            ))
        })
    }

    /// # Errors
    ///
    /// Returns `StoreError::Decode` if the column is not an integer.
    pub fn get_i64(&self, idx: usize) -> Result<i64, StoreError> {
        match self.value(idx)? {
            Value::BigInt(i) => Ok(*i),
            other => Err(StoreError::Decode(format!(
                "expected integer at column {idx}, found {other}"
            ))),
        }
    }

    /// # Errors
    ///
    /// Returns `StoreError::Decode` if the column is neither an integer nor `NULL`.
    pub fn get_opt_i64(&self, idx: usize) -> Result<Option<i64>, StoreError> {
        match self.value(idx)? {
            Value::Null => Ok(None),
            Value::BigInt(i) => Ok(Some(*i)),
            other => Err(StoreError::Decode(format!(
                "expected nullable integer at column {idx}, found {other}"
            ))),
        }
    }

    /// # Errors
    ///
    /// Returns `StoreError::Decode` if the column is not a boolean.
    pub fn get_bool(&self, idx: usize) -> Result<bool, StoreError> {
        match self.value(idx)? {
            Value::Bool(b) => Ok(*b),
            other => Err(StoreError::Decode(format!(
                "expected boolean at column {idx}, found {other}"
            ))),
        }
    }

    /// # Errors
    ///
    /// Returns `StoreError::Decode` if the column is not text.
    pub fn get_string(&self, idx: usize) -> Result<String, StoreError> {
        match self.value(idx)? {
            Value::Text(s) => Ok(s.clone()),
            other => Err(StoreError::Decode(format!(
                "expected text at column {idx}, found {other}"
            ))),
        }
    }

    /// # Errors
    ///
    /// Returns `StoreError::Decode` if the column is neither text nor `NULL`.
    pub fn get_opt_string(&self, idx: usize) -> Result<Option<String>, StoreError> {
        match self.value(idx)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            other => Err(StoreError::Decode(format!(
                "expected nullable text at column {idx}, found {other}"
            ))),
        }
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}
