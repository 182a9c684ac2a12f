//! Backend-neutral SQL parameter and result values.

use crate::error::{DbError, Result};
use std::fmt;

/// A positional SQL parameter or a result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    Text(String),
}

impl SqlValue {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::UInt(_) => "uint",
            SqlValue::Double(_) => "double",
            SqlValue::Text(_) => "text",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{b}"),
            SqlValue::Int(i) => write!(f, "{i}"),
            SqlValue::UInt(u) => write!(f, "{u}"),
            SqlValue::Double(d) => write!(f, "{d}"),
            SqlValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v.into())
    }
}

impl From<u8> for SqlValue {
    fn from(v: u8) -> Self {
        SqlValue::Int(v.into())
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::UInt(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Double(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// One result row, addressed by column position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    /// Get the raw value at `index`.
    pub fn get(&self, index: usize) -> Result<&SqlValue> {
        self.values.get(index).ok_or(DbError::ColumnOutOfRange {
            index,
            width: self.values.len(),
        })
    }

    /// Get an unsigned integer. Non-negative signed integers are accepted.
    pub fn get_u64(&self, index: usize) -> Result<u64> {
        match self.get(index)? {
            SqlValue::UInt(u) => Ok(*u),
            SqlValue::Int(i) if *i >= 0 => Ok(*i as u64),
            other => Err(type_error(index, "uint", other)),
        }
    }

    /// Get a signed integer.
    pub fn get_i64(&self, index: usize) -> Result<i64> {
        match self.get(index)? {
            SqlValue::Int(i) => Ok(*i),
            SqlValue::UInt(u) => {
                i64::try_from(*u).map_err(|_| type_error(index, "int", &SqlValue::UInt(*u)))
            }
            other => Err(type_error(index, "int", other)),
        }
    }

    /// Get a float, widening integers. `NULL` is `None`.
    pub fn get_opt_f64(&self, index: usize) -> Result<Option<f64>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Double(d) => Ok(Some(*d)),
            SqlValue::Int(i) => Ok(Some(*i as f64)),
            SqlValue::UInt(u) => Ok(Some(*u as f64)),
            other => Err(type_error(index, "double", other)),
        }
    }

    pub fn get_str(&self, index: usize) -> Result<&str> {
        match self.get(index)? {
            SqlValue::Text(s) => Ok(s.as_str()),
            other => Err(type_error(index, "text", other)),
        }
    }

    pub fn get_opt_str(&self, index: usize) -> Result<Option<&str>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.as_str())),
            other => Err(type_error(index, "text", other)),
        }
    }

    pub fn get_bool(&self, index: usize) -> Result<bool> {
        match self.get(index)? {
            SqlValue::Bool(b) => Ok(*b),
            other => Err(type_error(index, "bool", other)),
        }
    }
}

fn type_error(index: usize, expected: &'static str, found: &SqlValue) -> DbError {
    DbError::ColumnType {
        index,
        expected,
        found: found.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_getters_widen_integers() {
        let row = Row::new(vec![
            SqlValue::Int(7),
            SqlValue::UInt(9),
            SqlValue::Null,
            SqlValue::Text("a".into()),
        ]);
        assert_eq!(row.get_u64(0).unwrap(), 7);
        assert_eq!(row.get_i64(1).unwrap(), 9);
        assert_eq!(row.get_opt_f64(0).unwrap(), Some(7.0));
        assert_eq!(row.get_opt_f64(2).unwrap(), None);
        assert_eq!(row.get_str(3).unwrap(), "a");
    }

    #[test]
    fn test_row_type_mismatch() {
        let row = Row::new(vec![SqlValue::Text("x".into()), SqlValue::Int(-1)]);
        assert!(matches!(
            row.get_u64(0),
            Err(DbError::ColumnType { index: 0, .. })
        ));
        assert!(row.get_u64(1).is_err());
        assert!(matches!(
            row.get(5),
            Err(DbError::ColumnOutOfRange { index: 5, width: 2 })
        ));
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(3_i64)), SqlValue::Int(3));
    }
}
