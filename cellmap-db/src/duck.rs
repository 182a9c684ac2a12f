//! DuckDB backend.
//!
//! A single `duckdb::Connection` guarded by a mutex. Each statement runs on
//! tokio's blocking pool so request tasks keep interleaving while one
//! statement owns the connection.

use crate::database::Database;
use crate::error::{DbError, Result};
use crate::value::{Row, SqlValue};
use async_trait::async_trait;
use duckdb::types::Value;
use duckdb::{params_from_iter, AccessMode, Config, Connection};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// DuckDB-backed [`Database`].
#[derive(Clone)]
pub struct DuckDbDatabase {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for DuckDbDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(p) => write!(f, "DuckDbDatabase({})", p.display()),
            None => write!(f, "DuckDbDatabase(:memory:)"),
        }
    }
}

impl DuckDbDatabase {
    /// Open (or create) a read-write database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened duckdb database");
        Ok(Self::from_connection(conn, Some(path.to_path_buf())))
    }

    /// Open an existing database file read-only. Used by the tile server,
    /// which never writes.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::default().access_mode(AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(path, config)?;
        tracing::debug!(path = %path.display(), "opened duckdb database read-only");
        Ok(Self::from_connection(conn, Some(path.to_path_buf())))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?, None))
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        }
    }

    /// Path of the backing file, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| DbError::task(e.to_string()))?
    }
}

#[async_trait]
impl Database for DuckDbDatabase {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let sql = sql.to_string();
        let params: Vec<Value> = params.iter().map(to_duck).collect();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(params))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let width = row.as_ref().column_count();
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(from_duck(row.get::<_, Value>(i)?));
                }
                out.push(Row::new(values));
            }
            Ok(out)
        })
        .await
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        let sql = sql.to_string();
        let params: Vec<Value> = params.iter().map(to_duck).collect();
        self.blocking(move |conn| Ok(conn.execute(&sql, params_from_iter(params))?))
            .await
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.blocking(move |conn| Ok(conn.execute_batch(&sql)?)).await
    }
}

fn to_duck(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Boolean(*b),
        SqlValue::Int(i) => Value::BigInt(*i),
        SqlValue::UInt(u) => Value::UBigInt(*u),
        SqlValue::Double(d) => Value::Double(*d),
        SqlValue::Text(s) => Value::Text(s.clone()),
    }
}

fn from_duck(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Bool(b),
        Value::TinyInt(i) => SqlValue::Int(i.into()),
        Value::SmallInt(i) => SqlValue::Int(i.into()),
        Value::Int(i) => SqlValue::Int(i.into()),
        Value::BigInt(i) => SqlValue::Int(i),
        Value::HugeInt(i) => match i64::try_from(i) {
            Ok(v) => SqlValue::Int(v),
            Err(_) => SqlValue::Double(i as f64),
        },
        Value::UTinyInt(u) => SqlValue::Int(u.into()),
        Value::USmallInt(u) => SqlValue::Int(u.into()),
        Value::UInt(u) => SqlValue::Int(u.into()),
        Value::UBigInt(u) => SqlValue::UInt(u),
        Value::Float(f) => SqlValue::Double(f.into()),
        Value::Double(d) => SqlValue::Double(d),
        Value::Text(s) => SqlValue::Text(s),
        other => SqlValue::Text(format!("{other:?}")),
    }
}
