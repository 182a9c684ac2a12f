//! The `Database` capability trait.
//!
//! Components never open connections themselves; they receive a
//! [`SharedDatabase`] and issue statements through it. A backend decides how
//! statements are scheduled. The DuckDB backend serializes them onto one
//! connection, so two statements never run in parallel against it.

use crate::error::{DbError, Result};
use crate::value::{Row, SqlValue};
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle to a database capability.
pub type SharedDatabase = Arc<dyn Database>;

/// An async SQL-executing collaborator.
///
/// Parameters are positional and referenced as `$1`, `$2`, ... in SQL text.
#[async_trait]
pub trait Database: Send + Sync + std::fmt::Debug {
    /// Run a query and collect every row.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Run a single statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize>;

    /// Run one or more `;`-separated statements without parameters.
    async fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Run a query that must return at least one row; returns the first.
    async fn query_one(&self, sql: &str, params: &[SqlValue]) -> Result<Row> {
        self.query(sql, params)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DbError::no_rows(first_line(sql)))
    }
}

fn first_line(sql: &str) -> String {
    sql.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}
