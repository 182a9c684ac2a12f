//! # cellmap DB
//!
//! The database capability used by every other cellmap crate.
//!
//! This crate provides:
//! - The [`Database`] trait, an async SQL-executing capability that components
//!   receive explicitly instead of reaching for a global connection
//! - [`SqlValue`] and [`Row`], the backend-neutral parameter and result types
//! - [`DuckDbDatabase`], the embedded DuckDB backend
//! - Table names and DDL for the fact, index and build-status tables
//!
//! ## Quick Start
//!
//! ```ignore
//! use cellmap_db::{Database, DuckDbDatabase, SqlValue};
//!
//! let db = DuckDbDatabase::open_read_only("data/cells.duckdb")?;
//! let rows = db
//!     .query("SELECT count(*) FROM cells WHERE depth >= $1", &[SqlValue::Int(10)])
//!     .await?;
//! let count = rows[0].get_u64(0)?;
//! ```

pub mod database;
pub mod duck;
pub mod error;
pub mod schema;
pub mod value;

pub use database::{Database, SharedDatabase};
pub use duck::DuckDbDatabase;
pub use error::{DbError, Result};
pub use schema::{ancestor_column, is_ancestor_column, quote_identifier, ColumnInfo};
pub use value::{Row, SqlValue};
