//! Attribute filters.
//!
//! A filter arrives as a JSON object keyed by fact table column:
//!
//! ```json
//! {"depth": {"min": 10, "max": 200}, "is_protected": {"bool": true},
//!  "habitat": {"choices": ["kelp", "reef"]}}
//! ```
//!
//! It is decoded once into a [`FilterSpec`], checked against the filterable
//! columns, and compiled into a parameterized SQL predicate. Column order is
//! preserved so compiled SQL and parameter numbering are stable.

use crate::error::{QueryError, Result};
use cellmap_db::schema::{table_columns, CELLS_TABLE};
use cellmap_db::{is_ancestor_column, quote_identifier, Database, SqlValue};
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use serde_json::{Map, Number, Value};
use std::collections::BTreeSet;

/// Constraint on one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnFilter {
    /// Inclusive range; at least one bound is set.
    NumberRange {
        min: Option<SqlValue>,
        max: Option<SqlValue>,
    },
    BooleanEquals(bool),
    /// Membership; an empty list constrains nothing.
    StringChoices(Vec<SqlValue>),
}

/// Decoded filter, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    columns: IndexMap<String, ColumnFilter>,
}

/// A SQL predicate with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub predicate: String,
    pub params: Vec<SqlValue>,
    /// First parameter index after this filter's parameters.
    pub next_index: usize,
}

impl FilterSpec {
    /// Decode the raw `filter` query parameter. `None` or an empty string is
    /// the empty filter.
    ///
    /// If the value does not parse as JSON it is percent-decoded once more and
    /// retried, for clients that encode the parameter twice.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Ok(Self::default()),
            Some(raw) => raw,
        };
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(value) => value,
            Err(first) => {
                let decoded = percent_decode_str(raw)
                    .decode_utf8()
                    .map_err(|_| QueryError::invalid_filter(format!("filter is not valid JSON: {first}")))?;
                serde_json::from_str::<Value>(&decoded)
                    .map_err(|e| QueryError::invalid_filter(format!("filter is not valid JSON: {e}")))?
            }
        };
        Self::from_json(&value)
    }

    /// Decode a JSON value; it must be an object.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| QueryError::invalid_filter("filter must be a JSON object"))?;

        let mut columns = IndexMap::with_capacity(object.len());
        for (column, shape) in object {
            validate_identifier(column)?;
            match decode_shape(shape) {
                Some(filter) => {
                    columns.insert(column.clone(), filter);
                }
                None => {
                    tracing::warn!(column = %column, filter = %shape, "ignoring unrecognized filter");
                }
            }
        }
        Ok(Self { columns })
    }

    pub fn insert(&mut self, column: impl Into<String>, filter: ColumnFilter) -> Result<()> {
        let column = column.into();
        validate_identifier(&column)?;
        self.columns.insert(column, filter);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnFilter)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reject columns that are not filterable.
    pub fn check_columns(&self, allowed: &FilterColumns) -> Result<()> {
        for column in self.columns.keys() {
            if !allowed.contains(column) {
                return Err(QueryError::invalid_filter(format!(
                    "column '{column}' cannot be filtered"
                )));
            }
        }
        Ok(())
    }

    /// Compile to a predicate whose first parameter is `$start`.
    pub fn compile(&self, start: usize) -> CompiledFilter {
        let mut clauses = Vec::with_capacity(self.columns.len());
        let mut params = Vec::new();
        let mut next = start;
        let mut bind = |value: &SqlValue, params: &mut Vec<SqlValue>| {
            params.push(value.clone());
            let placeholder = format!("${next}");
            next += 1;
            placeholder
        };

        for (column, filter) in &self.columns {
            let column = quote_identifier(column);
            match filter {
                ColumnFilter::NumberRange {
                    min: Some(min),
                    max: Some(max),
                } => {
                    let lo = bind(min, &mut params);
                    let hi = bind(max, &mut params);
                    clauses.push(format!("{column} >= {lo} AND {column} <= {hi}"));
                }
                ColumnFilter::NumberRange {
                    min: Some(min),
                    max: None,
                } => {
                    let lo = bind(min, &mut params);
                    clauses.push(format!("{column} >= {lo}"));
                }
                ColumnFilter::NumberRange {
                    min: None,
                    max: Some(max),
                } => {
                    let hi = bind(max, &mut params);
                    clauses.push(format!("{column} <= {hi}"));
                }
                ColumnFilter::NumberRange {
                    min: None,
                    max: None,
                } => {}
                ColumnFilter::BooleanEquals(value) => {
                    let p = bind(&SqlValue::Bool(*value), &mut params);
                    clauses.push(format!("{column} = {p}"));
                }
                ColumnFilter::StringChoices(choices) if choices.is_empty() => {}
                ColumnFilter::StringChoices(choices) => {
                    let placeholders: Vec<String> =
                        choices.iter().map(|c| bind(c, &mut params)).collect();
                    clauses.push(format!("{column} IN ({})", placeholders.join(", ")));
                }
            }
        }

        let predicate = if clauses.is_empty() {
            "true".to_string()
        } else {
            clauses.join(" AND ")
        };
        CompiledFilter {
            predicate,
            params,
            next_index: next,
        }
    }
}

fn decode_shape(shape: &Value) -> Option<ColumnFilter> {
    let object: &Map<String, Value> = shape.as_object()?;
    let present = |key: &str| object.get(key).filter(|v| !v.is_null());

    if present("min").is_some() || present("max").is_some() {
        let bound = |key: &str| -> Option<Option<SqlValue>> {
            match present(key) {
                None => Some(None),
                Some(Value::Number(n)) => Some(Some(number_param(n))),
                Some(_) => None,
            }
        };
        return Some(ColumnFilter::NumberRange {
            min: bound("min")?,
            max: bound("max")?,
        });
    }
    if let Some(value) = present("bool") {
        return value.as_bool().map(ColumnFilter::BooleanEquals);
    }
    if let Some(choices) = present("choices") {
        let choices = choices
            .as_array()?
            .iter()
            .map(|c| match c {
                Value::String(s) => Some(SqlValue::Text(s.clone())),
                Value::Number(n) => Some(number_param(n)),
                Value::Bool(b) => Some(SqlValue::Bool(*b)),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        return Some(ColumnFilter::StringChoices(choices));
    }
    None
}

fn number_param(n: &Number) -> SqlValue {
    match n.as_i64() {
        Some(i) => SqlValue::Int(i),
        None => SqlValue::Double(n.as_f64().unwrap_or(f64::NAN)),
    }
}

/// Only plain identifiers that are not ancestor id columns may be filtered.
pub fn validate_identifier(column: &str) -> Result<()> {
    let mut chars = column.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid {
        return Err(QueryError::invalid_filter(format!(
            "invalid filter column name '{column}'"
        )));
    }
    if is_ancestor_column(column) {
        return Err(QueryError::invalid_filter(format!(
            "column '{column}' cannot be filtered"
        )));
    }
    Ok(())
}

/// The fact table columns filters may reference.
#[derive(Debug, Clone, Default)]
pub struct FilterColumns {
    columns: BTreeSet<String>,
}

impl FilterColumns {
    /// Every non-ancestor column of the `cells` table.
    pub async fn load(db: &dyn Database) -> Result<Self> {
        let columns = table_columns(db, CELLS_TABLE).await?;
        if columns.is_empty() {
            return Err(QueryError::config(format!(
                "fact table '{CELLS_TABLE}' is missing or has no columns"
            )));
        }
        Ok(Self::new(columns.into_iter().map(|c| c.name)))
    }

    pub fn new(columns: impl IntoIterator<Item = String>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .filter(|c| !is_ancestor_column(c))
                .collect(),
        }
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
