#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Storage layer for the air quality sync pipeline.
//!
//! The [`Database`] trait is the narrow interface everything else talks
//! through; [`postgres`] provides the `tokio-postgres` implementation and
//! [`queries`] the SQL the pipeline runs.

pub mod postgres;
pub mod queries;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),
    #[error("no row matched query")]
    NotFound,
    #[error("conversion failed: {message}")]
    Conversion { message: String },
}

/// A single column value as it comes back from the store.
///
/// Everything the pipeline reads fits in these five shapes; columns of any
/// other type surface as a `Conversion` error rather than a silent guess.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<(String, SqlValue)>,
}

impl Row {
    #[must_use]
    pub const fn new(values: Vec<(String, SqlValue)>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// # Errors
    ///
    /// Returns [`DbError::Conversion`] when the column is missing, null, or
    /// not an integer.
    pub fn to_i64(&self, column: &str) -> Result<i64, DbError> {
        match self.get(column) {
            Some(SqlValue::Int(value)) => Ok(*value),
            other => Err(conversion(column, "integer", other)),
        }
    }

    /// # Errors
    ///
    /// Returns [`DbError::Conversion`] when the column is not an integer or
    /// overflows `i32`.
    pub fn to_i32(&self, column: &str) -> Result<i32, DbError> {
        let value = self.to_i64(column)?;
        i32::try_from(value).map_err(|_| DbError::Conversion {
            message: format!("column '{column}' value {value} exceeds i32"),
        })
    }

    /// # Errors
    ///
    /// Returns [`DbError::Conversion`] when the column is missing, null, or
    /// not a real number.
    pub fn to_f64(&self, column: &str) -> Result<f64, DbError> {
        match self.get(column) {
            Some(SqlValue::Real(value)) => Ok(*value),
            other => Err(conversion(column, "real", other)),
        }
    }

    /// # Errors
    ///
    /// Returns [`DbError::Conversion`] when the column is missing, null, or
    /// not text.
    pub fn to_text(&self, column: &str) -> Result<String, DbError> {
        match self.get(column) {
            Some(SqlValue::Text(value)) => Ok(value.clone()),
            other => Err(conversion(column, "text", other)),
        }
    }

    /// # Errors
    ///
    /// Returns [`DbError::Conversion`] when the column is missing, null, or
    /// not a timestamp.
    pub fn to_timestamp(&self, column: &str) -> Result<DateTime<Utc>, DbError> {
        match self.get(column) {
            Some(SqlValue::Timestamp(value)) => Ok(*value),
            other => Err(conversion(column, "timestamp", other)),
        }
    }
}

fn conversion(column: &str, expected: &str, found: Option<&SqlValue>) -> DbError {
    DbError::Conversion {
        message: format!("column '{column}' is not {expected} (found {found:?})"),
    }
}

/// Narrow store interface the rest of the pipeline talks through.
///
/// Queries are rendered to SQL text by the caller; the store only runs them.
/// This keeps the sync and registration logic testable against an in-memory
/// fake without a live Postgres.
#[async_trait]
pub trait Database: Send + Sync {
    /// Runs one or more statements that return no rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the statement fails.
    async fn execute(&self, statement: &str) -> Result<(), DbError>;

    /// Runs a query and returns every matching row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    async fn fetch_all(&self, query: &str) -> Result<Vec<Row>, DbError>;

    /// Runs a query expected to match exactly one row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] when no row matches, or [`DbError`] if
    /// the query fails.
    async fn fetch_one(&self, query: &str) -> Result<Row, DbError>;
}
