//!
//! flowlens storage module
//! -----------------------
//! The columnar store is an external collaborator. This module defines the
//! narrow interface the query engine needs from it (`FlowStore`), the shapes
//! exchanged over that interface (`BoundQuery` in, `RowSet` out) and two
//! implementations: the ClickHouse HTTP gateway and a canned in-memory store.
//!
//! Statements are always text plus bound parameters; user supplied values
//! never become part of the SQL string.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub mod clickhouse;
pub mod fixture;
pub mod flow;

pub use flow::FlowRecord;

/// Name and declared ClickHouse type of one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl ColumnMeta {
    pub fn new(name: &str, ty: &str) -> Self { Self { name: name.into(), ty: ty.into() } }
}

/// Rows returned by a query, in the shape of ClickHouse's `JSONCompact` output.
/// Cells stay as raw JSON until decoded against their column's declared type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    #[serde(rename = "meta")]
    pub columns: Vec<ColumnMeta>,
    #[serde(rename = "data", default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl RowSet {
    pub fn column_names(&self) -> Vec<&str> { self.columns.iter().map(|c| c.name.as_str()).collect() }
}

/// A value bound to a `{name:Type}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryParam {
    pub name: String,
    pub ty: String,
    pub value: String,
}

/// SQL text with ClickHouse-style `{name:Type}` placeholders and their values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl BoundQuery {
    pub fn new(sql: impl Into<String>) -> Self { Self { sql: sql.into(), params: Vec::new() } }

    /// Register `value` under a fresh parameter name and return its placeholder.
    pub fn bind(params: &mut Vec<QueryParam>, ty: &str, value: &str) -> String {
        let name = format!("p{}", params.len());
        let placeholder = format!("{{{}:{}}}", name, ty);
        params.push(QueryParam { name, ty: ty.to_string(), value: value.to_string() });
        placeholder
    }
}

/// What the query engine needs from the columnar store.
///
/// Methods return boxed futures so the trait stays object safe; handlers hold
/// the store as `Arc<dyn FlowStore>`. Implementations must be safe to call
/// concurrently; the core adds no locking of its own.
pub trait FlowStore: Send + Sync {
    /// Database holding the `flows` table.
    fn database(&self) -> &str;

    fn query<'a>(&'a self, query: &'a BoundQuery) -> BoxFuture<'a, Result<RowSet, StoreError>>;

    /// Run a statement that returns no rows (DDL).
    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Column names of a dictionary, key column(s) first.
    fn describe_dictionary<'a>(&'a self, dict: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>>;

    /// All values of one dictionary column rendered as text.
    fn dictionary_values<'a>(&'a self, dict: &'a str, column: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>>;

    fn insert_flows<'a>(&'a self, flows: &'a [FlowRecord]) -> BoxFuture<'a, Result<(), StoreError>>;
}

pub type SharedStore = Arc<dyn FlowStore>;
