//! Aggregate statement synthesis.
//!
//! Shape:
//! `SELECT timestamp AS t, <expr> AS <field>..., <throughput> FROM <db>.flows
//!  WHERE t BETWEEN .. AND .. [AND <filters>] GROUP BY t, <field>... ORDER BY t`
//!
//! The throughput aggregate is always the last, unaliased column; the pivot
//! step relies on that position. Filter values are bound parameters.

use std::collections::HashSet;

use tracing::warn;

use crate::catalog::Catalog;
use crate::error::ResolutionError;
use crate::server::query::request::QueryRequest;
use crate::server::query::resolve::{FieldKind, FieldResolver};
use crate::storage::flow::FLOWS_TABLE;
use crate::storage::{BoundQuery, QueryParam};

pub const TIME_COLUMN: &str = "timestamp";
pub const BUCKET_ALIAS: &str = "t";
/// Flow records are exported in ten second buckets.
pub const BUCKET_SECONDS: u64 = 10;

/// Bytes * sample rate over one bucket, as bits per second.
pub fn throughput_expr() -> String {
    format!("sum(size * samplerate) * 8 / {}", BUCKET_SECONDS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Breakdown,
    Filter,
}

/// A breakdown field or filter left out of the statement, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedField {
    pub field: String,
    pub role: FieldRole,
    pub reason: ResolutionError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub query: BoundQuery,
    /// Breakdown fields that made it into SELECT/GROUP BY, in order.
    pub breakdown: Vec<String>,
    pub dropped: Vec<DroppedField>,
}

pub struct QueryBuilder<'a> {
    catalog: &'a Catalog,
    database: &'a str,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(catalog: &'a Catalog, database: &'a str) -> Self { Self { catalog, database } }

    pub fn build(&self, req: &QueryRequest) -> BuiltQuery {
        let resolver = FieldResolver::new(self.catalog);
        let mut dropped = Vec::new();
        let mut drop_field = |field: &str, role: FieldRole, reason: ResolutionError| {
            warn!(target: "flowlens::query", field = %field, role = ?role, reason = %reason, "ignoring field");
            dropped.push(DroppedField { field: field.to_string(), role, reason });
        };

        let mut select = vec![format!("{} AS {}", TIME_COLUMN, BUCKET_ALIAS)];
        let mut group_by = vec![BUCKET_ALIAS.to_string()];
        let mut breakdown = Vec::with_capacity(req.breakdown.len());
        let mut seen = HashSet::new();
        for name in &req.breakdown {
            if !seen.insert(name.as_str()) {
                drop_field(name, FieldRole::Breakdown, ResolutionError::DuplicateBreakdown(name.clone()));
                continue;
            }
            match resolver.resolve_known(name) {
                Ok(r) => {
                    select.push(format!("{} AS {}", r.expr, name));
                    group_by.push(name.clone());
                    breakdown.push(name.clone());
                }
                Err(e) => drop_field(name, FieldRole::Breakdown, e),
            }
        }
        select.push(throughput_expr());

        let mut params: Vec<QueryParam> = Vec::new();
        let mut conditions = vec![format!("{} BETWEEN toDateTime({}) AND toDateTime({})", BUCKET_ALIAS, req.start, req.end)];
        for (name, values) in &req.filters {
            let r = match resolver.resolve_known(name) {
                Ok(r) => r,
                Err(e) => {
                    drop_field(name, FieldRole::Filter, e);
                    continue;
                }
            };
            let ty = match r.kind {
                FieldKind::Column => self.catalog.field(name).map(|f| f.column_type.as_str()).unwrap_or("String"),
                FieldKind::Virtual | FieldKind::Dictionary => "String",
            };
            let placeholders: Vec<String> = values.iter().map(|v| BoundQuery::bind(&mut params, ty, v)).collect();
            match placeholders.as_slice() {
                [] => {}
                [one] => conditions.push(format!("{} = {}", r.expr, one)),
                many => conditions.push(format!("{} IN ({})", r.expr, many.join(", "))),
            }
        }

        let sql = format!(
            "SELECT {} FROM {}.{} WHERE {} GROUP BY {} ORDER BY {}",
            select.join(", "),
            self.database,
            FLOWS_TABLE,
            conditions.join(" AND "),
            group_by.join(", "),
            BUCKET_ALIAS
        );
        BuiltQuery { query: BoundQuery { sql, params }, breakdown, dropped }
    }
}
