//! Query execution and row pivoting.
//!
//! Result layout contract with the builder: column 0 is the bucket timestamp,
//! the last column is the throughput aggregate, everything in between is a
//! breakdown value. Each row folds into the series as
//! (timestamp, `label=value;label=value`, aggregate).

pub mod decode;

use std::time::Duration;

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::error::{DecodeError, ExecError};
use crate::server::series::Series;
use crate::storage::{BoundQuery, FlowStore, RowSet};
use decode::{decode_cell, CellValue, ColumnKind};

pub struct Executor<'a> {
    store: &'a dyn FlowStore,
    catalog: &'a Catalog,
    deadline: Duration,
}

impl<'a> Executor<'a> {
    pub fn new(store: &'a dyn FlowStore, catalog: &'a Catalog, deadline: Duration) -> Self {
        Self { store, catalog, deadline }
    }

    /// Run `query` and pivot its rows. The store call is abandoned once the
    /// deadline passes or when this future is dropped.
    pub async fn execute(&self, query: &BoundQuery) -> Result<Series, ExecError> {
        info!(target: "flowlens::query", sql = %query.sql, params = query.params.len(), "executing");
        let rows = tokio::time::timeout(self.deadline, self.store.query(query))
            .await
            .map_err(|_| ExecError::Timeout(self.deadline))??;
        let series = pivot(self.catalog, &rows)?;
        debug!(target: "flowlens::query", rows = rows.rows.len(), timestamps = series.len(), "pivoted");
        Ok(series)
    }
}

/// Fold a result set into a series.
pub fn pivot(catalog: &Catalog, rows: &RowSet) -> Result<Series, DecodeError> {
    let width = rows.columns.len();
    if width < 2 {
        return Err(DecodeError::TooFewColumns(width));
    }
    let kinds = rows.columns.iter().map(ColumnKind::for_column).collect::<Result<Vec<_>, _>>()?;
    let labels: Vec<String> = rows.columns[1..width - 1].iter().map(|c| catalog.readable_label(&c.name)).collect();
    let time_col = &rows.columns[0];
    let value_col = &rows.columns[width - 1];

    let mut series = Series::new();
    for (i, row) in rows.rows.iter().enumerate() {
        if row.len() != width {
            return Err(DecodeError::RowWidth { row: i, got: row.len(), expected: width });
        }
        let ts = match decode_cell(time_col, kinds[0], &row[0])? {
            CellValue::Time(t) => t,
            CellValue::UInt(t) => t as i64,
            other => return Err(unexpected(&time_col.name, &other, "timestamp")),
        };
        let value = match decode_cell(value_col, kinds[width - 1], &row[width - 1])? {
            CellValue::UInt(v) => v,
            // Saturating truncation; negative and NaN become 0.
            CellValue::Float(v) => v as u64,
            other => return Err(unexpected(&value_col.name, &other, "number")),
        };
        let mut parts = Vec::with_capacity(labels.len());
        for (j, label) in labels.iter().enumerate() {
            let col = j + 1;
            let cell = decode_cell(&rows.columns[col], kinds[col], &row[col])?;
            parts.push(format!("{}={}", label, cell));
        }
        let key = parts.join(";");
        if let Some(prev) = series.insert(ts, key, value) {
            debug!(target: "flowlens::query", ts, prev, value, "duplicate series point overwritten");
        }
    }
    Ok(series)
}

fn unexpected(column: &str, got: &CellValue, expected: &'static str) -> DecodeError {
    DecodeError::UnexpectedKind { column: column.to_string(), kind: got.kind_name(), expected }
}
