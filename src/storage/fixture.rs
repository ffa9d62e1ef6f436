//! Canned in-memory `FlowStore`.
//!
//! Answers every query with one preset `RowSet` and serves dictionaries from
//! memory. Statements and inserted flows are recorded so callers can inspect
//! what reached the store. Used by the test suites and for running the HTTP
//! surface without a ClickHouse server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::storage::{BoundQuery, FlowRecord, FlowStore, RowSet};

#[derive(Debug, Clone, Default)]
struct Dictionary {
    columns: Vec<String>,
    values: HashMap<String, Vec<String>>,
}

#[derive(Clone, Default)]
pub struct StaticStore {
    result: Option<RowSet>,
    failure: Option<String>,
    delay: Option<Duration>,
    dictionaries: HashMap<String, Dictionary>,
    seen: Arc<Mutex<Vec<BoundQuery>>>,
    inserted: Arc<Mutex<Vec<FlowRecord>>>,
}

impl StaticStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_result(mut self, rows: RowSet) -> Self {
        self.result = Some(rows);
        self
    }

    /// Every call fails with a rejected-statement error carrying `msg`.
    pub fn failing(mut self, msg: &str) -> Self {
        self.failure = Some(msg.to_string());
        self
    }

    /// Sleep before answering a query.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_dictionary(mut self, name: &str, columns: &[&str], values: &[(&str, &[&str])]) -> Self {
        let dict = Dictionary {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            values: values.iter().map(|(c, vs)| (c.to_string(), vs.iter().map(|v| v.to_string()).collect())).collect(),
        };
        self.dictionaries.insert(name.to_string(), dict);
        self
    }

    /// Statements received so far, oldest first.
    pub fn seen(&self) -> Vec<BoundQuery> { self.seen.lock().clone() }

    pub fn inserted(&self) -> Vec<FlowRecord> { self.inserted.lock().clone() }

    fn check(&self) -> Result<(), StoreError> {
        match &self.failure {
            Some(msg) => Err(StoreError::Rejected { status: 500, body: msg.clone() }),
            None => Ok(()),
        }
    }

    fn dictionary(&self, name: &str) -> Result<&Dictionary, StoreError> {
        self.dictionaries
            .get(name)
            .ok_or_else(|| StoreError::Rejected { status: 404, body: format!("dictionary {} doesn't exist", name) })
    }
}

impl FlowStore for StaticStore {
    fn database(&self) -> &str { "flowlens" }

    fn query<'a>(&'a self, query: &'a BoundQuery) -> BoxFuture<'a, Result<RowSet, StoreError>> {
        async move {
            self.seen.lock().push(query.clone());
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            self.check()?;
            Ok(self.result.clone().unwrap_or_default())
        }
        .boxed()
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            self.seen.lock().push(BoundQuery::new(sql));
            self.check()
        }
        .boxed()
    }

    fn describe_dictionary<'a>(&'a self, dict: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        async move {
            self.check()?;
            Ok(self.dictionary(dict)?.columns.clone())
        }
        .boxed()
    }

    fn dictionary_values<'a>(&'a self, dict: &'a str, column: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        async move {
            self.check()?;
            let d = self.dictionary(dict)?;
            d.values
                .get(column)
                .cloned()
                .ok_or_else(|| StoreError::Rejected { status: 400, body: format!("no column {} in {}", column, dict) })
        }
        .boxed()
    }

    fn insert_flows<'a>(&'a self, flows: &'a [FlowRecord]) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            self.check()?;
            self.inserted.lock().extend_from_slice(flows);
            Ok(())
        }
        .boxed()
    }
}
