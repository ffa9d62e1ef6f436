//! Sparse time series keyed by composite breakdown key, and its CSV form.
//!
//! CSV layout: header `t,<key>...` with keys sorted lexicographically, then
//! one row per timestamp in ascending order. Missing (timestamp, key) cells
//! are written as `0`. Identical series always render to identical bytes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const TIME_HEADER: &str = "t";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Series {
    points: BTreeMap<i64, HashMap<String, u64>>,
}

impl Series {
    pub fn new() -> Self { Self::default() }

    /// Store `value` for (`ts`, `key`); returns the value it replaced, if any.
    pub fn insert(&mut self, ts: i64, key: String, value: u64) -> Option<u64> {
        self.points.entry(ts).or_default().insert(key, value)
    }

    pub fn get(&self, ts: i64, key: &str) -> Option<u64> {
        self.points.get(&ts).and_then(|m| m.get(key)).copied()
    }

    /// Distinct keys over all timestamps, sorted.
    pub fn keys(&self) -> BTreeSet<&str> {
        self.points.values().flat_map(|m| m.keys().map(String::as_str)).collect()
    }

    pub fn is_empty(&self) -> bool { self.points.is_empty() }

    pub fn len(&self) -> usize { self.points.len() }

    pub fn to_csv(&self) -> Vec<u8> {
        let keys: Vec<&str> = self.keys().into_iter().collect();
        let mut out = String::new();
        out.push_str(TIME_HEADER);
        for k in &keys {
            out.push(',');
            push_field(&mut out, k);
        }
        out.push('\n');
        for (ts, values) in &self.points {
            out.push_str(&ts.to_string());
            for k in &keys {
                out.push(',');
                out.push_str(&values.get(*k).copied().unwrap_or(0).to_string());
            }
            out.push('\n');
        }
        out.into_bytes()
    }
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}
