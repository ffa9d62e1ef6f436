//! Query request assembled from URL query parameters.

use std::collections::BTreeMap;

use chrono::FixedOffset;

use crate::error::ValidationError;
use crate::server::query::time::parse_form_time;

pub const PARAM_BREAKDOWN: &str = "breakdown";
pub const PARAM_TIME_START: &str = "time_start";
pub const PARAM_TIME_END: &str = "time_end";
/// Form bookkeeping parameters; never filters.
pub const FILTER_META_PREFIX: &str = "filter_field";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Ordered; defines SELECT, GROUP BY and key order.
    pub breakdown: Vec<String>,
    /// Unix seconds, inclusive.
    pub start: i64,
    pub end: i64,
    /// Field name -> accepted values.
    pub filters: BTreeMap<String, Vec<String>>,
}

fn is_reserved(key: &str) -> bool {
    key == PARAM_BREAKDOWN || key == PARAM_TIME_START || key == PARAM_TIME_END || key.starts_with(FILTER_META_PREFIX)
}

impl QueryRequest {
    /// Validate and collect parameters. Repeated keys accumulate values in
    /// order; empty values are ignored.
    pub fn from_params(params: &[(String, String)], offset: &FixedOffset) -> Result<Self, ValidationError> {
        let values = |key: &str| -> Vec<&str> {
            params.iter().filter(|(k, v)| k == key && !v.trim().is_empty()).map(|(_, v)| v.trim()).collect()
        };

        let breakdown: Vec<String> = values(PARAM_BREAKDOWN).into_iter().map(str::to_string).collect();
        if breakdown.is_empty() {
            return Err(ValidationError::MissingBreakdown);
        }
        let start_raw = *values(PARAM_TIME_START).first().ok_or(ValidationError::MissingStartTime)?;
        let end_raw = *values(PARAM_TIME_END).first().ok_or(ValidationError::MissingEndTime)?;
        let start = parse_form_time(start_raw, offset)?;
        let end = parse_form_time(end_raw, offset)?;
        if start > end {
            return Err(ValidationError::InvertedTimeRange { start, end });
        }

        let mut filters: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in params {
            if is_reserved(k) || v.is_empty() {
                continue;
            }
            filters.entry(k.clone()).or_default().push(v.clone());
        }
        Ok(Self { breakdown, start, end, filters })
    }
}
