//! Typed decoding of result cells.
//!
//! Each column's declared ClickHouse type selects a `ColumnKind` up front;
//! every cell of that column is then decoded into the matching `CellValue`.
//! Types outside the supported set fail the whole result.

use std::fmt;
use std::net::IpAddr;

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::error::DecodeError;
use crate::storage::ColumnMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    UInt,
    Float,
    Text,
    Ip,
    Time,
}

impl ColumnKind {
    /// Kind for a declared type, looking through `Nullable(..)` and `LowCardinality(..)`.
    pub fn from_type(ty: &str) -> Option<ColumnKind> {
        let ty = unwrap_modifiers(ty.trim());
        match ty {
            "UInt8" | "UInt16" | "UInt32" | "UInt64" => Some(ColumnKind::UInt),
            "Float32" | "Float64" => Some(ColumnKind::Float),
            "String" => Some(ColumnKind::Text),
            "IPv4" | "IPv6" => Some(ColumnKind::Ip),
            "DateTime" => Some(ColumnKind::Time),
            _ if ty.starts_with("FixedString(") => Some(ColumnKind::Text),
            _ if ty.starts_with("DateTime(") => Some(ColumnKind::Time),
            _ => None,
        }
    }

    pub fn for_column(col: &ColumnMeta) -> Result<ColumnKind, DecodeError> {
        Self::from_type(&col.ty).ok_or_else(|| DecodeError::UnsupportedType { column: col.name.clone(), ty: col.ty.clone() })
    }
}

fn unwrap_modifiers(mut ty: &str) -> &str {
    loop {
        let inner = ["Nullable(", "LowCardinality("]
            .iter()
            .find_map(|w| ty.strip_prefix(w).and_then(|rest| rest.strip_suffix(')')));
        match inner {
            Some(i) => ty = i,
            None => return ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    UInt(u64),
    Float(f64),
    Text(String),
    Ip(IpAddr),
    /// Unix seconds.
    Time(i64),
}

impl CellValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            CellValue::Null => "null",
            CellValue::UInt(_) => "unsigned integer",
            CellValue::Float(_) => "float",
            CellValue::Text(_) => "text",
            CellValue::Ip(_) => "ip address",
            CellValue::Time(_) => "timestamp",
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::UInt(v) => write!(f, "{}", v),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Text(s) => f.write_str(s),
            // IPv4-mapped IPv6 addresses print as plain dotted quads.
            CellValue::Ip(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                Some(v4) => write!(f, "{}", v4),
                None => write!(f, "{}", v6),
            },
            CellValue::Ip(IpAddr::V4(v4)) => write!(f, "{}", v4),
            CellValue::Time(t) => write!(f, "{}", t),
        }
    }
}

pub fn decode_cell(col: &ColumnMeta, kind: ColumnKind, value: &Value) -> Result<CellValue, DecodeError> {
    let bad = || DecodeError::BadValue { column: col.name.clone(), ty: col.ty.clone(), value: value.to_string() };
    if value.is_null() {
        return Ok(CellValue::Null);
    }
    match kind {
        ColumnKind::UInt => match value {
            Value::Number(n) => n.as_u64().map(CellValue::UInt).ok_or_else(bad),
            Value::String(s) => s.parse().map(CellValue::UInt).map_err(|_| bad()),
            _ => Err(bad()),
        },
        ColumnKind::Float => match value {
            Value::Number(n) => n.as_f64().map(CellValue::Float).ok_or_else(bad),
            Value::String(s) => s.parse().map(CellValue::Float).map_err(|_| bad()),
            _ => Err(bad()),
        },
        ColumnKind::Text => match value {
            Value::String(s) => Ok(CellValue::Text(s.clone())),
            _ => Err(bad()),
        },
        ColumnKind::Ip => match value {
            Value::String(s) => s.parse().map(CellValue::Ip).map_err(|_| bad()),
            _ => Err(bad()),
        },
        ColumnKind::Time => match value {
            Value::Number(n) => n.as_i64().map(CellValue::Time).ok_or_else(bad),
            Value::String(s) => match s.parse::<i64>() {
                Ok(t) => Ok(CellValue::Time(t)),
                Err(_) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .map(|dt| CellValue::Time(dt.and_utc().timestamp()))
                    .map_err(|_| bad()),
            },
            _ => Err(bad()),
        },
    }
}
