//!
//! flowlens configuration
//! ----------------------
//! Server settings come from built-in defaults, overridden by `FLOWLENS_*`
//! environment variables, overridden by command-line flags. Dictionary
//! bindings live in a separate YAML file (`--dicts PATH`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;

use crate::catalog::DictBinding;
use crate::server::query::time::parse_utc_offset;
use crate::storage::clickhouse::ClickHouseConfig;

pub const DEFAULT_HTTP_PORT: u16 = 8080;
/// Offset assumed for form timestamps unless configured.
pub const DEFAULT_UTC_OFFSET: &str = "+02:00";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    pub clickhouse: ClickHouseConfig,
    pub dicts_path: Option<PathBuf>,
    /// Offset applied to `time_start`/`time_end` wall-clock values.
    pub utc_offset: FixedOffset,
    pub query_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            clickhouse: ClickHouseConfig::default(),
            dicts_path: None,
            utc_offset: parse_utc_offset(DEFAULT_UTC_OFFSET).unwrap_or_else(|_| Utc.fix()),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

impl ServerConfig {
    /// Layer environment and CLI flags over the defaults.
    /// `env` is the variable lookup, normally `|k| std::env::var(k).ok()`.
    pub fn from_sources<F>(args: &[String], env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |flag: &str, var: &str| arg_value(args, flag).or_else(|| env(var));
        let mut cfg = ServerConfig::default();

        if let Some(v) = pick("--http-port", "FLOWLENS_HTTP_PORT") {
            cfg.http_port = v.parse().with_context(|| format!("invalid HTTP port {:?}", v))?;
        }
        if let Some(v) = pick("--clickhouse-url", "FLOWLENS_CLICKHOUSE_URL") { cfg.clickhouse.url = v; }
        if let Some(v) = pick("--clickhouse-user", "FLOWLENS_CLICKHOUSE_USER") { cfg.clickhouse.user = v; }
        if let Some(v) = pick("--clickhouse-password", "FLOWLENS_CLICKHOUSE_PASSWORD") { cfg.clickhouse.password = v; }
        if let Some(v) = pick("--database", "FLOWLENS_DATABASE") {
            if !crate::ident::is_safe_identifier(&v) {
                return Err(anyhow!("invalid database name {:?}", v));
            }
            cfg.clickhouse.database = v;
        }
        if let Some(v) = pick("--dicts", "FLOWLENS_DICTS") { cfg.dicts_path = Some(PathBuf::from(v)); }
        if let Some(v) = pick("--utc-offset", "FLOWLENS_UTC_OFFSET") {
            cfg.utc_offset = parse_utc_offset(&v).with_context(|| format!("invalid UTC offset {:?}", v))?;
        }
        if let Some(v) = pick("--query-timeout", "FLOWLENS_QUERY_TIMEOUT_SECS") {
            let secs: u64 = v.parse().with_context(|| format!("invalid query timeout {:?}", v))?;
            cfg.query_timeout = Duration::from_secs(secs);
        }
        Ok(cfg)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DictsFile {
    Wrapped { dicts: Vec<DictBinding> },
    Bare(Vec<DictBinding>),
}

/// Parse dictionary bindings from YAML. Accepts either a bare list or a
/// document with a top-level `dicts:` list.
pub fn parse_dicts(yaml: &str) -> Result<Vec<DictBinding>> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let file: DictsFile = serde_yaml::from_str(yaml).context("invalid dict configuration")?;
    Ok(match file {
        DictsFile::Wrapped { dicts } => dicts,
        DictsFile::Bare(dicts) => dicts,
    })
}

pub fn load_dicts(path: &Path) -> Result<Vec<DictBinding>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("unable to read {}", path.display()))?;
    parse_dicts(&text).with_context(|| format!("while loading {}", path.display()))
}
