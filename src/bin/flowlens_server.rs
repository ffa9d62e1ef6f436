//!
//! flowlens server binary
//! ----------------------
//! Command-line entry point for the flow explorer HTTP server. Supports
//! configuration via CLI flags and environment variables.

use anyhow::Result;
use std::env;

use flowlens::config::{has_flag, ServerConfig};

const HELP: &str = "flowlens Server

USAGE:
  flowlens_server [OPTIONS]

OPTIONS:
  --http-port N              HTTP port (env: FLOWLENS_HTTP_PORT, default 8080)
  --clickhouse-url URL       ClickHouse HTTP interface (env: FLOWLENS_CLICKHOUSE_URL, default http://127.0.0.1:8123)
  --clickhouse-user NAME     (env: FLOWLENS_CLICKHOUSE_USER, default default)
  --clickhouse-password PW   (env: FLOWLENS_CLICKHOUSE_PASSWORD)
  --database NAME            Database holding the flows table (env: FLOWLENS_DATABASE, default default)
  --dicts PATH               YAML dictionary bindings (env: FLOWLENS_DICTS)
  --utc-offset +HH:MM        Offset of form timestamps (env: FLOWLENS_UTC_OFFSET, default +02:00)
  --query-timeout SECS       Per-query deadline (env: FLOWLENS_QUERY_TIMEOUT_SECS, default 30)
";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber with env filter if provided
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?;
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let args: Vec<String> = env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{}", HELP);
        return Ok(());
    }

    let cfg = ServerConfig::from_sources(&args, |k| env::var(k).ok())?;
    tracing::info!(
        target: "startup",
        "flowlens starting: http_port={}, clickhouse={}, database={}, dicts={:?}, utc_offset={}, query_timeout={:?}",
        cfg.http_port, cfg.clickhouse.url, cfg.clickhouse.database, cfg.dicts_path, cfg.utc_offset, cfg.query_timeout
    );
    flowlens::server::run_with_config(cfg).await
}
