//! ClickHouse gateway over the HTTP interface.
//!
//! Every statement is POSTed as the request body; bound parameters travel as
//! `param_<name>` query arguments and are substituted server side. Result sets
//! are requested as `JSONCompact` with DateTime rendered as unix seconds.

use std::time::Duration;

use anyhow::Context;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::Url;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::ident;
use crate::storage::flow::{CREATE_FLOWS_TABLE, FLOWS_TABLE};
use crate::storage::{BoundQuery, FlowRecord, FlowStore, RowSet};

#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Transport level read timeout; requests are also bounded by the caller.
    pub timeout: Duration,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8123".to_string(),
            user: "default".to_string(),
            password: String::new(),
            database: "default".to_string(),
            timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Clone)]
pub struct ClickHouseGateway {
    client: reqwest::Client,
    base: Url,
    user: String,
    password: String,
    database: String,
}

impl ClickHouseGateway {
    pub fn new(cfg: &ClickHouseConfig) -> anyhow::Result<Self> {
        let base = Url::parse(&cfg.url).with_context(|| format!("invalid ClickHouse URL {:?}", cfg.url))?;
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("unable to build HTTP client")?;
        Ok(Self { client, base, user: cfg.user.clone(), password: cfg.password.clone(), database: cfg.database.clone() })
    }

    /// Connect, check the server answers and create the `flows` table if missing.
    pub async fn connect(cfg: &ClickHouseConfig) -> anyhow::Result<Self> {
        let gw = Self::new(cfg)?;
        gw.ping().await.with_context(|| format!("ClickHouse at {} is not reachable", cfg.url))?;
        gw.run(CREATE_FLOWS_TABLE.to_string(), &[]).await.context("unable to create schema")?;
        info!(target: "startup", url = %cfg.url, database = %cfg.database, "connected to ClickHouse");
        Ok(gw)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let url = self.base.join("ping").map_err(|e| StoreError::Malformed(e.to_string()))?;
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            return Err(StoreError::Rejected { status, body: resp.text().await.unwrap_or_default() });
        }
        Ok(())
    }

    async fn run(&self, sql: String, extra: &[(String, String)]) -> Result<String, StoreError> {
        let mut args: Vec<(String, String)> = vec![
            ("database".to_string(), self.database.clone()),
            ("date_time_output_format".to_string(), "unix_timestamp".to_string()),
        ];
        args.extend_from_slice(extra);
        let resp = self
            .client
            .post(self.base.clone())
            .query(&args)
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .body(sql)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(StoreError::Rejected { status: status.as_u16(), body: body.trim().to_string() });
        }
        Ok(body)
    }

    async fn rows(&self, sql: String, extra: &[(String, String)]) -> Result<RowSet, StoreError> {
        let body = self.run(format!("{} FORMAT JSONCompact", sql), extra).await?;
        serde_json::from_str(&body).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    /// First column of every row as text.
    async fn first_column(&self, sql: String) -> Result<Vec<String>, StoreError> {
        let rs = self.rows(sql, &[]).await?;
        rs.rows
            .iter()
            .map(|r| match r.first() {
                Some(serde_json::Value::String(s)) => Ok(s.clone()),
                Some(other) => Ok(other.to_string()),
                None => Err(StoreError::Malformed("empty row".to_string())),
            })
            .collect()
    }
}

impl FlowStore for ClickHouseGateway {
    fn database(&self) -> &str { &self.database }

    fn query<'a>(&'a self, query: &'a BoundQuery) -> BoxFuture<'a, Result<RowSet, StoreError>> {
        async move {
            let params: Vec<(String, String)> = query
                .params
                .iter()
                .map(|p| (format!("param_{}", p.name), p.value.clone()))
                .collect();
            debug!(target: "flowlens::store", sql = %query.sql, params = params.len(), "query");
            self.rows(query.sql.clone(), &params).await
        }
        .boxed()
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        async move { self.run(sql.to_string(), &[]).await.map(|_| ()) }.boxed()
    }

    fn describe_dictionary<'a>(&'a self, dict: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        async move {
            self.first_column(format!("DESCRIBE TABLE dictionary({})", ident::quote_literal(dict))).await
        }
        .boxed()
    }

    fn dictionary_values<'a>(&'a self, dict: &'a str, column: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        async move {
            if !ident::is_safe_identifier(column) {
                return Err(StoreError::Malformed(format!("invalid column name {:?}", column)));
            }
            let sql = format!("SELECT DISTINCT toString(`{}`) FROM dictionary({})", column, ident::quote_literal(dict));
            self.first_column(sql).await
        }
        .boxed()
    }

    fn insert_flows<'a>(&'a self, flows: &'a [FlowRecord]) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            if flows.is_empty() {
                return Ok(());
            }
            let mut body = format!("INSERT INTO {} FORMAT JSONEachRow\n", FLOWS_TABLE);
            for f in flows {
                let line = serde_json::to_string(f).map_err(|e| StoreError::Malformed(e.to_string()))?;
                body.push_str(&line);
                body.push('\n');
            }
            self.run(body, &[]).await?;
            debug!(target: "flowlens::store", rows = flows.len(), "inserted flows");
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::extract::RawQuery;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::Router;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;

    /// (query string, body) of every statement the fake server received.
    type Received = Arc<Mutex<Vec<(String, String)>>>;

    /// Serve `reply` with `status` for every POSTed statement on an ephemeral port.
    async fn fake_clickhouse(status: StatusCode, reply: &'static str) -> (ClickHouseConfig, Received) {
        let received: Received = Arc::default();
        let log = received.clone();
        let app = Router::new()
            .route("/ping", get(|| async { "Ok.\n" }))
            .route(
                "/",
                post(move |RawQuery(q): RawQuery, body: String| {
                    let log = log.clone();
                    async move {
                        log.lock().push((q.unwrap_or_default(), body));
                        (status, reply)
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        let cfg = ClickHouseConfig { url: format!("http://{}/", addr), timeout: Duration::from_secs(5), ..Default::default() };
        (cfg, received)
    }

    fn flow(asn: u32) -> FlowRecord {
        FlowRecord {
            agent: "10.0.0.1".parse().unwrap(),
            int_in: 1,
            int_out: 2,
            src_addr: "192.0.2.1".parse().unwrap(),
            dst_addr: "192.0.2.2".parse().unwrap(),
            src_prefix_addr: None,
            src_prefix_len: 0,
            dst_prefix_addr: None,
            dst_prefix_len: 0,
            src_asn: asn,
            dst_asn: 0,
            protocol: 6,
            src_port: 443,
            dst_port: 50000,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
            size: 1500,
            packets: 1,
            samplerate: 100,
        }
    }

    const ONE_ROW: &str = r#"{"meta":[{"name":"t","type":"DateTime"},{"name":"v","type":"Float64"}],"data":[[100,2.5]],"rows":1}"#;

    #[test]
    fn rejects_bad_url() {
        let cfg = ClickHouseConfig { url: "not a url".into(), ..Default::default() };
        assert!(ClickHouseGateway::new(&cfg).is_err());
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let cfg = ClickHouseConfig { url: "http://127.0.0.1:9/".into(), timeout: Duration::from_secs(2), ..Default::default() };
        let gw = ClickHouseGateway::new(&cfg).unwrap();
        let err = gw.query(&BoundQuery::new("SELECT 1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
    }

    #[tokio::test]
    async fn query_sends_bound_params_and_parses_rows() {
        let (cfg, received) = fake_clickhouse(StatusCode::OK, ONE_ROW).await;
        let gw = ClickHouseGateway::new(&cfg).unwrap();
        let mut params = Vec::new();
        let placeholder = BoundQuery::bind(&mut params, "String", "x' &y=1");
        let q = BoundQuery { sql: format!("SELECT {}", placeholder), params };

        let rs = gw.query(&q).await.unwrap();
        assert_eq!(rs.column_names(), vec!["t", "v"]);
        assert_eq!(rs.rows, vec![vec![serde_json::json!(100), serde_json::json!(2.5)]]);

        let got = received.lock().clone();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, "database=default&date_time_output_format=unix_timestamp&param_p0=x%27+%26y%3D1");
        assert_eq!(got[0].1, "SELECT {p0:String} FORMAT JSONCompact");
    }

    #[tokio::test]
    async fn error_status_is_rejected_with_body() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::NOT_FOUND, StatusCode::INTERNAL_SERVER_ERROR] {
            let (cfg, _) = fake_clickhouse(status, "Code: 60. DB::Exception: Table default.flows doesn't exist\n").await;
            let gw = ClickHouseGateway::new(&cfg).unwrap();
            match gw.query(&BoundQuery::new("SELECT 1")).await {
                Err(StoreError::Rejected { status: got, body }) => {
                    assert_eq!(got, status.as_u16());
                    assert_eq!(body, "Code: 60. DB::Exception: Table default.flows doesn't exist");
                }
                other => panic!("expected rejection, got {:?}", other.map(|r| r.rows.len())),
            }
        }
    }

    #[tokio::test]
    async fn unparsable_body_is_malformed() {
        let (cfg, _) = fake_clickhouse(StatusCode::OK, "1\t2\n").await;
        let gw = ClickHouseGateway::new(&cfg).unwrap();
        assert!(matches!(gw.query(&BoundQuery::new("SELECT 1")).await, Err(StoreError::Malformed(_))));
    }

    #[tokio::test]
    async fn insert_writes_json_each_row() {
        let (cfg, received) = fake_clickhouse(StatusCode::OK, "").await;
        let gw = ClickHouseGateway::new(&cfg).unwrap();
        gw.insert_flows(&[]).await.unwrap();
        assert!(received.lock().is_empty());

        gw.insert_flows(&[flow(65001), flow(65002)]).await.unwrap();
        let got = received.lock().clone();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, "database=default&date_time_output_format=unix_timestamp");
        let mut lines = got[0].1.lines();
        assert_eq!(lines.next(), Some("INSERT INTO flows FORMAT JSONEachRow"));
        let asns: Vec<u64> = lines
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["src_asn"].as_u64().unwrap())
            .collect();
        assert_eq!(asns, vec![65001, 65002]);
    }

    #[tokio::test]
    async fn dictionary_statements() {
        let reply = r#"{"meta":[{"name":"name","type":"String"},{"name":"type","type":"String"}],"data":[["asn","UInt64"],["name","String"]]}"#;
        let (cfg, received) = fake_clickhouse(StatusCode::OK, reply).await;
        let gw = ClickHouseGateway::new(&cfg).unwrap();
        assert_eq!(gw.describe_dictionary("asns").await.unwrap(), vec!["asn", "name"]);
        gw.dictionary_values("asns", "name").await.unwrap();
        assert!(matches!(gw.dictionary_values("asns", "na`me").await, Err(StoreError::Malformed(_))));

        let sql: Vec<String> = received.lock().iter().map(|(_, b)| b.clone()).collect();
        assert_eq!(
            sql,
            vec![
                "DESCRIBE TABLE dictionary('asns') FORMAT JSONCompact",
                "SELECT DISTINCT toString(`name`) FROM dictionary('asns') FORMAT JSONCompact",
            ]
        );
    }

    #[tokio::test]
    async fn connect_pings_and_creates_schema() {
        let (cfg, received) = fake_clickhouse(StatusCode::OK, "").await;
        ClickHouseGateway::connect(&cfg).await.unwrap();
        let got = received.lock().clone();
        assert_eq!(got.len(), 1);
        assert!(got[0].1.contains("CREATE TABLE IF NOT EXISTS flows"));
    }
}
