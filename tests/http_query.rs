use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::json;
use tower::ServiceExt;

use flowlens::catalog::{Catalog, DictBinding};
use flowlens::server::query::time::parse_utc_offset;
use flowlens::server::{router, AppState, DROPPED_FIELDS_HEADER};
use flowlens::storage::fixture::StaticStore;
use flowlens::storage::{ColumnMeta, RowSet};

const AGG: &str = "sum(size * samplerate) * 8 / 10";

fn asn_rows(rows: Vec<Vec<serde_json::Value>>) -> RowSet {
    RowSet {
        columns: vec![ColumnMeta::new("t", "DateTime"), ColumnMeta::new("src_asn", "UInt32"), ColumnMeta::new(AGG, "Float64")],
        rows,
    }
}

fn app(store: StaticStore) -> Router {
    let catalog = Catalog::flows(vec![DictBinding {
        field: "src_asn".into(),
        dict: "asns".into(),
        expr: "toUInt64(%s)".into(),
        keys: vec![],
    }])
    .unwrap();
    let state = AppState::new(catalog, Arc::new(store), parse_utc_offset("+02:00").unwrap(), Duration::from_secs(5));
    router(state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
    let resp = app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap()).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8(body.to_vec()).unwrap())
}

const RANGE: &str = "time_start=2024-01-01T10:00&time_end=2024-01-01T11:00";

#[tokio::test]
async fn empty_query_string_is_a_no_op() {
    let store = StaticStore::new();
    let (status, _, body) = get(app(store.clone()), "/query").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert!(store.seen().is_empty());
}

#[tokio::test]
async fn breakdown_by_asn_returns_csv() {
    let store = StaticStore::new().with_result(asn_rows(vec![
        vec![json!(100), json!(65001), json!(10.0)],
        vec![json!(100), json!(65002), json!(20.0)],
    ]));
    let (status, headers, body) = get(app(store.clone()), &format!("/query?breakdown=src_asn&{}", RANGE)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "text/csv; charset=utf-8");
    assert_eq!(body, "t,Src.AS=65001,Src.AS=65002\n100,10,20\n");

    let seen = store.seen();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].sql.starts_with("SELECT timestamp AS t, src_asn AS src_asn, sum(size * samplerate) * 8 / 10 FROM flowlens.flows"));
    assert!(seen[0].sql.contains("t BETWEEN toDateTime(1704096000) AND toDateTime(1704099600)"));
    assert!(seen[0].sql.ends_with("GROUP BY t, src_asn ORDER BY t"));
}

#[tokio::test]
async fn distinct_timestamps_are_zero_filled() {
    let store = StaticStore::new().with_result(asn_rows(vec![
        vec![json!(100), json!(1), json!(5.0)],
        vec![json!(200), json!(2), json!(6.0)],
    ]));
    let (_, _, body) = get(app(store), &format!("/query?breakdown=src_asn&{}", RANGE)).await;
    assert_eq!(body, "t,Src.AS=1,Src.AS=2\n100,5,0\n200,0,6\n");
}

#[tokio::test]
async fn missing_breakdown_never_reaches_the_store() {
    let store = StaticStore::new();
    let (status, _, body) = get(app(store.clone()), &format!("/query?{}", RANGE)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
    assert!(store.seen().is_empty());
}

#[tokio::test]
async fn invalid_time_range_is_a_server_error() {
    let store = StaticStore::new();
    for uri in [
        "/query?breakdown=src_asn&time_start=garbage&time_end=2024-01-01T11:00",
        "/query?breakdown=src_asn&time_start=2024-01-01T10:00",
        "/query?breakdown=src_asn&time_start=2024-01-01T12:00&time_end=2024-01-01T11:00",
    ] {
        let (status, _, body) = get(app(store.clone()), uri).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{}", uri);
        assert!(body.is_empty());
    }
    assert!(store.seen().is_empty());
}

#[tokio::test]
async fn filters_are_bound_parameters() {
    let store = StaticStore::new().with_result(asn_rows(vec![]));
    let uri = format!("/query?breakdown=src_asn&{}&dst_port=443&protocol=6&protocol=17&filter_field_1=protocol", RANGE);
    let (status, _, _) = get(app(store.clone()), &uri).await;
    assert_eq!(status, StatusCode::OK);
    let q = &store.seen()[0];
    assert!(q.sql.contains("dst_port = {p0:UInt16}"), "{}", q.sql);
    assert!(q.sql.contains("protocol IN ({p1:UInt8}, {p2:UInt8})"), "{}", q.sql);
    assert!(!q.sql.contains("filter_field"));
    let values: Vec<&str> = q.params.iter().map(|p| p.value.as_str()).collect();
    assert_eq!(values, vec!["443", "6", "17"]);
}

#[tokio::test]
async fn unresolvable_fields_are_reported_not_fatal() {
    let store = StaticStore::new().with_result(asn_rows(vec![vec![json!(100), json!(7), json!(1.0)]]));
    let uri = format!("/query?breakdown=src_asn&breakdown=dst_asn__name&{}&bogus=1", RANGE);
    let (status, headers, body) = get(app(store.clone()), &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[DROPPED_FIELDS_HEADER], "dst_asn__name,bogus");
    assert_eq!(body, "t,Src.AS=7\n100,1\n");
    assert!(!store.seen()[0].sql.contains("dst_asn"));
}

#[tokio::test]
async fn store_failure_is_a_server_error() {
    let store = StaticStore::new().failing("Code: 81. Database flowlens doesn't exist");
    let (status, _, body) = get(app(store), &format!("/query?breakdown=src_asn&{}", RANGE)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
}

#[tokio::test]
async fn unsupported_column_type_is_a_server_error() {
    let rows = RowSet {
        columns: vec![ColumnMeta::new("t", "DateTime"), ColumnMeta::new("src_asn", "Int128"), ColumnMeta::new(AGG, "Float64")],
        rows: vec![vec![json!(100), json!("1"), json!(1.0)]],
    };
    let (status, _, _) = get(app(StaticStore::new().with_result(rows)), &format!("/query?breakdown=src_asn&{}", RANGE)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn dict_values_are_sorted_distinct_and_non_empty() {
    let store = StaticStore::new().with_dictionary("asns", &["asn", "name"], &[("name", &["Zeta", "", "Alpha", "Zeta", "Mid"])]);
    let (status, _, body) = get(app(store), "/dict_values/src_asn__name").await;
    assert_eq!(status, StatusCode::OK);
    let values: Vec<String> = serde_json::from_str(&body).unwrap();
    assert_eq!(values, vec!["Alpha", "Mid", "Zeta"]);
}

#[tokio::test]
async fn dict_values_error_statuses() {
    let store = StaticStore::new().with_dictionary("asns", &["asn", "name"], &[("name", &["x"])]);
    assert_eq!(get(app(store.clone()), "/dict_values/src_asn").await.0, StatusCode::BAD_REQUEST);
    assert_eq!(get(app(store.clone()), "/dict_values/dst_asn__name").await.0, StatusCode::BAD_REQUEST);
    assert_eq!(get(app(store.clone()), "/dict_values/src_asn/name").await.0, StatusCode::BAD_REQUEST);
    assert_eq!(get(app(store.clone()), "/dict_values/src_asn__name/extra").await.0, StatusCode::BAD_REQUEST);
    let broken = StaticStore::new().failing("connection reset");
    assert_eq!(get(app(broken), "/dict_values/src_asn__name").await.0, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn fields_lists_dictionary_attributes() {
    let store = StaticStore::new().with_dictionary("asns", &["asn", "name", "country"], &[]);
    let (status, _, body) = get(app(store), "/fields").await;
    assert_eq!(status, StatusCode::OK);
    let groups: serde_json::Value = serde_json::from_str(&body).unwrap();
    let src = groups.as_array().unwrap().iter().find(|g| g["name"] == "src_asn").unwrap();
    let names: Vec<&str> = src["fields"].as_array().unwrap().iter().map(|f| f["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["src_asn", "src_asn__name", "src_asn__country"]);
}

#[tokio::test]
async fn health_answers() {
    let (status, _, body) = get(app(StaticStore::new()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "flowlens ok");
}
