//!
//! flowlens HTTP server
//! --------------------
//! Axum routes for the flow explorer frontend.
//!
//! Responsibilities:
//! - `/query`: translate breakdown/filter parameters into one aggregate
//!   statement, execute it and answer with the pivoted series as CSV.
//! - `/dict_values/{field__column}`: distinct values of a dictionary column,
//!   used to populate filter pickers.
//! - `/fields`: selectable fields, grouped per flow field with dictionary
//!   attributes.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::FixedOffset;
use futures_util::FutureExt; // for catch_unwind on async blocks
use tracing::{error, info, warn};

use crate::catalog::{self, Catalog};
use crate::config::{self, ServerConfig};
use crate::error::{AppError, AppResult};
use crate::ident;
use crate::storage::clickhouse::ClickHouseGateway;
use crate::storage::SharedStore;

pub mod exec;
pub mod query;
pub mod series;

/// Lists the breakdown fields and filters that were left out of a query.
pub const DROPPED_FIELDS_HEADER: &str = "x-flowlens-dropped";

/// Shared server state injected into all handlers. Everything in here is
/// read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub store: SharedStore,
    pub utc_offset: FixedOffset,
    pub query_timeout: Duration,
}

impl AppState {
    pub fn new(catalog: Catalog, store: SharedStore, utc_offset: FixedOffset, query_timeout: Duration) -> Self {
        Self { catalog: Arc::new(catalog), store, utc_offset, query_timeout }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/query", get(query_handler))
        .route("/dict_values/{*name}", get(dict_values_handler))
        .route("/fields", get(fields_handler))
        .with_state(state)
}

/// Start the flowlens HTTP server with the given configuration.
///
/// Loads dictionary bindings, builds the catalog, connects to ClickHouse
/// (creating the `flows` table when missing) and serves until shutdown.
pub async fn run_with_config(cfg: ServerConfig) -> anyhow::Result<()> {
    let dicts = match &cfg.dicts_path {
        Some(p) => config::load_dicts(p)?,
        None => Vec::new(),
    };
    info!(target: "startup", dicts = dicts.len(), "dictionary bindings loaded");
    let catalog = Catalog::flows(dicts).context("invalid dictionary configuration")?;
    let store = ClickHouseGateway::connect(&cfg.clickhouse).await?;
    let state = AppState::new(catalog, Arc::new(store), cfg.utc_offset, cfg.query_timeout);

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!(target: "startup", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> &'static str { "flowlens ok" }

async fn process_query(state: &AppState, params: &[(String, String)]) -> AppResult<(Vec<u8>, Vec<String>)> {
    let built = query::build_from_params(&state.catalog, state.store.database(), params, &state.utc_offset)?;
    let series = exec::Executor::new(state.store.as_ref(), &state.catalog, state.query_timeout)
        .execute(&built.query)
        .await?;
    let dropped = built.dropped.into_iter().map(|d| d.field).collect();
    Ok((series.to_csv(), dropped))
}

async fn query_handler(State(state): State<AppState>, Query(params): Query<Vec<(String, String)>>) -> Response {
    // Nothing selected yet: the form loads without running a query.
    if params.is_empty() {
        return StatusCode::OK.into_response();
    }
    match AssertUnwindSafe(process_query(&state, &params)).catch_unwind().await {
        Ok(Ok((csv, dropped))) => {
            let mut resp = ([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv).into_response();
            if !dropped.is_empty() {
                if let Ok(v) = HeaderValue::from_str(&dropped.join(",")) {
                    resp.headers_mut().insert(DROPPED_FIELDS_HEADER, v);
                }
            }
            resp
        }
        // Every failure, validation included, answers 500 with an empty body.
        Ok(Err(e)) => {
            error!(target: "flowlens::query", code = e.code_str(), "Unable to process query: {}", e.message());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(panic_payload) => {
            let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() { *s }
                      else if let Some(s) = panic_payload.downcast_ref::<String>() { s.as_str() }
                      else { "panic" };
            error!(target: "panic", "HTTP query_handler panic: {}", msg);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn status_of(e: &AppError) -> StatusCode {
    StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Split `<field>__<column>`; exactly one separator, both parts identifiers.
fn parse_dict_value_request(input: &str) -> Option<(&str, &str)> {
    let mut parts = input.split(ident::DICT_SEPARATOR);
    let (field, column) = (parts.next()?, parts.next()?);
    if parts.next().is_some() || !ident::is_safe_identifier(field) || !ident::is_safe_identifier(column) {
        return None;
    }
    Some((field, column))
}

async fn dict_values(state: &AppState, name: &str) -> AppResult<Vec<String>> {
    let (field, column) = parse_dict_value_request(name)
        .ok_or_else(|| AppError::user("invalid_format".to_string(), format!("expected <field>__<column>, got {:?}", name)))?;
    let dict = state
        .catalog
        .dict_for(field)
        .ok_or_else(|| AppError::user("unknown_dict".to_string(), format!("no dict bound to field {}", field)))?;
    let mut values: Vec<String> = state
        .store
        .dictionary_values(&dict.dict, column)
        .await?
        .into_iter()
        .filter(|v| !v.is_empty())
        .collect();
    values.sort();
    values.dedup();
    Ok(values)
}

async fn dict_values_handler(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match dict_values(&state, &name).await {
        Ok(values) => Json(values).into_response(),
        Err(e) => {
            warn!(target: "flowlens::dict", code = e.code_str(), name = %name, "Unable to get dict values: {}", e.message());
            status_of(&e).into_response()
        }
    }
}

async fn fields_handler(State(state): State<AppState>) -> Response {
    Json(catalog::field_groups(&state.catalog, state.store.as_ref()).await).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dict_value_paths() {
        assert_eq!(parse_dict_value_request("src_asn__name"), Some(("src_asn", "name")));
        assert_eq!(parse_dict_value_request("src_asn"), None);
        assert_eq!(parse_dict_value_request("a__b__c"), None);
        assert_eq!(parse_dict_value_request("__name"), None);
        assert_eq!(parse_dict_value_request("src_asn__na me"), None);
    }
}
