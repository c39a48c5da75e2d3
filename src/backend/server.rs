//! Read-only JSON routes over the cache snapshots.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::Backend;
use crate::exchange::aster::types::{FundingRateInterval, FundingRateSample};
use crate::exchange::bitget::types::CurrentFundRate;

#[derive(Debug, Serialize)]
struct Pong {
    pong: i64,
}

pub fn router(backend: Arc<Backend>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/current-fund-rate", get(bitget_fund_rates))
        .route("/bitget/current-fund-rate", get(bitget_fund_rates))
        .route("/binance/openInterest", get(binance_open_interest))
        .route("/aster/fundingRate", get(aster_funding_history))
        .route("/aster/fundingRateInterval", get(aster_funding_intervals))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(backend)
}

/// Serve `backend` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    backend: Arc<Backend>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Backend HTTP server listening");
    }
    axum::serve(listener, router(backend))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn ping() -> Json<Pong> {
    Json(Pong {
        pong: Utc::now().timestamp_millis(),
    })
}

async fn bitget_fund_rates(State(backend): State<Arc<Backend>>) -> Json<BTreeMap<String, CurrentFundRate>> {
    Json(backend.bitget.values())
}

async fn binance_open_interest(State(backend): State<Arc<Backend>>) -> Json<BTreeMap<String, f64>> {
    Json(backend.binance.open_interest())
}

async fn aster_funding_history(State(backend): State<Arc<Backend>>) -> Json<Vec<FundingRateSample>> {
    Json(backend.aster.funding_history())
}

async fn aster_funding_intervals(State(backend): State<Arc<Backend>>) -> Json<Vec<FundingRateInterval>> {
    Json(backend.aster.funding_intervals())
}
