use axum::{
    extract::{Json, Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::{RateCache, RefreshOutcome};
use crate::engine::{derive, AdjustmentBook};
use crate::scheduler::Scheduler;
use crate::types::product::{find_by_id, PRODUCT_CATALOG};
use crate::types::rate::{BaseRateSnapshot, DerivedRate};

pub struct ApiState {
    pub cache: Arc<RateCache>,
    pub scheduler: Arc<Scheduler>,
    pub adjustments: Arc<AdjustmentBook>,
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/rates", get(list_rates))
        .route("/rates/force-update", post(force_update))
        .route("/rates/:product_id", put(set_adjustment))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

/// The read path. Serves the current cache-derived catalog unconditionally
/// and fires a refresh as a non-blocking side effect; ingestion failures
/// never turn into an HTTP error here.
async fn list_rates(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Json<Vec<DerivedRate>> {
    // A bearer token is accepted but never required.
    if bearer_token(&headers).is_some() {
        tracing::debug!("authenticated catalog read");
    }

    state.scheduler.clone().trigger();

    let snapshot = state.cache.snapshot().await;
    let rows = PRODUCT_CATALOG
        .iter()
        .map(|product| derive(&snapshot, product, state.adjustments.get(&product.name)))
        .collect();
    Json(rows)
}

#[derive(Deserialize)]
struct AdjustmentRequest {
    /// Per-gram signed offset; null or absent clears the adjustment.
    adjustment: Option<Decimal>,
}

/// Admin write: set or clear the manual adjustment for one product. The
/// path id is the content-derived product id, not a database key.
async fn set_adjustment(
    State(state): State<Arc<ApiState>>,
    Path(product_id): Path<String>,
    Json(request): Json<AdjustmentRequest>,
) -> Result<Json<DerivedRate>, StatusCode> {
    let product = find_by_id(&product_id).map_err(|_| StatusCode::NOT_FOUND)?;

    match request.adjustment {
        Some(offset) => state.adjustments.set(&product.name, offset),
        None => state.adjustments.clear(&product.name),
    }

    // Persist and broadcast the adjusted row right away so the change
    // survives restart without waiting for the next refresh.
    let rate = state.scheduler.sync_product(product).await;
    Ok(Json(rate))
}

#[derive(Serialize)]
struct ForceUpdateResponse {
    outcome: RefreshOutcome,
    snapshot: BaseRateSnapshot,
}

/// Bypasses the throttle once, awaits the refresh and returns the resulting
/// cache snapshot.
async fn force_update(State(state): State<Arc<ApiState>>) -> Json<ForceUpdateResponse> {
    let outcome = state.scheduler.run_cycle(true).await;
    let snapshot = state.cache.snapshot().await;
    Json(ForceUpdateResponse {
        outcome,
        snapshot: (*snapshot).clone(),
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
