//! HTTP handlers for stock ledger endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{Capability, StockLevel, StockMovement};
use crate::services::stock_ledger::{ChainReport, RecordMovementInput, StockLedgerService};
use crate::AppState;
use shared::QuantityAsOf;

#[derive(Debug, Deserialize)]
pub struct AsOfQuery {
    pub date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct MovementsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Current cached quantity for a product at a branch
pub async fn get_stock_level(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((product_id, branch_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<StockLevel>> {
    current_user.0.actor().require(Capability::ViewOrders)?;
    let service = StockLedgerService::new(state.db);
    let level = service.current_quantity(product_id, branch_id).await?;
    Ok(Json(level))
}

/// Quantity at a point in time, replayed from the ledger
pub async fn get_stock_as_of(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((product_id, branch_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<AsOfQuery>,
) -> AppResult<Json<QuantityAsOf>> {
    current_user.0.actor().require(Capability::ViewOrders)?;
    let service = StockLedgerService::new(state.db);
    let answer = service
        .quantity_as_of(product_id, branch_id, query.date)
        .await?;
    Ok(Json(answer))
}

pub async fn list_stock_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((product_id, branch_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<MovementsQuery>,
) -> AppResult<Json<Vec<StockMovement>>> {
    current_user.0.actor().require(Capability::ViewOrders)?;
    let service = StockLedgerService::new(state.db);
    let movements = service
        .list_movements(product_id, branch_id, query.from, query.to)
        .await?;
    Ok(Json(movements))
}

/// Walk the snapshot chain and compare it with the cache
pub async fn verify_stock_chain(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((product_id, branch_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ChainReport>> {
    current_user.0.actor().require(Capability::AdjustStock)?;
    let service = StockLedgerService::new(state.db);
    let report = service.verify_chain(product_id, branch_id).await?;
    Ok(Json(report))
}

/// Record a manual movement
pub async fn record_stock_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<RecordMovementInput>,
) -> AppResult<(StatusCode, Json<StockMovement>)> {
    let service = StockLedgerService::new(state.db);
    let movement = service
        .record_movement(&current_user.0.actor(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(movement)))
}
