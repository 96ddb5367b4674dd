//! HTTP handlers for purchase order endpoints

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::models::{HistoryEntry, PurchaseOrderStatus};
use crate::services::purchase_order::{ListOrdersFilter, PurchaseOrderService, PurchaseOrderSummary};
use crate::AppState;
use shared::{
    CreatePurchaseOrderInput, PaginatedResponse, Pagination, PriceLine, PurchaseOrderAggregate,
    QuantityLine, VerifyLine,
};

/// Per-item quantities for accept, register and the quantity edits
#[derive(Debug, Deserialize, Validate)]
pub struct QuantityLinesRequest {
    #[validate(length(min = 1))]
    pub items: Vec<QuantityLine>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyFinanceRequest {
    #[validate(length(min = 1))]
    pub items: Vec<VerifyLine>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EditPricesRequest {
    #[validate(length(min = 1))]
    pub items: Vec<PriceLine>,
}

/// Optional item scope for approve and reject; absent means the default scope
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemSelectionRequest {
    pub item_ids: Option<Vec<Uuid>>,
}

/// An empty body selects the default scope; anything else must parse
fn parse_selection(body: &[u8]) -> AppResult<ItemSelectionRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ItemSelectionRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::ValidationError(format!("invalid request body: {}", e)))
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub branch_id: Option<Uuid>,
    pub status: Option<PurchaseOrderStatus>,
    pub include_inactive: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct GetOrderQuery {
    pub include_inactive: Option<bool>,
}

fn service(state: &AppState) -> PurchaseOrderService {
    PurchaseOrderService::new(
        state.db.clone(),
        state.config.purchasing.default_markup_percent,
    )
}

/// Submit a new purchase order
pub async fn create_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreatePurchaseOrderInput>,
) -> AppResult<(StatusCode, Json<PurchaseOrderAggregate>)> {
    let order = service(&state)
        .create(&current_user.0.actor(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// List purchase orders
pub async fn list_purchase_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListOrdersQuery>,
) -> AppResult<Json<PaginatedResponse<PurchaseOrderSummary>>> {
    let filter = ListOrdersFilter {
        branch_id: query.branch_id,
        status: query.status,
        include_inactive: query.include_inactive.unwrap_or(false),
    };
    let pagination = Pagination::normalized(query.page, query.per_page);
    let page = service(&state)
        .list_orders(&current_user.0.actor(), filter, pagination)
        .await?;
    Ok(Json(page))
}

/// Get a purchase order with its items
pub async fn get_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Query(query): Query<GetOrderQuery>,
) -> AppResult<Json<PurchaseOrderAggregate>> {
    let order = service(&state)
        .get_order(
            &current_user.0.actor(),
            order_id,
            query.include_inactive.unwrap_or(false),
        )
        .await?;
    Ok(Json(order))
}

/// Get the trail of a purchase order
pub async fn get_purchase_order_history(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Vec<HistoryEntry>>> {
    let history = service(&state)
        .history(&current_user.0.actor(), order_id)
        .await?;
    Ok(Json(history))
}

pub async fn accept_quantities(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<QuantityLinesRequest>,
) -> AppResult<Json<PurchaseOrderAggregate>> {
    input.validate()?;
    let order = service(&state)
        .accept_quantities(&current_user.0.actor(), order_id, input.items)
        .await?;
    Ok(Json(order))
}

/// Register delivered quantities; repeated calls accumulate
pub async fn register_received(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<QuantityLinesRequest>,
) -> AppResult<Json<PurchaseOrderAggregate>> {
    input.validate()?;
    let order = service(&state)
        .register_received(&current_user.0.actor(), order_id, input.items)
        .await?;
    Ok(Json(order))
}

pub async fn verify_finance(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<VerifyFinanceRequest>,
) -> AppResult<Json<PurchaseOrderAggregate>> {
    input.validate()?;
    let order = service(&state)
        .verify_finance(&current_user.0.actor(), order_id, input.items)
        .await?;
    Ok(Json(order))
}

pub async fn approve_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<PurchaseOrderAggregate>> {
    let selection = parse_selection(&body)?;
    let order = service(&state)
        .approve_final(&current_user.0.actor(), order_id, selection.item_ids)
        .await?;
    Ok(Json(order))
}

pub async fn reject_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<PurchaseOrderAggregate>> {
    let selection = parse_selection(&body)?;
    let order = service(&state)
        .reject(&current_user.0.actor(), order_id, selection.item_ids)
        .await?;
    Ok(Json(order))
}

pub async fn cancel_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrderAggregate>> {
    let order = service(&state)
        .cancel(&current_user.0.actor(), order_id)
        .await?;
    Ok(Json(order))
}

pub async fn edit_requested_quantities(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<QuantityLinesRequest>,
) -> AppResult<Json<PurchaseOrderAggregate>> {
    input.validate()?;
    let order = service(&state)
        .edit_requested_quantities(&current_user.0.actor(), order_id, input.items)
        .await?;
    Ok(Json(order))
}

pub async fn edit_accepted_quantities(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<QuantityLinesRequest>,
) -> AppResult<Json<PurchaseOrderAggregate>> {
    input.validate()?;
    let order = service(&state)
        .edit_accepted_quantities(&current_user.0.actor(), order_id, input.items)
        .await?;
    Ok(Json(order))
}

/// Overwrite registered quantities
pub async fn edit_registered_quantities(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<QuantityLinesRequest>,
) -> AppResult<Json<PurchaseOrderAggregate>> {
    input.validate()?;
    let order = service(&state)
        .edit_registered_quantities(&current_user.0.actor(), order_id, input.items)
        .await?;
    Ok(Json(order))
}

pub async fn edit_prices(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<EditPricesRequest>,
) -> AppResult<Json<PurchaseOrderAggregate>> {
    input.validate()?;
    let order = service(&state)
        .edit_prices(&current_user.0.actor(), order_id, input.items)
        .await?;
    Ok(Json(order))
}

/// Hard-delete one unreviewed item
pub async fn remove_purchase_order_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<PurchaseOrderAggregate>> {
    let order = service(&state)
        .remove_item(&current_user.0.actor(), order_id, item_id)
        .await?;
    Ok(Json(order))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_selects_default_scope() {
        assert!(parse_selection(b"").unwrap().item_ids.is_none());
        assert!(parse_selection(b" \n").unwrap().item_ids.is_none());
        assert!(parse_selection(b"{}").unwrap().item_ids.is_none());
    }

    #[test]
    fn test_explicit_item_ids() {
        let id = Uuid::new_v4();
        let body = format!(r#"{{"item_ids": ["{}"]}}"#, id);
        let selection = parse_selection(body.as_bytes()).unwrap();
        assert_eq!(selection.item_ids, Some(vec![id]));
    }

    #[test]
    fn test_malformed_body_is_bad_request() {
        for body in [
            &br#"{"item_ids": ["not-a-uuid"]}"#[..],
            br#"{"item_id": []}"#,
            br#"{"item_ids": "#,
        ] {
            let err = parse_selection(body).unwrap_err();
            assert!(matches!(err, AppError::ValidationError(_)));
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }
}
