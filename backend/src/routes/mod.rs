//! Route definitions for the stock procurement service

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - purchase orders
        .nest("/purchase-orders", purchase_order_routes(state.clone()))
        // Protected routes - stock ledger
        .nest("/stock", stock_routes(state))
}

/// Purchase order routes (protected)
fn purchase_order_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_purchase_orders).post(handlers::create_purchase_order),
        )
        .route("/:order_id", get(handlers::get_purchase_order))
        .route("/:order_id/history", get(handlers::get_purchase_order_history))
        // Workflow stages
        .route("/:order_id/accept", post(handlers::accept_quantities))
        .route("/:order_id/register", post(handlers::register_received))
        .route("/:order_id/verify", post(handlers::verify_finance))
        .route("/:order_id/approve", post(handlers::approve_purchase_order))
        .route("/:order_id/reject", post(handlers::reject_purchase_order))
        .route("/:order_id/cancel", post(handlers::cancel_purchase_order))
        // Edits
        .route("/:order_id/requested", put(handlers::edit_requested_quantities))
        .route("/:order_id/accepted", put(handlers::edit_accepted_quantities))
        .route("/:order_id/registered", put(handlers::edit_registered_quantities))
        .route("/:order_id/prices", put(handlers::edit_prices))
        .route(
            "/:order_id/items/:item_id",
            delete(handlers::remove_purchase_order_item),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Stock ledger routes (protected)
fn stock_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/movements", post(handlers::record_stock_movement))
        .route("/:product_id/:branch_id", get(handlers::get_stock_level))
        .route("/:product_id/:branch_id/as-of", get(handlers::get_stock_as_of))
        .route(
            "/:product_id/:branch_id/movements",
            get(handlers::list_stock_movements),
        )
        .route("/:product_id/:branch_id/verify", get(handlers::verify_stock_chain))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
