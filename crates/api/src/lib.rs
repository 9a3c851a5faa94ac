//! HTTP API server for the commerce checkout backend.
//!
//! Provides REST endpoints for carts, checkout, orders and catalog
//! administration, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod principal;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use domain::CheckoutPolicy;
use metrics_exporter_prometheus::PrometheusHandle;
use store::CommerceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::{AppState, carts, catalog, customers, inventory, orders, system};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CommerceStore>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(system::health))
        // Carts and checkout
        .route("/carts/me", get(carts::get_mine::<S>))
        .route("/carts/me/items", post(carts::add_item::<S>))
        .route(
            "/carts/me/items/{item_id}",
            patch(carts::update_item::<S>).delete(carts::remove_item::<S>),
        )
        .route("/carts/me/apply-promotion", post(carts::apply_promotion::<S>))
        .route("/carts/me/checkout", post(carts::checkout::<S>))
        // Orders
        .route("/orders", get(orders::list_all::<S>))
        .route("/orders/me", get(orders::list_mine::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route("/orders/{id}/status", patch(orders::update_status::<S>))
        // Catalog
        .route("/variants", post(catalog::create_variant::<S>))
        .route(
            "/variants/{id}",
            get(catalog::get_variant::<S>).delete(catalog::delete_variant::<S>),
        )
        .route("/pricing-rules", post(catalog::create_pricing_rule::<S>))
        .route("/promotions", post(catalog::create_promotion::<S>))
        .route("/promotions/apply", post(catalog::apply_promotion::<S>))
        // Inventory
        .route("/inventory/movements", post(inventory::record_movement::<S>))
        .route("/variants/{id}/movements", get(inventory::movements::<S>))
        .route(
            "/variants/{id}/reconciliation",
            get(inventory::reconciliation::<S>),
        )
        // Customers
        .route("/customers/me", get(customers::me::<S>))
        .route("/customers/{id}", delete(customers::delete::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state with every service sharing `store`.
pub fn create_default_state<S: CommerceStore>(
    store: S,
    policy: CheckoutPolicy,
) -> Arc<AppState<S>> {
    Arc::new(AppState::new(store, policy))
}
