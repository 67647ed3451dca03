use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::actor::require_admin;
use crate::engine::analytics::{summarize, SalesSummary};
use crate::engine::lifecycle::NewOrder;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::order::{Order, OrderStatus};
use crate::models::user::{Actor, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/mine", get(my_orders))
        .route("/orders/analytics", get(analytics))
        .route("/orders/:id", get(get_order).put(update_order_status))
        .route("/orders/:id/refund", post(request_refund))
        .route("/orders/:id/driver-location", post(push_driver_location))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize)]
pub struct RefundRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct DriverLocationRequest {
    pub location: GeoPoint,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = state.orders.create_order(payload).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Order>>, AppError> {
    require_admin(&actor)?;
    Ok(Json(state.stores.orders.list_orders()?))
}

async fn my_orders(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.stores.orders.list_orders_for_user(actor.id)?))
}

async fn analytics(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<SalesSummary>, AppError> {
    require_admin(&actor)?;

    let orders = state.stores.orders.list_orders()?;
    let customers = state.stores.users.list_users_by_role(Role::Customer)?.len();
    Ok(Json(summarize(orders, customers)))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders.get_order(id)?))
}

async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.update_status(id, payload.status, &actor).await?;
    Ok(Json(order))
}

async fn request_refund(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<RefundRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.request_refund(id, payload.reason, &actor).await?;
    Ok(Json(order))
}

async fn push_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<DriverLocationRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .push_driver_location(id, payload.location, &actor)
        .await?;
    Ok(Json(order))
}
