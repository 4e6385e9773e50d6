use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::auth::require_role;
use crate::engine::workflow::PlaceOrder;
use crate::error::AppError;
use crate::models::identity::{Actor, Role};
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_my_orders).post(create_order))
        .route("/orders/:id", get(get_order).delete(cancel_order))
        .route("/orders/:id/status", patch(update_order_status))
        .route("/restaurants/:restaurant_id/orders", get(list_restaurant_orders))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize)]
pub struct RestaurantOrdersQuery {
    pub status: Option<OrderStatus>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<PlaceOrder>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    require_role(&actor, &[Role::Customer])?;
    let order = state.workflow.create_order(&actor, payload).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_my_orders(State(state): State<Arc<AppState>>, actor: Actor) -> Json<Vec<Order>> {
    Json(state.workflow.list_mine(&actor))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    state.workflow.get(&actor, id).map(Json)
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    state.workflow.cancel(&actor, id).map(Json)
}

async fn update_order_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, AppError> {
    require_role(&actor, &[Role::Kitchen, Role::Admin])?;
    state.workflow.update_status(&actor, id, payload.status).map(Json)
}

async fn list_restaurant_orders(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(restaurant_id): Path<Uuid>,
    Query(query): Query<RestaurantOrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    state
        .workflow
        .list_for_restaurant(&actor, restaurant_id, query.status)
        .map(Json)
}
