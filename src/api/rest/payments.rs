use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::payment::PaymentInitiation;
use crate::error::AppError;
use crate::models::identity::Actor;
use crate::models::payment::{Payment, PaymentMethod, PaymentStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments/initiate", post(initiate_payment))
        .route("/payments/webhook", post(payment_webhook))
        .route("/payments/:order_id", get(payment_status))
}

#[derive(Deserialize)]
pub struct InitiatePaymentRequest {
    pub order_id: Uuid,
    pub method: PaymentMethod,
}

/// Provider callback body.
#[derive(Deserialize)]
pub struct WebhookRequest {
    pub reference: String,
    pub status: PaymentStatus,
}

async fn initiate_payment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentInitiation>), AppError> {
    let initiation = state
        .payments
        .initiate(&actor, payload.order_id, payload.method)
        .await?;
    Ok((StatusCode::CREATED, Json(initiation)))
}

async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WebhookRequest>,
) -> Result<Json<Payment>, AppError> {
    state
        .payments
        .settle(&payload.reference, payload.status)
        .map(Json)
}

async fn payment_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    state.payments.payment_status(&actor, order_id).map(Json)
}
