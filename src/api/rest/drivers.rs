use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::auth::require_role;
use crate::engine::assignment::AvailableDelivery;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::driver::{DriverProfile, VehicleType, VerificationStatus};
use crate::models::identity::{Actor, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers/register", post(register_driver))
        .route("/drivers/me", get(my_profile))
        .route("/drivers/me/status", put(update_availability))
        .route("/drivers/me/location", put(update_location))
        .route("/drivers/orders/available", get(available_orders))
        .route("/drivers/orders/:id/accept", post(accept_delivery))
        .route("/drivers/orders/:id/status", put(update_delivery_status))
        .route("/admin/drivers/:id/verification", patch(verify_driver))
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub vehicle_type: VehicleType,
    pub vehicle_plate: String,
    pub license_number: String,
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub is_online: bool,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Deserialize)]
pub struct LocationRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize)]
pub struct AvailableQuery {
    pub radius_km: Option<f64>,
}

#[derive(Deserialize)]
pub struct DeliveryStatusRequest {
    pub status: DeliveryStatus,
}

#[derive(Deserialize)]
pub struct VerificationRequest {
    pub status: VerificationStatus,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<(StatusCode, Json<DriverProfile>), AppError> {
    require_role(&actor, &[Role::Driver])?;

    if payload.vehicle_plate.trim().is_empty() || payload.license_number.trim().is_empty() {
        return Err(AppError::Validation(
            "vehicle_plate and license_number are required".to_string(),
        ));
    }

    let profile = state.store.insert_driver(DriverProfile {
        id: Uuid::new_v4(),
        user_id: actor.user_id,
        vehicle_type: payload.vehicle_type,
        vehicle_plate: payload.vehicle_plate.trim().to_string(),
        license_number: payload.license_number.trim().to_string(),
        verification: VerificationStatus::Pending,
        is_online: false,
        location: None,
        location_updated_at: None,
        created_at: Utc::now(),
    })?;

    info!(driver_id = %profile.id, user_id = %actor.user_id, "driver registered");
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn my_profile(State(state): State<Arc<AppState>>, actor: Actor) -> Result<Json<DriverProfile>, AppError> {
    own_profile(&state, &actor).map(Json)
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<AvailabilityRequest>,
) -> Result<Json<DriverProfile>, AppError> {
    let profile = own_profile(&state, &actor)?;
    let location = match (payload.lat, payload.lng) {
        (Some(lat), Some(lng)) => Some(valid_point(lat, lng)?),
        (None, None) => None,
        _ => {
            return Err(AppError::Validation(
                "lat and lng must be given together".to_string(),
            ));
        }
    };

    let now = Utc::now();
    let updated = state.store.update_driver(&profile.id, |driver| {
        driver.is_online = payload.is_online;
        if let Some(location) = location {
            driver.set_location(location, now);
        }
    })?;

    info!(driver_id = %updated.id, is_online = updated.is_online, "driver availability updated");
    Ok(Json(updated))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<LocationRequest>,
) -> Result<Json<DriverProfile>, AppError> {
    let profile = own_profile(&state, &actor)?;
    let location = valid_point(payload.lat, payload.lng)?;

    let now = Utc::now();
    let updated = state
        .store
        .update_driver(&profile.id, |driver| driver.set_location(location, now))?;
    Ok(Json(updated))
}

async fn available_orders(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<AvailableQuery>,
) -> Result<Json<Vec<AvailableDelivery>>, AppError> {
    state
        .deliveries
        .available_for_driver(&actor, query.radius_km)
        .map(Json)
}

async fn accept_delivery(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    state.deliveries.accept(&actor, id).map(Json)
}

async fn update_delivery_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeliveryStatusRequest>,
) -> Result<Json<Delivery>, AppError> {
    if payload.status == DeliveryStatus::Assigned {
        return Err(AppError::Validation(
            "deliveries become ASSIGNED only by accepting them".to_string(),
        ));
    }

    state
        .deliveries
        .update_for_actor(&actor, id, payload.status)
        .map(Json)
}

async fn verify_driver(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerificationRequest>,
) -> Result<Json<DriverProfile>, AppError> {
    require_role(&actor, &[Role::Admin])?;

    if payload.status == VerificationStatus::Pending {
        return Err(AppError::Validation(
            "status must be VERIFIED, REJECTED or SUSPENDED".to_string(),
        ));
    }

    let updated = state.store.update_driver(&id, |driver| {
        driver.verification = payload.status;
        if payload.status != VerificationStatus::Verified {
            driver.is_online = false;
        }
    })?;

    info!(driver_id = %id, admin_id = %actor.user_id, status = ?payload.status, "driver verification updated");
    Ok(Json(updated))
}

fn own_profile(state: &AppState, actor: &Actor) -> Result<DriverProfile, AppError> {
    require_role(actor, &[Role::Driver])?;
    state
        .store
        .driver_for_user(&actor.user_id)
        .ok_or_else(|| AppError::NotFound("driver profile not found".to_string()))
}

fn valid_point(lat: f64, lng: f64) -> Result<GeoPoint, AppError> {
    let point = GeoPoint::new(lat, lng);
    if !point.is_valid() {
        return Err(AppError::Validation("invalid coordinates".to_string()));
    }
    Ok(point)
}
