//! Rutas del conductor

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use uuid::Uuid;

use crate::dto::ride_dto::{
    AcceptRideRequest, AvailabilityRequest, AvailabilityResponse, CancelRideRequest,
    CompleteRideRequest, ListRidesQuery, RideEnvelope, RideListResponse,
};
use crate::middleware::auth::AuthenticatedUser;
use crate::routes::{availability_controller, ride_controller};
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_driver_router() -> Router<AppState> {
    Router::new()
        .route("/rides", get(list_rides))
        .route("/rides/available", get(available_rides))
        .route("/rides/:id", get(ride_details))
        .route("/rides/:id/accept", put(accept_ride))
        .route("/rides/:id/start", put(start_ride))
        .route("/rides/:id/complete", put(complete_ride))
        .route("/rides/:id/cancel", put(cancel_ride))
        .route("/availability", put(set_availability))
}

/// Feed de dispatch (el cliente lo consulta cada ~10s mientras está en línea)
async fn available_rides(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<RideListResponse>, AppError> {
    let driver_id = user.require_driver()?;
    let rides = ride_controller(&state).available_rides(driver_id).await?;
    Ok(Json(RideListResponse::success(rides)))
}

async fn list_rides(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListRidesQuery>,
) -> Result<Json<RideListResponse>, AppError> {
    let driver_id = user.require_driver()?;
    let rides = ride_controller(&state)
        .list_driver_rides(driver_id, query.status)
        .await?;
    Ok(Json(RideListResponse::success(rides)))
}

async fn ride_details(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<RideEnvelope>, AppError> {
    let driver_id = user.require_driver()?;
    let ride = ride_controller(&state)
        .get_ride(id, driver_id, user.role)
        .await?;
    Ok(Json(RideEnvelope::success(ride)))
}

/// Claim del viaje: responde 409 al que pierde la carrera
async fn accept_ride(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AcceptRideRequest>,
) -> Result<Json<RideEnvelope>, AppError> {
    let driver_id = user.require_driver()?;
    let ride = ride_controller(&state)
        .accept_ride(id, driver_id, request)
        .await?;
    Ok(Json(RideEnvelope::success_with_message(
        ride,
        "Ride accepted. Head to the pickup location.".to_string(),
    )))
}

async fn start_ride(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<RideEnvelope>, AppError> {
    let driver_id = user.require_driver()?;
    let ride = ride_controller(&state).start_ride(id, driver_id).await?;
    Ok(Json(RideEnvelope::success(ride)))
}

async fn complete_ride(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<CompleteRideRequest>,
) -> Result<Json<RideEnvelope>, AppError> {
    let driver_id = user.require_driver()?;
    let ride = ride_controller(&state)
        .request_completion(id, driver_id, request)
        .await?;
    Ok(Json(RideEnvelope::success_with_message(
        ride,
        "Waiting for the student to confirm completion.".to_string(),
    )))
}

async fn cancel_ride(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelRideRequest>,
) -> Result<Json<RideEnvelope>, AppError> {
    let driver_id = user.require_driver()?;
    let ride = ride_controller(&state)
        .cancel_ride(id, driver_id, user.role, request)
        .await?;
    Ok(Json(RideEnvelope::success(ride)))
}

async fn set_availability(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<AvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let driver_id = user.require_driver()?;
    let response = availability_controller(&state)
        .set_availability(driver_id, request)
        .await?;
    Ok(Json(response))
}
