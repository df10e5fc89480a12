//! Rutas del estudiante

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

use crate::dto::ride_dto::{
    BookRideRequest, CancelRideRequest, ConfirmCompletionRequest, ListRidesQuery,
    PendingConfirmationResponse, RateRideRequest, RideEnvelope, RideListResponse,
};
use crate::middleware::auth::AuthenticatedUser;
use crate::routes::ride_controller;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_student_router() -> Router<AppState> {
    Router::new()
        .route("/rides", post(book_ride).get(list_rides))
        .route("/rides/pending-confirmation", get(pending_confirmation))
        .route("/rides/:id", get(ride_details))
        .route("/rides/:id/confirm", put(confirm_completion))
        .route("/rides/:id/rate", put(rate_ride))
        .route("/rides/:id/cancel", put(cancel_ride))
}

async fn book_ride(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<BookRideRequest>,
) -> Result<Json<RideEnvelope>, AppError> {
    let student_id = user.require_student()?;
    let ride = ride_controller(&state).book_ride(student_id, request).await?;
    Ok(Json(RideEnvelope::success_with_message(
        ride,
        "Ride requested. Looking for a driver...".to_string(),
    )))
}

async fn list_rides(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListRidesQuery>,
) -> Result<Json<RideListResponse>, AppError> {
    let student_id = user.require_student()?;
    let rides = ride_controller(&state)
        .list_student_rides(student_id, query.status)
        .await?;
    Ok(Json(RideListResponse::success(rides)))
}

async fn ride_details(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<RideEnvelope>, AppError> {
    let student_id = user.require_student()?;
    let ride = ride_controller(&state)
        .get_ride(id, student_id, user.role)
        .await?;
    Ok(Json(RideEnvelope::success(ride)))
}

/// Poll de confirmación (el cliente lo consulta cada ~10s)
async fn pending_confirmation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<PendingConfirmationResponse>, AppError> {
    let student_id = user.require_student()?;
    let ride = ride_controller(&state)
        .pending_confirmation(student_id)
        .await?;
    Ok(Json(PendingConfirmationResponse::success(ride)))
}

async fn confirm_completion(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ConfirmCompletionRequest>,
) -> Result<Json<RideEnvelope>, AppError> {
    let student_id = user.require_student()?;
    let ride = ride_controller(&state)
        .confirm_completion(id, student_id, request)
        .await?;
    Ok(Json(RideEnvelope::success(ride)))
}

async fn rate_ride(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<RateRideRequest>,
) -> Result<Json<RideEnvelope>, AppError> {
    let student_id = user.require_student()?;
    let ride = ride_controller(&state)
        .rate_ride(id, student_id, request)
        .await?;
    Ok(Json(RideEnvelope::success_with_message(
        ride,
        "Thank you for your feedback!".to_string(),
    )))
}

async fn cancel_ride(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelRideRequest>,
) -> Result<Json<RideEnvelope>, AppError> {
    let student_id = user.require_student()?;
    let ride = ride_controller(&state)
        .cancel_ride(id, student_id, user.role, request)
        .await?;
    Ok(Json(RideEnvelope::success(ride)))
}
