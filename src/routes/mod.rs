//! Routers de la API, separados por rol como en el cliente
//! (`/api/student/...` y `/api/driver/...`).

pub mod driver_routes;
pub mod student_routes;

use axum::{response::Json, routing::get, Router};
use serde_json::json;

use crate::clients::wallet::WalletServiceClient;
use crate::controllers::availability_controller::AvailabilityController;
use crate::controllers::ride_controller::RideController;
use crate::middleware::cors::{cors_middleware, cors_middleware_with_origins};
use crate::repositories::availability_repository::PgAvailabilityRepository;
use crate::repositories::ride_repository::PgRideRepository;
use crate::state::AppState;

/// Crear el router completo de la aplicación
pub fn create_router(state: AppState) -> Router {
    let cors = if state.config.cors_origins.is_empty() {
        cors_middleware()
    } else {
        cors_middleware_with_origins(state.config.cors_origins.clone())
    };

    Router::new()
        .route("/health", get(health))
        .nest("/api/student", student_routes::create_student_router())
        .nest("/api/driver", driver_routes::create_driver_router())
        .layer(cors)
        .with_state(state)
}

/// Health check
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "service": "boride-backend",
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Construir el controlador de viajes con las implementaciones de producción
pub(crate) fn ride_controller(
    state: &AppState,
) -> RideController<PgRideRepository, PgAvailabilityRepository, WalletServiceClient> {
    RideController::new(
        PgRideRepository::new(state.pool.clone()),
        PgAvailabilityRepository::new(state.pool.clone()),
        state.wallet.clone(),
    )
}

pub(crate) fn availability_controller(
    state: &AppState,
) -> AvailabilityController<PgAvailabilityRepository> {
    AvailabilityController::new(PgAvailabilityRepository::new(state.pool.clone()))
}
