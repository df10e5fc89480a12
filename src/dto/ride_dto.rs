//! DTOs del API de viajes
//!
//! Requests validados con `validator` y responses con la forma exacta que
//! consume el cliente (camelCase, fares numéricos, timestamps RFC3339).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::ride::{Location, PaymentMethod, Ride, RideStatus, TimelineEventType};

// ==================== Requests ====================

/// POST /student/rides
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BookRideRequest {
    pub pickup_location: Location,
    pub dropoff_location: Location,
    pub fare: Decimal,
    pub payment_method: PaymentMethod,
    pub estimated_distance: Option<Decimal>,
    pub estimated_duration: Option<i32>,
}

/// PUT /driver/rides/:id/accept
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRideRequest {
    /// Minutos estimados hasta el punto de recogida
    #[validate(range(min = 0, max = 180))]
    pub estimated_arrival: i32,
}

/// PUT /driver/rides/:id/complete
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRideRequest {
    pub actual_distance: Decimal,
    pub actual_duration: i32,
}

/// Acción del estudiante sobre una solicitud de completado
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmAction {
    Confirm,
    Reject,
}

/// PUT /student/rides/:id/confirm
#[derive(Debug, Deserialize)]
pub struct ConfirmCompletionRequest {
    pub action: ConfirmAction,
    pub reason: Option<String>,
}

/// PUT /student/rides/:id/rate
#[derive(Debug, Deserialize, Validate)]
pub struct RateRideRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: i16,
    #[validate(length(max = 500))]
    pub review: Option<String>,
}

/// PUT /{student,driver}/rides/:id/cancel
#[derive(Debug, Deserialize)]
pub struct CancelRideRequest {
    pub reason: Option<String>,
}

/// PUT /driver/availability — sin body hace toggle
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub is_online: Option<bool>,
}

/// Query de listados: ?status=completed
#[derive(Debug, Default, Deserialize)]
pub struct ListRidesQuery {
    pub status: Option<RideStatus>,
}

// ==================== Responses ====================

/// Evento del timeline tal como lo renderiza el cliente
#[derive(Debug, Serialize)]
pub struct TimelineEventResponse {
    #[serde(rename = "type")]
    pub event_type: TimelineEventType,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response de viaje para la API
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideResponse {
    pub id: Uuid,
    pub student_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup_location: Location,
    pub dropoff_location: Location,
    pub fare: f64,
    pub payment_method: PaymentMethod,
    pub status: RideStatus,
    pub estimated_distance: Option<f64>,
    pub estimated_duration: Option<i32>,
    pub estimated_arrival: Option<i32>,
    pub actual_distance: Option<f64>,
    pub actual_duration: Option<i32>,
    pub completion_requested_at: Option<String>,
    pub cancel_reason: Option<String>,
    pub dispute_reason: Option<String>,
    pub rating: Option<i16>,
    pub review: Option<String>,
    pub timeline: Vec<TimelineEventResponse>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl From<Ride> for RideResponse {
    fn from(ride: Ride) -> Self {
        Self {
            id: ride.id,
            student_id: ride.student_id,
            driver_id: ride.driver_id,
            pickup_location: ride.pickup_location.0,
            dropoff_location: ride.dropoff_location.0,
            fare: ride.fare.to_string().parse().unwrap_or(0.0),
            payment_method: ride.payment_method,
            status: ride.status,
            estimated_distance: ride
                .estimated_distance
                .map(|d| d.to_string().parse().unwrap_or(0.0)),
            estimated_duration: ride.estimated_duration,
            estimated_arrival: ride.estimated_arrival,
            actual_distance: ride
                .actual_distance
                .map(|d| d.to_string().parse().unwrap_or(0.0)),
            actual_duration: ride.actual_duration,
            completion_requested_at: ride.completion_requested_at.map(|t| t.to_rfc3339()),
            cancel_reason: ride.cancel_reason,
            dispute_reason: ride.dispute_reason,
            rating: ride.rating,
            review: ride.review,
            timeline: ride
                .timeline
                .0
                .into_iter()
                .map(|e| TimelineEventResponse {
                    event_type: e.event_type,
                    timestamp: e.timestamp.to_rfc3339(),
                    message: e.message,
                })
                .collect(),
            created_at: ride.created_at.to_rfc3339(),
            started_at: ride.started_at.map(|t| t.to_rfc3339()),
            completed_at: ride.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Envelope `{success, ride}` de las mutaciones
#[derive(Debug, Serialize)]
pub struct RideEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub ride: RideResponse,
}

impl RideEnvelope {
    pub fn success(ride: Ride) -> Self {
        Self {
            success: true,
            message: None,
            ride: ride.into(),
        }
    }

    pub fn success_with_message(ride: Ride, message: String) -> Self {
        Self {
            success: true,
            message: Some(message),
            ride: ride.into(),
        }
    }
}

/// Envelope `{success, count, rides}` de los listados
#[derive(Debug, Serialize)]
pub struct RideListResponse {
    pub success: bool,
    pub count: usize,
    pub rides: Vec<RideResponse>,
}

impl RideListResponse {
    pub fn success(rides: Vec<Ride>) -> Self {
        let rides: Vec<RideResponse> = rides.into_iter().map(Into::into).collect();
        Self {
            success: true,
            count: rides.len(),
            rides,
        }
    }
}

/// Envelope del poll de confirmación del estudiante
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConfirmationResponse {
    pub success: bool,
    pub has_pending: bool,
    pub ride: Option<RideResponse>,
}

impl PendingConfirmationResponse {
    pub fn success(ride: Option<Ride>) -> Self {
        Self {
            success: true,
            has_pending: ride.is_some(),
            ride: ride.map(Into::into),
        }
    }
}

/// Response del toggle de disponibilidad
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub success: bool,
    pub is_online: bool,
    pub message: String,
}
