//! Modelo de Ride
//!
//! Este módulo contiene el struct Ride y los enums de su ciclo de vida.
//! Mapea exactamente al schema PostgreSQL con primary key 'id'.
//! El campo `status` solo se muta a través del chokepoint
//! compare_and_transition del RideStore.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Estado del viaje - mapea al ENUM ride_status
///
/// Transiciones válidas:
/// pending → accepted → ongoing → completion_requested → completed
/// pending/accepted → cancelled
/// completion_requested → disputed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "ride_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    Accepted,
    Ongoing,
    CompletionRequested,
    Completed,
    Cancelled,
    Disputed,
}

impl RideStatus {
    /// Nombre en el formato del contrato HTTP ("completion_requested", etc.)
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::Accepted => "accepted",
            RideStatus::Ongoing => "ongoing",
            RideStatus::CompletionRequested => "completion_requested",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
            RideStatus::Disputed => "disputed",
        }
    }

    /// Estados terminales: no admiten más transiciones
    /// (rating sobre `completed` es la única mutación posterior).
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    /// Estados que cuentan como "viaje activo" de un conductor:
    /// mientras exista uno, el conductor no ve nuevos viajes pendientes.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RideStatus::Accepted | RideStatus::Ongoing | RideStatus::CompletionRequested
        )
    }
}

/// Método de pago - mapea al ENUM payment_method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payment_method", rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Wallet,
}

/// Coordenadas geográficas opcionales de una dirección
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coords {
    pub lat: f64,
    pub lng: f64,
}

/// Dirección de recogida o destino (columna JSONB)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coords: Option<Coords>,
}

/// Tipo de evento del timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventType {
    Requested,
    Accepted,
    Started,
    CompletionRequested,
    Completed,
    Disputed,
    Cancelled,
    Escalated,
}

/// Evento del timeline append-only del viaje.
/// Se agrega exactamente uno por transición; nunca se muta ni se borra.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    #[serde(rename = "type")]
    pub event_type: TimelineEventType,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TimelineEvent {
    pub fn now(event_type: TimelineEventType, message: Option<String>) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            message,
        }
    }
}

/// Ride principal - mapea exactamente a la tabla rides
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ride {
    pub id: Uuid,
    pub student_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup_location: Json<Location>,
    pub dropoff_location: Json<Location>,
    pub fare: Decimal,
    pub payment_method: PaymentMethod,
    pub status: RideStatus,
    pub estimated_distance: Option<Decimal>,
    pub estimated_duration: Option<i32>,
    pub estimated_arrival: Option<i32>,
    pub actual_distance: Option<Decimal>,
    pub actual_duration: Option<i32>,
    pub completion_requested_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub dispute_reason: Option<String>,
    pub rating: Option<i16>,
    pub review: Option<String>,
    pub timeline: Json<Vec<TimelineEvent>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Ride {
    /// Verificar que el conductor indicado es el asignado a este viaje
    pub fn is_assigned_driver(&self, driver_id: Uuid) -> bool {
        self.driver_id == Some(driver_id)
    }
}
