//! Modelo de disponibilidad del conductor
//!
//! Registro de presencia leído por el motor de dispatch para filtrar
//! qué viajes pendientes son visibles. Se crea en el primer toggle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Registro de disponibilidad - mapea a la tabla driver_availability
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DriverAvailability {
    pub driver_id: Uuid,
    pub is_online: bool,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
