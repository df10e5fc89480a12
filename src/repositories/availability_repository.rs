//! Registro de disponibilidad de conductores
//!
//! Presencia por conductor, sin locking cruzado: cada registro es
//! independiente. Apagarse con un viaje activo no cancela el viaje,
//! solo corta la visibilidad de nuevos pendientes.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::driver::DriverAvailability;
use crate::utils::errors::AppResult;

#[async_trait]
pub trait AvailabilityRegistry: Send + Sync {
    /// Idempotente: crea el registro en el primer toggle y
    /// actualiza `last_seen_at` en cada llamada.
    async fn set_online(&self, driver_id: Uuid, online: bool) -> AppResult<DriverAvailability>;

    async fn is_online(&self, driver_id: Uuid) -> AppResult<bool>;

    async fn list_online_drivers(&self) -> AppResult<Vec<Uuid>>;
}

pub struct PgAvailabilityRepository {
    pool: PgPool,
}

impl PgAvailabilityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AvailabilityRegistry for PgAvailabilityRepository {
    async fn set_online(&self, driver_id: Uuid, online: bool) -> AppResult<DriverAvailability> {
        let record = sqlx::query_as::<_, DriverAvailability>(
            r#"
            INSERT INTO driver_availability (driver_id, is_online, last_seen_at, created_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (driver_id)
            DO UPDATE SET is_online = $2, last_seen_at = $3
            RETURNING *
            "#,
        )
        .bind(driver_id)
        .bind(online)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn is_online(&self, driver_id: Uuid) -> AppResult<bool> {
        let result: Option<(bool,)> = sqlx::query_as(
            "SELECT is_online FROM driver_availability WHERE driver_id = $1",
        )
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await?;

        // Sin registro todavía: el conductor nunca se puso en línea
        Ok(result.map(|(online,)| online).unwrap_or(false))
    }

    async fn list_online_drivers(&self) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT driver_id FROM driver_availability WHERE is_online = TRUE",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
