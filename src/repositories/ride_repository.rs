//! Repositorio de viajes
//!
//! Única fuente de verdad del ciclo de vida. Todos los cambios de `status`
//! pasan por `compare_and_transition`: un UPDATE condicionado al estado
//! esperado que resuelve las carreras de claim entre conductores. El que
//! pierde la carrera recibe `Conflict` y debe refrescar su lectura.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ride::{
    Location, PaymentMethod, Ride, RideStatus, TimelineEvent, TimelineEventType,
};
use crate::utils::errors::{not_found_error, AppError, AppResult};

/// Datos de creación de un viaje (status inicial siempre `pending`)
#[derive(Debug, Clone)]
pub struct NewRide {
    pub student_id: Uuid,
    pub pickup_location: Location,
    pub dropoff_location: Location,
    pub fare: Decimal,
    pub payment_method: PaymentMethod,
    pub estimated_distance: Option<Decimal>,
    pub estimated_duration: Option<i32>,
}

/// Mutación atómica de estado: nuevo status + evento de timeline + campos
/// que la transición fija. Se aplica solo si el status actual coincide con
/// el esperado; en caso contrario no se toca ningún campo.
#[derive(Debug, Clone)]
pub struct TransitionUpdate {
    new_status: RideStatus,
    event: TimelineEvent,
    driver_id: Option<Uuid>,
    estimated_arrival: Option<i32>,
    actual_distance: Option<Decimal>,
    actual_duration: Option<i32>,
    set_completion_requested_at: Option<DateTime<Utc>>,
    clear_completion_requested_at: bool,
    cancel_reason: Option<String>,
    dispute_reason: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TransitionUpdate {
    pub fn new(
        new_status: RideStatus,
        event_type: TimelineEventType,
        message: Option<String>,
    ) -> Self {
        Self {
            new_status,
            event: TimelineEvent::now(event_type, message),
            driver_id: None,
            estimated_arrival: None,
            actual_distance: None,
            actual_duration: None,
            set_completion_requested_at: None,
            clear_completion_requested_at: false,
            cancel_reason: None,
            dispute_reason: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn new_status(&self) -> RideStatus {
        self.new_status
    }

    pub fn driver_id(&self) -> Option<Uuid> {
        self.driver_id
    }

    pub fn with_driver(mut self, driver_id: Uuid) -> Self {
        self.driver_id = Some(driver_id);
        self
    }

    pub fn with_estimated_arrival(mut self, minutes: i32) -> Self {
        self.estimated_arrival = Some(minutes);
        self
    }

    pub fn with_actuals(mut self, distance: Decimal, duration: i32) -> Self {
        self.actual_distance = Some(distance);
        self.actual_duration = Some(duration);
        self
    }

    pub fn with_completion_requested_at(mut self, at: DateTime<Utc>) -> Self {
        self.set_completion_requested_at = Some(at);
        self
    }

    /// Las resoluciones terminales limpian el marcador de confirmación
    pub fn clearing_completion_requested_at(mut self) -> Self {
        self.clear_completion_requested_at = true;
        self
    }

    pub fn with_cancel_reason(mut self, reason: Option<String>) -> Self {
        self.cancel_reason = reason;
        self
    }

    pub fn with_dispute_reason(mut self, reason: String) -> Self {
        self.dispute_reason = Some(reason);
        self
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn with_completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    /// Aplicar la mutación sobre un registro en memoria.
    /// Debe producir exactamente el mismo resultado que el UPDATE SQL
    /// de PgRideRepository; la usa el store en memoria de los tests.
    pub fn apply(&self, ride: &mut Ride) {
        ride.status = self.new_status;
        if let Some(driver_id) = self.driver_id {
            ride.driver_id = Some(driver_id);
        }
        if let Some(eta) = self.estimated_arrival {
            ride.estimated_arrival = Some(eta);
        }
        if let Some(distance) = self.actual_distance {
            ride.actual_distance = Some(distance);
        }
        if let Some(duration) = self.actual_duration {
            ride.actual_duration = Some(duration);
        }
        if self.clear_completion_requested_at {
            ride.completion_requested_at = None;
        } else if let Some(at) = self.set_completion_requested_at {
            ride.completion_requested_at = Some(at);
        }
        if let Some(reason) = &self.cancel_reason {
            ride.cancel_reason = Some(reason.clone());
        }
        if let Some(reason) = &self.dispute_reason {
            ride.dispute_reason = Some(reason.clone());
        }
        if let Some(at) = self.started_at {
            ride.started_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            ride.completed_at = Some(at);
        }
        ride.timeline.0.push(self.event.clone());
    }
}

/// Almacén de viajes: chokepoint de todas las transiciones de estado
#[async_trait]
pub trait RideStore: Send + Sync {
    async fn create(&self, new_ride: NewRide) -> AppResult<Ride>;

    async fn get(&self, ride_id: Uuid) -> AppResult<Ride>;

    /// Verifica atómicamente que el status actual es `expected` antes de
    /// aplicar `update`. Si no coincide falla con `Conflict` sin cambios.
    async fn compare_and_transition(
        &self,
        ride_id: Uuid,
        expected: RideStatus,
        update: TransitionUpdate,
    ) -> AppResult<Ride>;

    async fn list_by_student(
        &self,
        student_id: Uuid,
        status: Option<RideStatus>,
    ) -> AppResult<Vec<Ride>>;

    async fn list_by_driver(
        &self,
        driver_id: Uuid,
        status: Option<RideStatus>,
    ) -> AppResult<Vec<Ride>>;

    /// Viajes `pending` más recientes primero (feed de dispatch)
    async fn list_pending(&self) -> AppResult<Vec<Ride>>;

    /// Viaje activo del conductor, si existe (accepted/ongoing/completion_requested)
    async fn find_active_by_driver(&self, driver_id: Uuid) -> AppResult<Option<Ride>>;

    /// Viaje esperando confirmación del estudiante (a lo sumo uno)
    async fn find_pending_confirmation(&self, student_id: Uuid) -> AppResult<Option<Ride>>;

    /// Confirmaciones vencidas para el barrido de escalamiento
    async fn list_stale_confirmations(&self, older_than: DateTime<Utc>) -> AppResult<Vec<Ride>>;

    /// Calificación: solo una vez y solo sobre un viaje `completed`
    async fn set_rating(
        &self,
        ride_id: Uuid,
        rating: i16,
        review: Option<String>,
    ) -> AppResult<Ride>;
}

pub struct PgRideRepository {
    pool: PgPool,
}

impl PgRideRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RideStore for PgRideRepository {
    async fn create(&self, new_ride: NewRide) -> AppResult<Ride> {
        let timeline = vec![TimelineEvent::now(
            TimelineEventType::Requested,
            Some("Ride requested".to_string()),
        )];

        let ride = sqlx::query_as::<_, Ride>(
            r#"
            INSERT INTO rides (
                id, student_id, pickup_location, dropoff_location, fare,
                payment_method, status, estimated_distance, estimated_duration,
                timeline, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_ride.student_id)
        .bind(Json(&new_ride.pickup_location))
        .bind(Json(&new_ride.dropoff_location))
        .bind(new_ride.fare)
        .bind(new_ride.payment_method)
        .bind(RideStatus::Pending)
        .bind(new_ride.estimated_distance)
        .bind(new_ride.estimated_duration)
        .bind(Json(&timeline))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(ride)
    }

    async fn get(&self, ride_id: Uuid) -> AppResult<Ride> {
        let ride = sqlx::query_as::<_, Ride>("SELECT * FROM rides WHERE id = $1")
            .bind(ride_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found_error("Ride", &ride_id.to_string()))?;

        Ok(ride)
    }

    async fn compare_and_transition(
        &self,
        ride_id: Uuid,
        expected: RideStatus,
        update: TransitionUpdate,
    ) -> AppResult<Ride> {
        let result = sqlx::query_as::<_, Ride>(
            r#"
            UPDATE rides SET
                status = $3,
                driver_id = COALESCE($4, driver_id),
                estimated_arrival = COALESCE($5, estimated_arrival),
                actual_distance = COALESCE($6, actual_distance),
                actual_duration = COALESCE($7, actual_duration),
                completion_requested_at = CASE
                    WHEN $8 THEN NULL
                    ELSE COALESCE($9, completion_requested_at)
                END,
                cancel_reason = COALESCE($10, cancel_reason),
                dispute_reason = COALESCE($11, dispute_reason),
                started_at = COALESCE($12, started_at),
                completed_at = COALESCE($13, completed_at),
                timeline = timeline || $14
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(ride_id)
        .bind(expected)
        .bind(update.new_status)
        .bind(update.driver_id)
        .bind(update.estimated_arrival)
        .bind(update.actual_distance)
        .bind(update.actual_duration)
        .bind(update.clear_completion_requested_at)
        .bind(update.set_completion_requested_at)
        .bind(&update.cancel_reason)
        .bind(&update.dispute_reason)
        .bind(update.started_at)
        .bind(update.completed_at)
        .bind(Json(&update.event))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match &e {
            // El índice parcial "un viaje activo por conductor" corta la
            // carrera de dos accepts simultáneos del mismo conductor
            sqlx::Error::Database(db)
                if db.constraint() == Some("idx_rides_driver_active") =>
            {
                AppError::Conflict("Driver already has an active ride".to_string())
            }
            _ => AppError::Database(e),
        })?;

        match result {
            Some(ride) => Ok(ride),
            None => {
                // Distinguir viaje inexistente de carrera perdida
                let current = self.get(ride_id).await?;
                Err(AppError::Conflict(format!(
                    "Ride is '{}', expected '{}'",
                    current.status.as_str(),
                    expected.as_str()
                )))
            }
        }
    }

    async fn list_by_student(
        &self,
        student_id: Uuid,
        status: Option<RideStatus>,
    ) -> AppResult<Vec<Ride>> {
        let rides = sqlx::query_as::<_, Ride>(
            r#"
            SELECT * FROM rides
            WHERE student_id = $1
              AND ($2::ride_status IS NULL OR status = $2::ride_status)
            ORDER BY created_at DESC
            "#,
        )
        .bind(student_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(rides)
    }

    async fn list_by_driver(
        &self,
        driver_id: Uuid,
        status: Option<RideStatus>,
    ) -> AppResult<Vec<Ride>> {
        let rides = sqlx::query_as::<_, Ride>(
            r#"
            SELECT * FROM rides
            WHERE driver_id = $1
              AND ($2::ride_status IS NULL OR status = $2::ride_status)
            ORDER BY created_at DESC
            "#,
        )
        .bind(driver_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(rides)
    }

    async fn list_pending(&self) -> AppResult<Vec<Ride>> {
        let rides = sqlx::query_as::<_, Ride>(
            "SELECT * FROM rides WHERE status = 'pending' ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rides)
    }

    async fn find_active_by_driver(&self, driver_id: Uuid) -> AppResult<Option<Ride>> {
        let ride = sqlx::query_as::<_, Ride>(
            r#"
            SELECT * FROM rides
            WHERE driver_id = $1
              AND status IN ('accepted', 'ongoing', 'completion_requested')
            LIMIT 1
            "#,
        )
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ride)
    }

    async fn find_pending_confirmation(&self, student_id: Uuid) -> AppResult<Option<Ride>> {
        let ride = sqlx::query_as::<_, Ride>(
            r#"
            SELECT * FROM rides
            WHERE student_id = $1 AND status = 'completion_requested'
            ORDER BY completion_requested_at ASC
            LIMIT 1
            "#,
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ride)
    }

    async fn list_stale_confirmations(&self, older_than: DateTime<Utc>) -> AppResult<Vec<Ride>> {
        let rides = sqlx::query_as::<_, Ride>(
            r#"
            SELECT * FROM rides
            WHERE status = 'completion_requested' AND completion_requested_at < $1
            ORDER BY completion_requested_at ASC
            "#,
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        Ok(rides)
    }

    async fn set_rating(
        &self,
        ride_id: Uuid,
        rating: i16,
        review: Option<String>,
    ) -> AppResult<Ride> {
        let result = sqlx::query_as::<_, Ride>(
            r#"
            UPDATE rides SET rating = $2, review = $3
            WHERE id = $1 AND status = 'completed' AND rating IS NULL
            RETURNING *
            "#,
        )
        .bind(ride_id)
        .bind(rating)
        .bind(&review)
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(ride) => Ok(ride),
            None => {
                let current = self.get(ride_id).await?;
                if current.status != RideStatus::Completed {
                    Err(AppError::State(
                        "Only completed rides can be rated".to_string(),
                    ))
                } else {
                    Err(AppError::State(
                        "Ride has already been rated".to_string(),
                    ))
                }
            }
        }
    }
}
