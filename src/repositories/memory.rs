//! Implementaciones en memoria de los stores
//!
//! Mismo contrato que las variantes Postgres sobre un HashMap compartido.
//! Las usan los tests de dispatch para ejercitar el motor (incluida la
//! carrera de claim) sin una base de datos viva. El write-lock del mapa
//! cubre la verificación y la mutación, así que compare_and_transition
//! conserva su atomicidad.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::driver::DriverAvailability;
use crate::models::ride::{Ride, RideStatus, TimelineEvent, TimelineEventType};
use crate::repositories::availability_repository::AvailabilityRegistry;
use crate::repositories::ride_repository::{NewRide, RideStore, TransitionUpdate};
use crate::utils::errors::{not_found_error, AppError, AppResult};

#[derive(Clone, Default)]
pub struct MemoryRideStore {
    rides: Arc<RwLock<HashMap<Uuid, Ride>>>,
}

impl MemoryRideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajustar el marcador de confirmación hacia el pasado
    /// (para probar el barrido de escalamiento).
    pub async fn backdate_completion_request(&self, ride_id: Uuid, at: DateTime<Utc>) {
        if let Some(ride) = self.rides.write().await.get_mut(&ride_id) {
            ride.completion_requested_at = Some(at);
        }
    }
}

#[async_trait]
impl RideStore for MemoryRideStore {
    async fn create(&self, new_ride: NewRide) -> AppResult<Ride> {
        let ride = Ride {
            id: Uuid::new_v4(),
            student_id: new_ride.student_id,
            driver_id: None,
            pickup_location: Json(new_ride.pickup_location),
            dropoff_location: Json(new_ride.dropoff_location),
            fare: new_ride.fare,
            payment_method: new_ride.payment_method,
            status: RideStatus::Pending,
            estimated_distance: new_ride.estimated_distance,
            estimated_duration: new_ride.estimated_duration,
            estimated_arrival: None,
            actual_distance: None,
            actual_duration: None,
            completion_requested_at: None,
            cancel_reason: None,
            dispute_reason: None,
            rating: None,
            review: None,
            timeline: Json(vec![TimelineEvent::now(
                TimelineEventType::Requested,
                Some("Ride requested".to_string()),
            )]),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        self.rides.write().await.insert(ride.id, ride.clone());
        Ok(ride)
    }

    async fn get(&self, ride_id: Uuid) -> AppResult<Ride> {
        self.rides
            .read()
            .await
            .get(&ride_id)
            .cloned()
            .ok_or_else(|| not_found_error("Ride", &ride_id.to_string()))
    }

    async fn compare_and_transition(
        &self,
        ride_id: Uuid,
        expected: RideStatus,
        update: TransitionUpdate,
    ) -> AppResult<Ride> {
        let mut rides = self.rides.write().await;
        let current = rides
            .get(&ride_id)
            .ok_or_else(|| not_found_error("Ride", &ride_id.to_string()))?;

        if current.status != expected {
            return Err(AppError::Conflict(format!(
                "Ride is '{}', expected '{}'",
                current.status.as_str(),
                expected.as_str()
            )));
        }

        // Espejo del índice único parcial: a lo sumo un viaje activo por conductor
        if update.new_status().is_active() {
            if let Some(driver_id) = update.driver_id().or(current.driver_id) {
                let busy = rides.values().any(|r| {
                    r.id != ride_id && r.driver_id == Some(driver_id) && r.status.is_active()
                });
                if busy {
                    return Err(AppError::Conflict(
                        "Driver already has an active ride".to_string(),
                    ));
                }
            }
        }

        let ride = rides
            .get_mut(&ride_id)
            .ok_or_else(|| not_found_error("Ride", &ride_id.to_string()))?;
        update.apply(ride);
        Ok(ride.clone())
    }

    async fn list_by_student(
        &self,
        student_id: Uuid,
        status: Option<RideStatus>,
    ) -> AppResult<Vec<Ride>> {
        let rides = self.rides.read().await;
        let mut result: Vec<Ride> = rides
            .values()
            .filter(|r| r.student_id == student_id)
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn list_by_driver(
        &self,
        driver_id: Uuid,
        status: Option<RideStatus>,
    ) -> AppResult<Vec<Ride>> {
        let rides = self.rides.read().await;
        let mut result: Vec<Ride> = rides
            .values()
            .filter(|r| r.driver_id == Some(driver_id))
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn list_pending(&self) -> AppResult<Vec<Ride>> {
        let rides = self.rides.read().await;
        let mut result: Vec<Ride> = rides
            .values()
            .filter(|r| r.status == RideStatus::Pending)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn find_active_by_driver(&self, driver_id: Uuid) -> AppResult<Option<Ride>> {
        let rides = self.rides.read().await;
        Ok(rides
            .values()
            .find(|r| r.driver_id == Some(driver_id) && r.status.is_active())
            .cloned())
    }

    async fn find_pending_confirmation(&self, student_id: Uuid) -> AppResult<Option<Ride>> {
        let rides = self.rides.read().await;
        Ok(rides
            .values()
            .find(|r| r.student_id == student_id && r.status == RideStatus::CompletionRequested)
            .cloned())
    }

    async fn list_stale_confirmations(&self, older_than: DateTime<Utc>) -> AppResult<Vec<Ride>> {
        let rides = self.rides.read().await;
        Ok(rides
            .values()
            .filter(|r| {
                r.status == RideStatus::CompletionRequested
                    && r.completion_requested_at
                        .map_or(false, |at| at < older_than)
            })
            .cloned()
            .collect())
    }

    async fn set_rating(
        &self,
        ride_id: Uuid,
        rating: i16,
        review: Option<String>,
    ) -> AppResult<Ride> {
        let mut rides = self.rides.write().await;
        let ride = rides
            .get_mut(&ride_id)
            .ok_or_else(|| not_found_error("Ride", &ride_id.to_string()))?;

        if ride.status != RideStatus::Completed {
            return Err(AppError::State(
                "Only completed rides can be rated".to_string(),
            ));
        }
        if ride.rating.is_some() {
            return Err(AppError::State("Ride has already been rated".to_string()));
        }

        ride.rating = Some(rating);
        ride.review = review;
        Ok(ride.clone())
    }
}

#[derive(Clone, Default)]
pub struct MemoryAvailabilityRegistry {
    drivers: Arc<RwLock<HashMap<Uuid, DriverAvailability>>>,
}

impl MemoryAvailabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AvailabilityRegistry for MemoryAvailabilityRegistry {
    async fn set_online(&self, driver_id: Uuid, online: bool) -> AppResult<DriverAvailability> {
        let now = Utc::now();
        let mut drivers = self.drivers.write().await;
        let record = drivers
            .entry(driver_id)
            .and_modify(|r| {
                r.is_online = online;
                r.last_seen_at = now;
            })
            .or_insert(DriverAvailability {
                driver_id,
                is_online: online,
                last_seen_at: now,
                created_at: now,
            });
        Ok(record.clone())
    }

    async fn is_online(&self, driver_id: Uuid) -> AppResult<bool> {
        Ok(self
            .drivers
            .read()
            .await
            .get(&driver_id)
            .map_or(false, |r| r.is_online))
    }

    async fn list_online_drivers(&self) -> AppResult<Vec<Uuid>> {
        Ok(self
            .drivers
            .read()
            .await
            .values()
            .filter(|r| r.is_online)
            .map(|r| r.driver_id)
            .collect())
    }
}
