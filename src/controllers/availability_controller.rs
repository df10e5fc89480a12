//! Controlador de disponibilidad del conductor

use uuid::Uuid;

use crate::dto::ride_dto::{AvailabilityRequest, AvailabilityResponse};
use crate::models::driver::DriverAvailability;
use crate::repositories::availability_repository::AvailabilityRegistry;
use crate::utils::errors::AppResult;

pub struct AvailabilityController<A> {
    registry: A,
}

impl<A> AvailabilityController<A>
where
    A: AvailabilityRegistry,
{
    pub fn new(registry: A) -> Self {
        Self { registry }
    }

    /// Con body explícito fija el estado (idempotente); sin body hace toggle.
    /// Apagarse con un viaje activo no cancela el viaje: solo deja de
    /// recibir nuevos pendientes en el feed.
    pub async fn set_availability(
        &self,
        driver_id: Uuid,
        request: AvailabilityRequest,
    ) -> AppResult<AvailabilityResponse> {
        let target = match request.is_online {
            Some(online) => online,
            None => !self.registry.is_online(driver_id).await?,
        };

        let record: DriverAvailability = self.registry.set_online(driver_id, target).await?;

        tracing::info!(
            "📡 Driver {} is now {}",
            driver_id,
            if record.is_online { "online" } else { "offline" }
        );

        Ok(AvailabilityResponse {
            success: true,
            is_online: record.is_online,
            message: if record.is_online {
                "You are now online and visible to ride requests".to_string()
            } else {
                "You are now offline".to_string()
            },
        })
    }
}
