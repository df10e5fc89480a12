//! Controlador de viajes: el motor de matching/dispatch
//!
//! Cada operación sigue el mismo esquema: verificar al llamador, verificar
//! el estado, y pasar la transición por el chokepoint compare_and_transition
//! del store. Ninguna transición se aplica dos veces ni se salta estados:
//! la que llega tarde recibe un error tipado y el registro queda intacto.

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::clients::wallet::{
    fare_reference, payout_reference, refund_reference, WalletGateway,
};
use crate::dto::ride_dto::{
    AcceptRideRequest, BookRideRequest, CancelRideRequest, CompleteRideRequest, ConfirmAction,
    ConfirmCompletionRequest, RateRideRequest,
};
use crate::models::ride::{PaymentMethod, Ride, RideStatus, TimelineEventType};
use crate::models::user::UserRole;
use crate::repositories::availability_repository::AvailabilityRegistry;
use crate::repositories::ride_repository::{NewRide, RideStore, TransitionUpdate};
use crate::utils::errors::{AppError, AppResult};

pub struct RideController<S, A, W> {
    store: S,
    availability: A,
    wallet: W,
}

impl<S, A, W> RideController<S, A, W>
where
    S: RideStore,
    A: AvailabilityRegistry,
    W: WalletGateway,
{
    pub fn new(store: S, availability: A, wallet: W) -> Self {
        Self {
            store,
            availability,
            wallet,
        }
    }

    /// Estudiante solicita un viaje → `pending`
    pub async fn book_ride(&self, student_id: Uuid, request: BookRideRequest) -> AppResult<Ride> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if request.fare <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Fare must be greater than zero".to_string(),
            ));
        }
        if request.pickup_location.address.trim().is_empty()
            || request.dropoff_location.address.trim().is_empty()
        {
            return Err(AppError::Validation(
                "Pickup and dropoff addresses are required".to_string(),
            ));
        }

        let ride = self
            .store
            .create(NewRide {
                student_id,
                pickup_location: request.pickup_location,
                dropoff_location: request.dropoff_location,
                fare: request.fare,
                payment_method: request.payment_method,
                estimated_distance: request.estimated_distance,
                estimated_duration: request.estimated_duration,
            })
            .await?;

        tracing::info!("🚕 Ride {} requested by student {}", ride.id, student_id);
        Ok(ride)
    }

    /// Feed de dispatch del conductor. Un viaje es visible sii está
    /// `pending`, el conductor está en línea y no tiene otro viaje activo.
    /// Un conductor no elegible simplemente ve la lista vacía.
    pub async fn available_rides(&self, driver_id: Uuid) -> AppResult<Vec<Ride>> {
        if !self.availability.is_online(driver_id).await? {
            return Ok(vec![]);
        }
        if self.store.find_active_by_driver(driver_id).await?.is_some() {
            return Ok(vec![]);
        }
        self.store.list_pending().await
    }

    /// Claim del conductor: `pending → accepted`. Con N conductores
    /// compitiendo, exactamente uno gana; el resto recibe `Conflict` y
    /// vuelve a su poll (donde el viaje ya no aparece).
    pub async fn accept_ride(
        &self,
        ride_id: Uuid,
        driver_id: Uuid,
        request: AcceptRideRequest,
    ) -> AppResult<Ride> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if !self.availability.is_online(driver_id).await? {
            return Err(AppError::State(
                "You must be online to accept rides".to_string(),
            ));
        }
        if self.store.find_active_by_driver(driver_id).await?.is_some() {
            return Err(AppError::Conflict(
                "You already have an active ride".to_string(),
            ));
        }

        let update = TransitionUpdate::new(
            RideStatus::Accepted,
            TimelineEventType::Accepted,
            Some("Driver accepted the ride".to_string()),
        )
        .with_driver(driver_id)
        .with_estimated_arrival(request.estimated_arrival);

        let ride = self
            .store
            .compare_and_transition(ride_id, RideStatus::Pending, update)
            .await?;

        tracing::info!("✅ Ride {} claimed by driver {}", ride.id, driver_id);
        Ok(ride)
    }

    /// Conductor inicia el viaje: `accepted → ongoing`
    pub async fn start_ride(&self, ride_id: Uuid, driver_id: Uuid) -> AppResult<Ride> {
        let ride = self.store.get(ride_id).await?;
        if !ride.is_assigned_driver(driver_id) {
            return Err(AppError::Forbidden(
                "You are not the assigned driver for this ride".to_string(),
            ));
        }

        let update = TransitionUpdate::new(
            RideStatus::Ongoing,
            TimelineEventType::Started,
            Some("Trip started".to_string()),
        )
        .with_started_at(Utc::now());

        let ride = self
            .store
            .compare_and_transition(ride_id, RideStatus::Accepted, update)
            .await?;

        tracing::info!("🛣️ Ride {} started by driver {}", ride.id, driver_id);
        Ok(ride)
    }

    /// Conductor solicita completado: `ongoing → completion_requested`.
    /// El viaje no se cuenta como completado ni se debita nada hasta que
    /// el estudiante confirme.
    pub async fn request_completion(
        &self,
        ride_id: Uuid,
        driver_id: Uuid,
        request: CompleteRideRequest,
    ) -> AppResult<Ride> {
        let ride = self.store.get(ride_id).await?;
        if !ride.is_assigned_driver(driver_id) {
            return Err(AppError::Forbidden(
                "You are not the assigned driver for this ride".to_string(),
            ));
        }
        if ride.status != RideStatus::Ongoing {
            return Err(AppError::State(
                "Completion can only be requested for an ongoing ride".to_string(),
            ));
        }

        let update = TransitionUpdate::new(
            RideStatus::CompletionRequested,
            TimelineEventType::CompletionRequested,
            Some("Driver marked the ride as completed".to_string()),
        )
        .with_actuals(request.actual_distance, request.actual_duration)
        .with_completion_requested_at(Utc::now());

        let ride = self
            .store
            .compare_and_transition(ride_id, RideStatus::Ongoing, update)
            .await?;

        tracing::info!(
            "🏁 Ride {} awaiting confirmation from student {}",
            ride.id,
            ride.student_id
        );
        Ok(ride)
    }

    /// Poll del estudiante: a lo sumo un viaje en `completion_requested`
    pub async fn pending_confirmation(&self, student_id: Uuid) -> AppResult<Option<Ride>> {
        self.store.find_pending_confirmation(student_id).await
    }

    /// Puerta de dos salidas del protocolo de confirmación:
    /// confirm → `completed` (con settlement si el pago es Wallet),
    /// reject → `disputed` (sale del flujo automático).
    pub async fn confirm_completion(
        &self,
        ride_id: Uuid,
        student_id: Uuid,
        request: ConfirmCompletionRequest,
    ) -> AppResult<Ride> {
        let ride = self.store.get(ride_id).await?;
        if ride.student_id != student_id {
            return Err(AppError::Forbidden(
                "You are not the student for this ride".to_string(),
            ));
        }
        if ride.status != RideStatus::CompletionRequested {
            return Err(AppError::State(
                "Ride is not awaiting completion confirmation".to_string(),
            ));
        }

        match request.action {
            ConfirmAction::Confirm => self.settle_and_complete(ride).await,
            ConfirmAction::Reject => {
                let reason = request
                    .reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| {
                        AppError::Validation(
                            "A reason is required to dispute a ride".to_string(),
                        )
                    })?
                    .to_string();

                let update = TransitionUpdate::new(
                    RideStatus::Disputed,
                    TimelineEventType::Disputed,
                    Some(reason.clone()),
                )
                .with_dispute_reason(reason);

                let ride = self
                    .store
                    .compare_and_transition(ride_id, RideStatus::CompletionRequested, update)
                    .await?;

                tracing::warn!("⚠️ Ride {} disputed by student {}", ride.id, student_id);
                Ok(ride)
            }
        }
    }

    /// Débito → transición → payout. El débito va primero para que un saldo
    /// insuficiente deje el viaje en `completion_requested` sin cambios, y
    /// ninguna llamada al gateway se hace con el lock de fila tomado. Si la
    /// transición pierde una carrera tras el débito, se emite el crédito de
    /// compensación con su referencia dedicada.
    async fn settle_and_complete(&self, ride: Ride) -> AppResult<Ride> {
        let pay_with_wallet = ride.payment_method == PaymentMethod::Wallet;

        if pay_with_wallet {
            self.wallet
                .debit(ride.student_id, ride.fare, &fare_reference(ride.id))
                .await?;
        }

        let update = TransitionUpdate::new(
            RideStatus::Completed,
            TimelineEventType::Completed,
            Some("Ride completed".to_string()),
        )
        .clearing_completion_requested_at()
        .with_completed_at(Utc::now());

        let completed = match self
            .store
            .compare_and_transition(ride.id, RideStatus::CompletionRequested, update)
            .await
        {
            Ok(completed) => completed,
            Err(err) => {
                // Si la carrera la ganó un confirm duplicado, el débito ya
                // quedó liquidado (el gateway deduplica por referencia):
                // se responde idempotente con el viaje completado, sin
                // reembolso. El reembolso solo corresponde cuando el viaje
                // salió de completion_requested hacia disputa/escalamiento.
                if let Ok(current) = self.store.get(ride.id).await {
                    if current.status == RideStatus::Completed {
                        return Ok(current);
                    }
                }
                if pay_with_wallet {
                    if let Err(refund_err) = self
                        .wallet
                        .credit(ride.student_id, ride.fare, &refund_reference(ride.id))
                        .await
                    {
                        tracing::error!(
                            "❌ Refund failed for ride {} after lost race: {}",
                            ride.id,
                            refund_err
                        );
                    }
                }
                return Err(err);
            }
        };

        if pay_with_wallet {
            if let Some(driver_id) = completed.driver_id {
                if let Err(err) = self
                    .wallet
                    .credit(driver_id, completed.fare, &payout_reference(completed.id))
                    .await
                {
                    // El viaje queda completado; el payout pasa a soporte
                    tracing::error!(
                        "❌ Driver payout failed for ride {}: {}",
                        completed.id,
                        err
                    );
                }
            }
        }

        tracing::info!("🎉 Ride {} confirmed and completed", completed.id);
        Ok(completed)
    }

    /// Cancelación: solo desde `pending` o `accepted`, solo por el
    /// estudiante o el conductor asignado. Una cancelación que corre contra
    /// otro cambio de estado se resuelve por el mismo chokepoint.
    pub async fn cancel_ride(
        &self,
        ride_id: Uuid,
        caller_id: Uuid,
        caller_role: UserRole,
        request: CancelRideRequest,
    ) -> AppResult<Ride> {
        let ride = self.store.get(ride_id).await?;

        let authorized = match caller_role {
            UserRole::Student => ride.student_id == caller_id,
            UserRole::Driver => ride.is_assigned_driver(caller_id),
        };
        if !authorized {
            return Err(AppError::Forbidden(
                "You cannot cancel a ride that is not yours".to_string(),
            ));
        }

        if !matches!(ride.status, RideStatus::Pending | RideStatus::Accepted) {
            return Err(AppError::State(
                "Ride can no longer be cancelled".to_string(),
            ));
        }

        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        // La razón es opcional para el estudiante, obligatoria para el conductor
        if caller_role == UserRole::Driver && reason.is_none() {
            return Err(AppError::Validation(
                "Drivers must provide a cancellation reason".to_string(),
            ));
        }

        let message = reason
            .clone()
            .unwrap_or_else(|| "Ride cancelled".to_string());
        let update = TransitionUpdate::new(
            RideStatus::Cancelled,
            TimelineEventType::Cancelled,
            Some(message),
        )
        .with_cancel_reason(reason);

        let ride = self
            .store
            .compare_and_transition(ride_id, ride.status, update)
            .await?;

        tracing::info!("🚫 Ride {} cancelled by {:?} {}", ride.id, caller_role, caller_id);
        Ok(ride)
    }

    /// Calificación: una sola vez, solo por el estudiante, solo `completed`
    pub async fn rate_ride(
        &self,
        ride_id: Uuid,
        student_id: Uuid,
        request: RateRideRequest,
    ) -> AppResult<Ride> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let ride = self.store.get(ride_id).await?;
        if ride.student_id != student_id {
            return Err(AppError::Forbidden(
                "You are not the student for this ride".to_string(),
            ));
        }

        self.store
            .set_rating(ride_id, request.rating, request.review)
            .await
    }

    /// Detalle con verificación de pertenencia
    pub async fn get_ride(
        &self,
        ride_id: Uuid,
        caller_id: Uuid,
        caller_role: UserRole,
    ) -> AppResult<Ride> {
        let ride = self.store.get(ride_id).await?;
        let authorized = match caller_role {
            UserRole::Student => ride.student_id == caller_id,
            UserRole::Driver => ride.is_assigned_driver(caller_id),
        };
        if !authorized {
            return Err(AppError::Forbidden(
                "You do not have access to this ride".to_string(),
            ));
        }
        Ok(ride)
    }

    pub async fn list_student_rides(
        &self,
        student_id: Uuid,
        status: Option<RideStatus>,
    ) -> AppResult<Vec<Ride>> {
        self.store.list_by_student(student_id, status).await
    }

    pub async fn list_driver_rides(
        &self,
        driver_id: Uuid,
        status: Option<RideStatus>,
    ) -> AppResult<Vec<Ride>> {
        self.store.list_by_driver(driver_id, status).await
    }
}
