//! Escalamiento de confirmaciones vencidas
//!
//! Un viaje no puede quedarse en `completion_requested` para siempre:
//! pasada la ventana configurada se mueve a `disputed` para revisión
//! manual, de modo que el pago del conductor no quede rehén de un
//! estudiante que no responde. El barrido corre en un task de fondo.

use chrono::{DateTime, Utc};

use crate::models::ride::{RideStatus, TimelineEventType};
use crate::repositories::ride_repository::{RideStore, TransitionUpdate};
use crate::utils::errors::{AppError, AppResult};

pub struct EscalationService<S> {
    store: S,
}

impl<S> EscalationService<S>
where
    S: RideStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Escalar toda confirmación solicitada antes de `older_than`.
    /// Devuelve cuántos viajes se escalaron.
    pub async fn run_sweep(&self, older_than: DateTime<Utc>) -> AppResult<usize> {
        let stale = self.store.list_stale_confirmations(older_than).await?;
        let mut escalated = 0;

        for ride in stale {
            let update = TransitionUpdate::new(
                RideStatus::Disputed,
                TimelineEventType::Escalated,
                Some("Escalated to support: confirmation window expired".to_string()),
            )
            .with_dispute_reason("Completion confirmation timed out".to_string());

            match self
                .store
                .compare_and_transition(ride.id, RideStatus::CompletionRequested, update)
                .await
            {
                Ok(_) => {
                    tracing::warn!("⏰ Ride {} escalated after confirmation timeout", ride.id);
                    escalated += 1;
                }
                // El estudiante resolvió entre el listado y la transición
                Err(AppError::Conflict(_)) => {}
                Err(err) => {
                    tracing::error!("Escalation failed for ride {}: {}", ride.id, err);
                }
            }
        }

        Ok(escalated)
    }
}
