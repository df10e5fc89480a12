//! Cliente HTTP para el Wallet Settlement Gateway
//!
//! El ledger vive en un servicio externo; aquí solo se consulta saldo y se
//! ordenan débitos/créditos. Cada operación lleva una referencia de
//! settlement ligada al ride id para que los reintentos no dupliquen
//! movimientos (el gateway deduplica por referencia).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::errors::{AppError, AppResult};

/// Interfaz del gateway de settlement
#[async_trait]
pub trait WalletGateway: Send + Sync {
    async fn get_balance(&self, user_id: Uuid) -> AppResult<Decimal>;

    /// Debitar al estudiante. `Settlement` si el saldo es insuficiente.
    async fn debit(&self, user_id: Uuid, amount: Decimal, reference: &str) -> AppResult<()>;

    /// Acreditar al conductor (o devolver al estudiante una compensación).
    async fn credit(&self, user_id: Uuid, amount: Decimal, reference: &str) -> AppResult<()>;
}

#[async_trait]
impl<T> WalletGateway for std::sync::Arc<T>
where
    T: WalletGateway + ?Sized,
{
    async fn get_balance(&self, user_id: Uuid) -> AppResult<Decimal> {
        (**self).get_balance(user_id).await
    }

    async fn debit(&self, user_id: Uuid, amount: Decimal, reference: &str) -> AppResult<()> {
        (**self).debit(user_id, amount, reference).await
    }

    async fn credit(&self, user_id: Uuid, amount: Decimal, reference: &str) -> AppResult<()> {
        (**self).credit(user_id, amount, reference).await
    }
}

/// Request de movimiento de wallet
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletMovementRequest {
    user_id: Uuid,
    amount: Decimal,
    reference: String,
}

/// Respuesta genérica del servicio de wallet
#[derive(Debug, Deserialize)]
struct WalletMovementResponse {
    success: bool,
    message: Option<String>,
    code: Option<String>,
}

/// Respuesta de consulta de saldo
#[derive(Debug, Deserialize)]
struct WalletBalanceResponse {
    success: bool,
    balance: Decimal,
}

/// Cliente HTTP del servicio de wallet
#[derive(Clone)]
pub struct WalletServiceClient {
    client: Client,
    base_url: String,
}

impl WalletServiceClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    async fn movement(
        &self,
        endpoint: &str,
        user_id: Uuid,
        amount: Decimal,
        reference: &str,
    ) -> AppResult<()> {
        let url = format!("{}/wallet/{}", self.base_url, endpoint);
        let request = WalletMovementRequest {
            user_id,
            amount,
            reference: reference.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ExternalApi(format!("Wallet service unreachable: {}", e)))?;

        let status = response.status();
        let body: WalletMovementResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalApi(format!("Invalid wallet response: {}", e)))?;

        if body.success {
            return Ok(());
        }

        // El gateway señala saldo insuficiente con 402 o code dedicado
        if status == StatusCode::PAYMENT_REQUIRED
            || body.code.as_deref() == Some("INSUFFICIENT_FUNDS")
        {
            return Err(AppError::Settlement(
                body.message
                    .unwrap_or_else(|| "Insufficient wallet balance".to_string()),
            ));
        }

        Err(AppError::ExternalApi(format!(
            "Wallet {} failed ({}): {}",
            endpoint,
            status,
            body.message.unwrap_or_default()
        )))
    }
}

#[async_trait]
impl WalletGateway for WalletServiceClient {
    async fn get_balance(&self, user_id: Uuid) -> AppResult<Decimal> {
        let url = format!("{}/wallet/{}/balance", self.base_url, user_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::ExternalApi(format!("Wallet service unreachable: {}", e)))?;

        let body: WalletBalanceResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalApi(format!("Invalid wallet response: {}", e)))?;

        if !body.success {
            return Err(AppError::ExternalApi(
                "Wallet balance lookup failed".to_string(),
            ));
        }

        Ok(body.balance)
    }

    async fn debit(&self, user_id: Uuid, amount: Decimal, reference: &str) -> AppResult<()> {
        self.movement("debit", user_id, amount, reference).await
    }

    async fn credit(&self, user_id: Uuid, amount: Decimal, reference: &str) -> AppResult<()> {
        self.movement("credit", user_id, amount, reference).await
    }
}

/// Referencias de settlement por viaje (idempotencia en el gateway)
pub fn fare_reference(ride_id: Uuid) -> String {
    format!("ride:{}:fare", ride_id)
}

pub fn payout_reference(ride_id: Uuid) -> String {
    format!("ride:{}:payout", ride_id)
}

pub fn refund_reference(ride_id: Uuid) -> String {
    format!("ride:{}:refund", ride_id)
}
