//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum.

use reqwest::Client;
use sqlx::PgPool;

use crate::clients::wallet::WalletServiceClient;
use crate::config::environment::EnvironmentConfig;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: EnvironmentConfig,
    pub wallet: WalletServiceClient,
}

impl AppState {
    pub fn new(pool: PgPool, config: EnvironmentConfig) -> Self {
        let wallet = WalletServiceClient::new(Client::new(), config.wallet_service_url.clone());
        Self {
            pool,
            config,
            wallet,
        }
    }
}
