use anyhow::Result;
use chrono::Utc;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};

use boride_backend::config::environment::EnvironmentConfig;
use boride_backend::database::{create_pool, run_migrations};
use boride_backend::repositories::ride_repository::PgRideRepository;
use boride_backend::routes::create_router;
use boride_backend::services::escalation_service::EscalationService;
use boride_backend::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenvy::dotenv().ok();

    // Configurar logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("🚕 BoRide Backend - Ride Dispatch API");
    info!("=====================================");

    let config = EnvironmentConfig::default();

    // Inicializar base de datos
    let pool = match create_pool(None).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("❌ Error conectando a la base de datos: {}", e);
            return Err(anyhow::anyhow!("Error de base de datos: {}", e));
        }
    };

    if let Err(e) = run_migrations(&pool).await {
        error!("❌ Error ejecutando migraciones: {}", e);
        return Err(e);
    }
    info!("✅ Migraciones aplicadas");

    // Barrido de escalamiento: confirmaciones vencidas → revisión manual
    let escalation = EscalationService::new(PgRideRepository::new(pool.clone()));
    let confirmation_window = chrono::Duration::hours(config.confirmation_timeout_hours);
    let sweep_every = std::time::Duration::from_secs(config.escalation_sweep_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            match escalation.run_sweep(Utc::now() - confirmation_window).await {
                Ok(0) => {}
                Ok(n) => info!("⏰ {} confirmaciones vencidas escaladas a soporte", n),
                Err(e) => error!("❌ Error en barrido de escalamiento: {}", e),
            }
        }
    });

    // Crear router de la API
    let app_state = AppState::new(pool, config.clone());
    let app = create_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   GET  /health - Health check");
    info!("🎓 Endpoints - Student:");
    info!("   POST /api/student/rides - Solicitar viaje");
    info!("   GET  /api/student/rides - Historial de viajes");
    info!("   GET  /api/student/rides/pending-confirmation - Poll de confirmación");
    info!("   GET  /api/student/rides/:id - Detalle de viaje");
    info!("   PUT  /api/student/rides/:id/confirm - Confirmar o disputar completado");
    info!("   PUT  /api/student/rides/:id/rate - Calificar viaje");
    info!("   PUT  /api/student/rides/:id/cancel - Cancelar viaje");
    info!("🚗 Endpoints - Driver:");
    info!("   GET  /api/driver/rides/available - Viajes pendientes visibles");
    info!("   GET  /api/driver/rides - Historial de viajes");
    info!("   GET  /api/driver/rides/:id - Detalle de viaje");
    info!("   PUT  /api/driver/rides/:id/accept - Reclamar viaje");
    info!("   PUT  /api/driver/rides/:id/start - Iniciar viaje");
    info!("   PUT  /api/driver/rides/:id/complete - Solicitar completado");
    info!("   PUT  /api/driver/rides/:id/cancel - Cancelar viaje");
    info!("   PUT  /api/driver/availability - Cambiar disponibilidad");

    // Iniciar servidor
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!("❌ Error del servidor: {}", e);
            anyhow::anyhow!(e)
        })?;

    info!("👋 Servidor terminado");
    Ok(())
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
