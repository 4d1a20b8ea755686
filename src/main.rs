use std::sync::Arc;

use adhub_backend::api::{self, ApiState};
use adhub_backend::config::AppConfig;
use adhub_backend::database::{self, LedgerStore, MemoryLedgerStore, PgLedgerStore};
use adhub_backend::logging::init_tracing;
use adhub_backend::payments::factory::PaymentProviderFactory;
use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    let db_config = match (&config.database, config.skip_externals) {
        (Some(db_config), false) => db_config,
        _ => {
            warn!("SKIP_EXTERNALS enabled, using in-memory ledger store");
            return Ok(Arc::new(MemoryLedgerStore::new()));
        }
    };

    let pool = database::init_pool_from_config(db_config)
        .await
        .context("failed to initialize database pool")?;

    if db_config.run_migrations {
        database::run_migrations(&pool)
            .await
            .context("failed to run database migrations")?;
        info!("Database migrations applied");
    }

    Ok(Arc::new(PgLedgerStore::new(pool)))
}

fn build_providers(config: &AppConfig) -> Arc<PaymentProviderFactory> {
    if config.skip_externals {
        return Arc::new(PaymentProviderFactory::empty());
    }

    match PaymentProviderFactory::from_env() {
        Ok(factory) => {
            info!(
                providers = ?factory.list_available_providers(),
                "Payment providers initialized"
            );
            Arc::new(factory)
        }
        Err(e) => {
            warn!(error = %e, "Payment providers unavailable, checkout and webhooks disabled");
            Arc::new(PaymentProviderFactory::empty())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        skip_externals = config.skip_externals,
        "Starting AdHub backend service"
    );

    let store = build_store(&config).await?;
    let providers = build_providers(&config);

    let state = ApiState::new(store, providers, &config);
    let app = api::router(state);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!(address = %addr, error = %e, "Failed to bind to address");
        e
    })?;

    info!(address = %addr, "Server is ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shut down");
    Ok(())
}
