//! Health check module
//! Provides health status for the application and its dependencies

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::api::ApiState;
use crate::database::LedgerStore;
use crate::payments::factory::PaymentProviderFactory;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    store: Arc<dyn LedgerStore>,
    providers: Arc<PaymentProviderFactory>,
    db_timeout: Duration,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn LedgerStore>, providers: Arc<PaymentProviderFactory>) -> Self {
        Self {
            store,
            providers,
            db_timeout: Duration::from_secs(5),
        }
    }

    /// Perform comprehensive health check
    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        let database = check_database_health(self.store.as_ref(), self.db_timeout).await;
        let database_up = database.status == ComponentState::Up;
        health_status.checks.insert("database".to_string(), database);

        // Payment providers are optional; none configured only degrades the service.
        let available = self.providers.list_available_providers();
        let payments = if available.is_empty() {
            warn!("No payment providers configured");
            ComponentHealth::warning(None, Some("no payment providers configured".to_string()))
        } else {
            let names: Vec<&str> = available.iter().map(|p| p.as_str()).collect();
            ComponentHealth {
                status: ComponentState::Up,
                response_time_ms: None,
                details: Some(names.join(",")),
            }
        };
        let payments_up = payments.status == ComponentState::Up;
        health_status.checks.insert("payments".to_string(), payments);

        health_status.status = match (database_up, payments_up) {
            (false, _) => HealthState::Unhealthy,
            (true, false) => HealthState::Degraded,
            (true, true) => HealthState::Healthy,
        };

        health_status
    }
}

pub async fn check_database_health(store: &dyn LedgerStore, limit: Duration) -> ComponentHealth {
    let start = Instant::now();

    match timeout(limit, store.ping()).await {
        Ok(Ok(())) => {
            let elapsed = start.elapsed().as_millis();
            info!("Database health check: OK ({}ms)", elapsed);
            ComponentHealth::up(Some(elapsed))
        }
        Ok(Err(e)) => {
            error!("Database health check failed: {}", e);
            ComponentHealth::down(Some(e.to_string()))
        }
        Err(_) => {
            error!("Database health check timed out");
            ComponentHealth::down(Some("Timeout".to_string()))
        }
    }
}

/// GET /health
pub async fn health(
    State(state): State<ApiState>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let health_status = state.health.check_health().await;

    if health_status.status == HealthState::Unhealthy {
        error!("Health check failed - service unhealthy");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health_status)))
    } else {
        Ok(Json(health_status))
    }
}

/// GET /health/ready
pub async fn readiness(
    state: State<ApiState>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let result = health(state).await;
    if result.is_err() {
        error!("Readiness check failed");
    }
    result
}

/// GET /health/live
pub async fn liveness() -> &'static str {
    "OK"
}
