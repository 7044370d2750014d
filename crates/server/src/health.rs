use axum::{http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

pub const SERVICE_NAME: &str = "pengpt-server";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub checked_at: String,
}

/// Liveness surface. Stateless: none of the handlers look at conversation or
/// rotation state.
pub fn router() -> Router {
    Router::new().route("/", get(root)).route("/healthz", get(healthz)).route("/health", get(health))
}

pub async fn spawn(bind_address: &str, port: u16) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router()).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn root() -> &'static str {
    "✅ Bot running"
}

pub async fn healthz() -> &'static str {
    "OK"
}

pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    let payload =
        HealthResponse { status: "ok", service: SERVICE_NAME, checked_at: Utc::now().to_rfc3339() };
    (StatusCode::OK, Json(payload))
}
