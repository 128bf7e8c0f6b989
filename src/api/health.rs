//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub templates: TemplateHealthResponse,
    pub sending_disabled: bool,
}

#[derive(Debug, Serialize)]
pub struct TemplateHealthResponse {
    pub registered: usize,
    pub compiled: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let registered = state.mailer.templates().count();
    let compiled = state
        .mailer
        .templates()
        .filter(|t| state.mailer.compiled(&t.name).is_some())
        .count();

    // Templates that failed to compile leave the service degraded
    let status = if compiled == registered {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        templates: TemplateHealthResponse {
            registered,
            compiled,
        },
        sending_disabled: state.mailer.settings().disabled,
    })
}
