use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::emails::{list_templates, render_email, send_email};
use super::health::health;
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                .route("/emails", get(list_templates))
                .route("/emails/send", post(send_email))
                .route("/emails/{template}/render", post(render_email)),
        )
}
