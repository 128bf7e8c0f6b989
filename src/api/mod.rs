//! API layer - HTTP endpoint handlers.

mod emails;
mod health;
mod metrics;
mod routes;

pub use emails::{list_templates, render_email, send_email, SendEmailResponse, TemplateSummary};
pub use health::{health, HealthResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
