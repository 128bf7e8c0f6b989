// Shared components
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Template pipeline
pub mod assets;
pub mod css;
pub mod engine;
pub mod template;

// Dispatch
pub mod mailer;
pub mod routes;

// Application layer
pub mod api;
pub mod server;

pub use mailer::{Mailer, MailerBuilder, MailerError, SendOptions};
