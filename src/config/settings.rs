use std::collections::HashMap;
use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::engine::Language;
use crate::template::{LayoutDescriptor, TemplateDescriptor};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub mailer: MailerSettings,
    /// Shared layout wrapping every template that does not opt out
    #[serde(default)]
    pub layout: Option<LayoutDescriptor>,
    /// Template manifest keyed by template name
    #[serde(default)]
    pub templates: HashMap<String, TemplateDescriptor>,
}

/// Mailer behaviour, fixed once the mailer is built.
#[derive(Debug, Clone, Deserialize)]
pub struct MailerSettings {
    /// Suppress info-level mailer logs
    #[serde(default)]
    pub silent: bool,
    /// Prefix for generated preview/send routes
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
    /// Root URL used by the `base_url` and `email_url_for` helpers
    #[serde(default)]
    pub base_url: Option<String>,
    /// Fallback recipient for test sends
    #[serde(default)]
    pub test_email: Option<String>,
    /// Dry-run: render but never hand messages to the transport
    #[serde(default)]
    pub disabled: bool,
    /// Expose preview/send routes for templates that declare one
    #[serde(default = "default_add_routes")]
    pub add_routes: bool,
    /// Template dialect passed to the render engine
    #[serde(default)]
    pub language: Language,
    /// Default sender
    #[serde(default)]
    pub from: Option<String>,
    /// Default Reply-To
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Root of the content store template paths are relative to
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Default filter when RUST_LOG is unset
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    None,
    #[default]
    Starttls,
    Tls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// SMTP relay; when unset messages are written to stdout
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: TlsMode,
}

fn default_route_prefix() -> String {
    "emails".to_string()
}

fn default_add_routes() -> bool {
    env::var("RUN_MODE")
        .map(|m| m == "development")
        .unwrap_or(false)
}

fn default_templates_dir() -> String {
    "private".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_smtp_port() -> u16 {
    587
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("mailer.route_prefix", "emails")?
            .set_default("mailer.add_routes", run_mode == "development")?
            .set_default("mailer.templates_dir", "private")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // MAILER__FROM, MAILER__TEST_EMAIL, SMTP__HOST, SERVER__PORT, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.name_templates();
        Ok(settings)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Manifest entries are named by their key
    fn name_templates(&mut self) {
        for (name, descriptor) in self.templates.iter_mut() {
            descriptor.name = name.clone();
        }
    }

    /// Template descriptors sorted by name
    pub fn template_descriptors(&self) -> Vec<TemplateDescriptor> {
        let mut templates: Vec<_> = self.templates.values().cloned().collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        templates
    }
}

impl Default for MailerSettings {
    fn default() -> Self {
        Self {
            silent: false,
            route_prefix: default_route_prefix(),
            base_url: None,
            test_email: None,
            disabled: false,
            add_routes: default_add_routes(),
            language: Language::default(),
            from: None,
            reply_to: None,
            templates_dir: default_templates_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            username: None,
            password: None,
            tls: TlsMode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8080);

        let mailer = MailerSettings::default();
        assert_eq!(mailer.route_prefix, "emails");
        assert_eq!(mailer.language, Language::Html);
        assert_eq!(mailer.templates_dir, "private");
        assert!(!mailer.disabled);
        assert!(!mailer.silent);
    }

    #[test]
    fn test_manifest_deserialization() {
        let toml = r#"
            [mailer]
            from = "Ara <noreply@ara.dev>"
            disabled = true

            [layout]
            name = "emailLayout"
            path = "layout.html"
            css = "layout.css"

            [templates.welcome]
            path = "welcome.html"
            css = "welcome.css"
            route = { path = "/welcome" }

            [templates.receipt]
            path = "receipt.html"
            layout = false
        "#;

        let mut settings: Settings = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        settings.name_templates();

        assert!(settings.mailer.disabled);
        assert_eq!(settings.mailer.from.as_deref(), Some("Ara <noreply@ara.dev>"));
        assert_eq!(settings.layout.as_ref().unwrap().css_path.as_deref(), Some("layout.css"));

        let templates = settings.template_descriptors();
        assert_eq!(templates[0].name, "receipt");
        assert!(templates[0].opts_out_of_layout());
        assert_eq!(templates[1].name, "welcome");
        assert_eq!(templates[1].css_path.as_deref(), Some("welcome.css"));
        assert_eq!(templates[1].route.as_ref().unwrap().path, "/welcome");
    }
}
