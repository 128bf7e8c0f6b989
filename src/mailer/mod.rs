//! Mailer facade and email dispatcher.
//!
//! A [`Mailer`] owns the registered template descriptors, the compile
//! pipeline and a [`MailTransport`]. It is assembled once through
//! [`MailerBuilder`] and is immutable afterwards.

mod transport;

pub use transport::{
    MailTransport, OutgoingEmail, RecordingTransport, SmtpTransport, StdoutTransport,
    TransportError,
};

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::assets::{AssetReader, FsAssetReader};
use crate::config::{MailerSettings, Settings};
use crate::engine::{Helpers, MiniJinjaEngine, RenderError, TemplateEngine};
use crate::metrics::EmailMetrics;
use crate::routes::{build_routes, builtin_helpers, MailerRoute};
use crate::template::{
    CompiledUnit, ComposeError, LayoutComposer, LayoutDescriptor, LayoutOverride, RenderResult,
    TemplateCompiler, TemplateDescriptor,
};

/// Info-level diagnostics that `silent` suppresses
macro_rules! mailer_info {
    ($settings:expr, $($arg:tt)+) => {
        if !$settings.silent {
            tracing::info!(target: "mailer", $($arg)+);
        }
    };
}

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("Could not find template: {0}")]
    TemplateNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Mailer configuration error: {0}")]
    Config(String),
}

impl From<ComposeError> for MailerError {
    fn from(e: ComposeError) -> Self {
        match e {
            ComposeError::TemplateNotFound(name) => MailerError::TemplateNotFound(name),
            ComposeError::Render(e) => MailerError::Render(e),
        }
    }
}

pub type MailerResult<T> = Result<T, MailerError>;

/// Dispatch request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendOptions {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub template: String,
    #[serde(default, alias = "replyTo")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
}

impl SendOptions {
    pub fn new(to: &str, subject: &str, template: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: subject.to_string(),
            template: template.to_string(),
            ..Default::default()
        }
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn from(mut self, from: &str) -> Self {
        self.from = Some(from.to_string());
        self
    }

    pub fn reply_to(mut self, reply_to: &str) -> Self {
        self.reply_to = Some(reply_to.to_string());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Check required fields before any rendering or I/O
    pub fn validate(&self) -> MailerResult<()> {
        for (field, value) in [
            ("to", &self.to),
            ("subject", &self.subject),
            ("template", &self.template),
        ] {
            if value.trim().is_empty() {
                return Err(MailerError::Validation(format!("'{}' is required", field)));
            }
        }

        match &self.data {
            None | Some(serde_json::Value::Null) | Some(serde_json::Value::Object(_)) => {}
            Some(_) => {
                return Err(MailerError::Validation(
                    "'data' must be an object".to_string(),
                ))
            }
        }

        if let Some(headers) = &self.headers {
            if let Some(name) = headers.keys().find(|name| !is_valid_header_name(name)) {
                return Err(MailerError::Validation(format!(
                    "Invalid header name '{}'",
                    name
                )));
            }
        }

        Ok(())
    }
}

fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_graphic() && b != b':')
}

/// Assembles a [`Mailer`]
#[derive(Default)]
pub struct MailerBuilder {
    settings: MailerSettings,
    templates: Vec<TemplateDescriptor>,
    helpers: Helpers,
    layout: Option<LayoutDescriptor>,
    reader: Option<Arc<dyn AssetReader>>,
    engine: Option<Arc<dyn TemplateEngine>>,
    transport: Option<Arc<dyn MailTransport>>,
}

impl MailerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings, layout and template manifest from configuration.
    ///
    /// Uses the SMTP transport when `smtp.host` is set, stdout otherwise.
    pub fn from_settings(settings: &Settings) -> MailerResult<Self> {
        let mut builder = Self::new()
            .settings(settings.mailer.clone())
            .templates(settings.template_descriptors());

        if let Some(layout) = &settings.layout {
            builder = builder.layout(layout.clone());
        }

        if settings.smtp.host.is_some() {
            let transport = SmtpTransport::from_config(&settings.smtp)
                .map_err(|e| MailerError::Config(e.to_string()))?;
            builder = builder.transport(Arc::new(transport));
        }

        Ok(builder)
    }

    pub fn settings(mut self, settings: MailerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn template(mut self, descriptor: TemplateDescriptor) -> Self {
        self.templates.push(descriptor);
        self
    }

    pub fn templates(mut self, descriptors: impl IntoIterator<Item = TemplateDescriptor>) -> Self {
        self.templates.extend(descriptors);
        self
    }

    /// Mailer-wide helpers, available to every template
    pub fn helpers(mut self, helpers: Helpers) -> Self {
        self.helpers.extend(&helpers);
        self
    }

    pub fn layout(mut self, layout: LayoutDescriptor) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn reader(mut self, reader: Arc<dyn AssetReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> MailerResult<Mailer> {
        self.check_names()?;

        let settings = Arc::new(self.settings);
        let routes = build_routes(&settings.route_prefix, &self.templates);
        let builtin = builtin_helpers(settings.base_url.as_deref(), &routes);

        let reader = self
            .reader
            .unwrap_or_else(|| Arc::new(FsAssetReader::new(&settings.templates_dir)));
        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(MiniJinjaEngine::new()));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(StdoutTransport));

        let compiler = Arc::new(TemplateCompiler::new(
            settings.clone(),
            reader,
            engine,
            builtin,
            self.helpers,
            self.layout,
        ));

        let templates = self
            .templates
            .into_iter()
            .map(|descriptor| (descriptor.name.clone(), descriptor))
            .collect();

        Ok(Mailer {
            settings,
            templates,
            composer: LayoutComposer::new(compiler.clone()),
            compiler,
            transport,
            routes,
        })
    }

    /// Template and layout names share the compile cache
    fn check_names(&self) -> MailerResult<()> {
        let mut layouts: HashSet<&str> = HashSet::new();
        if let Some(layout) = &self.layout {
            layouts.insert(layout.name.as_str());
        }
        for descriptor in &self.templates {
            if let Some(LayoutOverride::Custom(layout)) = &descriptor.layout {
                layouts.insert(layout.name.as_str());
            }
        }

        let mut seen = HashSet::new();
        for descriptor in &self.templates {
            let name = descriptor.name.as_str();
            if name.trim().is_empty() {
                return Err(MailerError::Config("Template name cannot be empty".to_string()));
            }
            if name.contains('+') {
                return Err(MailerError::Config(format!(
                    "Template name '{}' cannot contain '+'",
                    name
                )));
            }
            if !seen.insert(name) {
                return Err(MailerError::Config(format!(
                    "Template '{}' is registered twice",
                    name
                )));
            }
            if layouts.contains(name) {
                return Err(MailerError::Config(format!(
                    "Template '{}' has the same name as a layout",
                    name
                )));
            }
        }

        Ok(())
    }
}

pub struct Mailer {
    settings: Arc<MailerSettings>,
    templates: BTreeMap<String, TemplateDescriptor>,
    compiler: Arc<TemplateCompiler>,
    composer: LayoutComposer,
    transport: Arc<dyn MailTransport>,
    routes: Vec<MailerRoute>,
}

impl Mailer {
    pub fn builder() -> MailerBuilder {
        MailerBuilder::new()
    }

    /// Precompile every registered template concurrently.
    ///
    /// Returns the generated routes; they are logged when `add_routes` is on.
    pub async fn init(&self) -> &[MailerRoute] {
        let results = join_all(
            self.templates
                .values()
                .map(|descriptor| self.compiler.compile(descriptor)),
        )
        .await;

        let compiled = results.iter().filter(|unit| unit.is_some()).count();
        mailer_info!(
            self.settings,
            compiled,
            failed = results.len() - compiled,
            "Templates precompiled"
        );

        if self.settings.add_routes {
            for route in &self.routes {
                mailer_info!(
                    self.settings,
                    route = %route.name,
                    path = %route.path,
                    "Registered route"
                );
            }
        }

        &self.routes
    }

    /// Recompile a registered template; `false` when compiling failed
    pub async fn precompile(&self, name: &str) -> MailerResult<bool> {
        let descriptor = self
            .templates
            .get(name)
            .ok_or_else(|| MailerError::TemplateNotFound(name.to_string()))?;

        Ok(self.compiler.compile(descriptor).await.is_some())
    }

    /// Render `name` with `data` into the final HTML
    pub async fn render(
        &self,
        name: &str,
        data: &serde_json::Value,
    ) -> MailerResult<RenderResult> {
        mailer_info!(self.settings, template = %name, "Rendering template");
        let rendered = self
            .composer
            .render(name, self.templates.get(name), data)
            .await?;
        Ok(rendered)
    }

    /// Render and dispatch an email.
    ///
    /// Only invalid options are returned as errors. Render and transport
    /// failures are logged and reported as `Ok(false)`.
    #[tracing::instrument(
        name = "mailer.send",
        skip(self, options),
        fields(template = %options.template, dispatch_id = %Uuid::new_v4())
    )]
    pub async fn send(&self, options: SendOptions) -> MailerResult<bool> {
        options.validate()?;

        let from = options
            .from
            .or_else(|| self.settings.from.clone())
            .ok_or_else(|| {
                MailerError::Validation("'from' is required when mailer.from is not set".to_string())
            })?;
        let reply_to = options.reply_to.or_else(|| self.settings.reply_to.clone());
        let data = options.data.unwrap_or(serde_json::Value::Null);

        let html = match self.render(&options.template, &data).await {
            Ok(rendered) => rendered.html,
            Err(e) => {
                tracing::error!(
                    target: "mailer",
                    template = %options.template,
                    error = %e,
                    "Could not render email"
                );
                EmailMetrics::record_render_failed();
                return Ok(false);
            }
        };

        if self.settings.disabled {
            mailer_info!(
                self.settings,
                template = %options.template,
                to = %options.to,
                "Sending disabled, email not submitted"
            );
            EmailMetrics::record_dry_run();
            return Ok(true);
        }

        let email = OutgoingEmail {
            to: options.to,
            from,
            reply_to,
            subject: options.subject,
            html,
            headers: options.headers.unwrap_or_default(),
        };

        mailer_info!(
            self.settings,
            template = %options.template,
            to = %email.to,
            "Sending email"
        );

        match self.transport.send(&email).await {
            Ok(()) => {
                EmailMetrics::record_sent();
                Ok(true)
            }
            Err(e) => {
                tracing::error!(
                    target: "mailer",
                    template = %options.template,
                    to = %email.to,
                    error = %e,
                    "Could not send email"
                );
                EmailMetrics::record_transport_failed();
                Ok(false)
            }
        }
    }

    pub fn settings(&self) -> &MailerSettings {
        &self.settings
    }

    pub fn routes(&self) -> &[MailerRoute] {
        &self.routes
    }

    pub fn template(&self, name: &str) -> Option<&TemplateDescriptor> {
        self.templates.get(name)
    }

    pub fn templates(&self) -> impl Iterator<Item = &TemplateDescriptor> {
        self.templates.values()
    }

    /// Currently cached unit for `name`
    pub fn compiled(&self, name: &str) -> Option<Arc<CompiledUnit>> {
        self.compiler.cache().get(name)
    }

    pub fn transport(&self) -> &Arc<dyn MailTransport> {
        &self.transport
    }
}
