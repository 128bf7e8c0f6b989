//! Template compiler.
//!
//! Turns a descriptor into a [`CompiledUnit`]: reads the content source,
//! inlines the template stylesheet, attaches the layout (compiling it
//! through the same cache), compiles the merged source and resolves the
//! unit's helpers. Every failure is logged and reported as `None`.

use std::sync::Arc;

use crate::assets::AssetReader;
use crate::config::MailerSettings;
use crate::css;
use crate::engine::{CompileOptions, Helpers, TemplateEngine};
use crate::metrics::TemplateMetrics;

use super::{CompileCache, CompiledUnit, LayoutDescriptor, TemplateDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayoutRefresh {
    /// Recompile the layout unit
    Always,
    /// Reuse a cached layout unit
    IfMissing,
}

pub struct TemplateCompiler {
    settings: Arc<MailerSettings>,
    reader: Arc<dyn AssetReader>,
    engine: Arc<dyn TemplateEngine>,
    builtin_helpers: Helpers,
    mailer_helpers: Helpers,
    layout: Option<LayoutDescriptor>,
    cache: CompileCache,
}

impl TemplateCompiler {
    pub fn new(
        settings: Arc<MailerSettings>,
        reader: Arc<dyn AssetReader>,
        engine: Arc<dyn TemplateEngine>,
        builtin_helpers: Helpers,
        mailer_helpers: Helpers,
        layout: Option<LayoutDescriptor>,
    ) -> Self {
        Self {
            settings,
            reader,
            engine,
            builtin_helpers,
            mailer_helpers,
            layout,
            cache: CompileCache::new(),
        }
    }

    pub fn cache(&self) -> &CompileCache {
        &self.cache
    }

    pub fn reader(&self) -> &Arc<dyn AssetReader> {
        &self.reader
    }

    /// Mailer-wide layout
    pub fn layout(&self) -> Option<&LayoutDescriptor> {
        self.layout.as_ref()
    }

    /// Compile `descriptor` and replace its cache entry (last compile wins).
    ///
    /// The layout is recompiled as well so edited layout sources are
    /// picked up. A failed compile leaves a previously cached unit in
    /// place.
    #[tracing::instrument(name = "compiler.compile", skip(self, descriptor), fields(template = %descriptor.name))]
    pub async fn compile(&self, descriptor: &TemplateDescriptor) -> Option<Arc<CompiledUnit>> {
        self.store(&descriptor.name, self.build(descriptor, LayoutRefresh::Always).await)
    }

    fn store(&self, name: &str, unit: Option<CompiledUnit>) -> Option<Arc<CompiledUnit>> {
        match unit {
            Some(unit) => Some(self.cache.replace(name, unit)),
            None => {
                self.cache.mark_failed(name);
                None
            }
        }
    }

    /// Cached unit for `descriptor`, compiling it on first use.
    pub async fn ensure(&self, descriptor: &TemplateDescriptor) -> Option<Arc<CompiledUnit>> {
        if let Some(unit) = self.cache.get(&descriptor.name) {
            return Some(unit);
        }

        tracing::debug!(target: "mailer", template = %descriptor.name, "Template not compiled yet");
        self.cache
            .get_or_compile(&descriptor.name, || {
                self.build(descriptor, LayoutRefresh::IfMissing)
            })
            .await
    }

    fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            language: self.settings.language,
        }
    }

    async fn build(
        &self,
        descriptor: &TemplateDescriptor,
        refresh: LayoutRefresh,
    ) -> Option<CompiledUnit> {
        let name = descriptor.name.as_str();

        let mut content = match self.reader.read(&descriptor.path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(
                    target: "mailer",
                    template = %name,
                    path = %descriptor.path,
                    error = %e,
                    "Could not read template file"
                );
                TemplateMetrics::record_compile_failed();
                return None;
            }
        };

        let template_css = self.read_css(name, descriptor.css_path.as_deref()).await;
        content = css::inline(&content, template_css.as_deref(), name);

        let mut layout_ref = None;
        if let Some(layout) = descriptor.effective_layout(self.layout.as_ref()) {
            // Content rendered standalone still gets the layout's base styles
            let layout_css = self.read_css(&layout.name, layout.css_path.as_deref()).await;
            content = css::inline(&content, layout_css.as_deref(), name);

            let key = layout_key(layout, name, template_css.is_some());
            let build_layout = || {
                self.build_layout(
                    layout,
                    &key,
                    name,
                    layout_css.as_deref(),
                    template_css.as_deref(),
                )
            };

            let layout_unit = match refresh {
                LayoutRefresh::Always => self.store(&key, build_layout().await),
                LayoutRefresh::IfMissing => self.cache.get_or_compile(&key, build_layout).await,
            };

            if layout_unit.is_none() {
                tracing::error!(
                    target: "mailer",
                    template = %name,
                    layout = %layout.name,
                    "Layout unavailable, template not compiled"
                );
                TemplateMetrics::record_compile_failed();
                return None;
            }
            layout_ref = Some(key);
        }

        let template = match self
            .engine
            .compile_template(name, &content, self.compile_options())
        {
            Ok(template) => template,
            Err(e) => {
                tracing::error!(target: "mailer", template = %name, error = %e, "Could not compile template");
                TemplateMetrics::record_compile_failed();
                return None;
            }
        };

        let helpers = self.helpers_for(&descriptor.helpers);
        TemplateMetrics::record_compiled();
        tracing::debug!(
            target: "mailer",
            template = %name,
            layout = ?layout_ref,
            helpers = helpers.len(),
            "Template compiled"
        );

        Some(CompiledUnit::new(name, template, helpers, layout_ref))
    }

    async fn build_layout(
        &self,
        layout: &LayoutDescriptor,
        key: &str,
        template_name: &str,
        layout_css: Option<&str>,
        template_css: Option<&str>,
    ) -> Option<CompiledUnit> {
        let content = match self.reader.read(&layout.path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(
                    target: "mailer",
                    layout = %layout.name,
                    path = %layout.path,
                    error = %e,
                    "Could not read layout file"
                );
                TemplateMetrics::record_compile_failed();
                return None;
            }
        };

        let content = css::inline(&content, layout_css, &layout.name);
        // Template-specific overrides reach layout-level elements
        let content = css::inline(&content, template_css, template_name);

        let template = match self
            .engine
            .compile_template(key, &content, self.compile_options())
        {
            Ok(template) => template,
            Err(e) => {
                tracing::error!(target: "mailer", layout = %layout.name, error = %e, "Could not compile layout");
                TemplateMetrics::record_compile_failed();
                return None;
            }
        };

        TemplateMetrics::record_compiled();
        Some(CompiledUnit::new(key, template, self.helpers_for(&layout.helpers), None))
    }

    async fn read_css(&self, owner: &str, path: Option<&str>) -> Option<String> {
        let path = path?;
        match self.reader.read(path).await {
            Ok(css) => Some(css),
            Err(e) => {
                tracing::warn!(
                    target: "mailer",
                    template = %owner,
                    path = %path,
                    error = %e,
                    "Could not read stylesheet, continuing without it"
                );
                None
            }
        }
    }

    /// built-in < engine globals < mailer globals < own helpers
    fn helpers_for(&self, own: &Helpers) -> Helpers {
        Helpers::merge(&[
            &self.builtin_helpers,
            self.engine.global_helpers(),
            &self.mailer_helpers,
            own,
        ])
    }
}

/// Cache key of the layout unit used by `template`.
///
/// A template with its own stylesheet gets a private layout variant that
/// carries those styles; all other templates share the plain layout.
fn layout_key(layout: &LayoutDescriptor, template: &str, has_template_css: bool) -> String {
    if has_template_css {
        format!("{}+{}", layout.name, template)
    } else {
        layout.name.clone()
    }
}
