//! Render engine facade.
//!
//! The mailer only relies on "compile a named template source" and
//! "render a compiled template with a context". [`MiniJinjaEngine`] is the
//! production implementation; each compiled template owns its own
//! environment so units never share mutable engine state.

mod helpers;

pub use helpers::{HelperFn, Helpers};

use std::collections::BTreeMap;
use std::sync::Arc;

use minijinja::{AutoEscape, Environment, Value};
use serde::Deserialize;
use thiserror::Error;

/// Render-engine error type
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Could not compile template {name}: {message}")]
    Compile { name: String, message: String },

    #[error("Could not render template {name}: {message}")]
    Render { name: String, message: String },

    #[error("Render data must be an object")]
    InvalidData,
}

/// Template dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// HTML with auto-escaping of interpolated values
    #[default]
    Html,
    /// Plain text, no escaping
    Text,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub language: Language,
}

/// A compiled, render-ready template.
pub trait CompiledTemplate: Send + Sync {
    fn render(&self, context: Value) -> Result<String, RenderError>;
}

/// Template compilation backend.
pub trait TemplateEngine: Send + Sync {
    fn compile_template(
        &self,
        name: &str,
        source: &str,
        options: CompileOptions,
    ) -> Result<Arc<dyn CompiledTemplate>, RenderError>;

    /// Helpers every template compiled by this engine can use
    fn global_helpers(&self) -> &Helpers;
}

/// Build a render context.
///
/// Layers from lowest to highest precedence: `data` fields, `helpers`,
/// then `fields`. `data` must be a JSON object or null.
pub fn render_context(
    data: &serde_json::Value,
    helpers: &Helpers,
    fields: BTreeMap<String, Value>,
) -> Result<Value, RenderError> {
    let mut context: BTreeMap<String, Value> = BTreeMap::new();

    match data {
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                context.insert(key.clone(), Value::from_serialize(value));
            }
        }
        serde_json::Value::Null => {}
        _ => return Err(RenderError::InvalidData),
    }

    context.extend(helpers.to_values());
    context.extend(fields);

    Ok(context.into_iter().collect())
}

/// MiniJinja-backed engine
#[derive(Debug, Default)]
pub struct MiniJinjaEngine {
    globals: Helpers,
}

impl MiniJinjaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global_helpers(globals: Helpers) -> Self {
        Self { globals }
    }
}

struct MiniJinjaTemplate {
    name: String,
    env: Environment<'static>,
}

impl CompiledTemplate for MiniJinjaTemplate {
    fn render(&self, context: Value) -> Result<String, RenderError> {
        let render_err = |e: minijinja::Error| RenderError::Render {
            name: self.name.clone(),
            message: e.to_string(),
        };

        self.env
            .get_template(&self.name)
            .map_err(render_err)?
            .render(context)
            .map_err(render_err)
    }
}

impl TemplateEngine for MiniJinjaEngine {
    fn compile_template(
        &self,
        name: &str,
        source: &str,
        options: CompileOptions,
    ) -> Result<Arc<dyn CompiledTemplate>, RenderError> {
        let mut env = Environment::new();

        let language = options.language;
        env.set_auto_escape_callback(move |_| match language {
            Language::Html => AutoEscape::Html,
            Language::Text => AutoEscape::None,
        });

        env.add_template_owned(name.to_string(), source.to_string())
            .map_err(|e| RenderError::Compile {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        Ok(Arc::new(MiniJinjaTemplate {
            name: name.to_string(),
            env,
        }))
    }

    fn global_helpers(&self) -> &Helpers {
        &self.globals
    }
}
