use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use minijinja::Value;

use crate::engine::{render_context, CompiledTemplate, Helpers, RenderError};

/// Render-ready form of a template.
///
/// Owned by the compile cache and never mutated after creation;
/// recompiling a template replaces the whole unit.
pub struct CompiledUnit {
    name: String,
    template: Arc<dyn CompiledTemplate>,
    helpers: Helpers,
    layout_ref: Option<String>,
}

impl CompiledUnit {
    pub fn new(
        name: &str,
        template: Arc<dyn CompiledTemplate>,
        helpers: Helpers,
        layout_ref: Option<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            template,
            helpers,
            layout_ref,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn helpers(&self) -> &Helpers {
        &self.helpers
    }

    /// Cache key of the layout unit this template renders into
    pub fn layout_ref(&self) -> Option<&str> {
        self.layout_ref.as_deref()
    }

    /// Render with `data`; `fields` shadow both data and helpers
    pub fn render(
        &self,
        data: &serde_json::Value,
        fields: BTreeMap<String, Value>,
    ) -> Result<String, RenderError> {
        let context = render_context(data, &self.helpers, fields)?;
        self.template.render(context)
    }
}

impl fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("name", &self.name)
            .field("helpers", &self.helpers)
            .field("layout_ref", &self.layout_ref)
            .finish()
    }
}
