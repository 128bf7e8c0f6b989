//! Template, layout and route descriptors.
//!
//! Descriptors are immutable once registered with a mailer. They can be
//! built in code (helpers and route data functions are closures) or read
//! from the configuration manifest.

use std::fmt;
use std::sync::Arc;

use minijinja::value::Value;
use minijinja::Error;
use serde::Deserialize;

use crate::engine::Helpers;
use crate::routes::RouteParams;

/// Produces render data for a preview/send route
pub type RouteDataFn =
    dyn Fn(&RouteParams) -> Result<serde_json::Value, String> + Send + Sync;

/// A layout wrapping rendered template content
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutDescriptor {
    pub name: String,
    pub path: String,
    #[serde(default, alias = "css")]
    pub css_path: Option<String>,
    #[serde(skip)]
    pub helpers: Helpers,
}

impl LayoutDescriptor {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            css_path: None,
            helpers: Helpers::new(),
        }
    }

    pub fn css(mut self, path: &str) -> Self {
        self.css_path = Some(path.to_string());
        self
    }

    pub fn helper<F>(mut self, name: &str, helper: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.helpers.insert(name, helper);
        self
    }
}

/// Per-template layout choice.
///
/// In configuration: `layout = false` opts out, `layout = true` inherits
/// the mailer layout, a table selects a template-specific layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LayoutOverride {
    Enabled(bool),
    Custom(LayoutDescriptor),
}

/// Exposes a template on the preview/send routes
#[derive(Clone, Deserialize)]
pub struct RouteDescriptor {
    /// Path below `/{prefix}/preview` and `/{prefix}/send`, e.g. `/welcome/{id}`
    pub path: String,
    #[serde(skip)]
    pub data: Option<Arc<RouteDataFn>>,
}

impl RouteDescriptor {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            data: None,
        }
    }

    pub fn data<F>(mut self, data: F) -> Self
    where
        F: Fn(&RouteParams) -> Result<serde_json::Value, String> + Send + Sync + 'static,
    {
        self.data = Some(Arc::new(data));
        self
    }

    /// Run the data function; routes without one render with no data
    pub fn resolve_data(&self, params: &RouteParams) -> Result<serde_json::Value, String> {
        match &self.data {
            Some(data) => data(params),
            None => Ok(serde_json::Value::Null),
        }
    }
}

impl fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("path", &self.path)
            .field("data", &self.data.is_some())
            .finish()
    }
}

/// A named template registered with a mailer
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateDescriptor {
    /// Unique name and compile-cache key. Filled from the manifest key.
    #[serde(default)]
    pub name: String,
    pub path: String,
    #[serde(default, alias = "css")]
    pub css_path: Option<String>,
    /// Stylesheet handed to the layout as `css` at render time
    #[serde(default, alias = "extra_css")]
    pub extra_css_path: Option<String>,
    #[serde(default)]
    pub layout: Option<LayoutOverride>,
    #[serde(default)]
    pub route: Option<RouteDescriptor>,
    #[serde(skip)]
    pub helpers: Helpers,
}

impl TemplateDescriptor {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            css_path: None,
            extra_css_path: None,
            layout: None,
            route: None,
            helpers: Helpers::new(),
        }
    }

    pub fn css(mut self, path: &str) -> Self {
        self.css_path = Some(path.to_string());
        self
    }

    pub fn extra_css(mut self, path: &str) -> Self {
        self.extra_css_path = Some(path.to_string());
        self
    }

    /// Render this template without any layout
    pub fn without_layout(mut self) -> Self {
        self.layout = Some(LayoutOverride::Enabled(false));
        self
    }

    /// Wrap this template in `layout` instead of the mailer layout
    pub fn layout(mut self, layout: LayoutDescriptor) -> Self {
        self.layout = Some(LayoutOverride::Custom(layout));
        self
    }

    pub fn route(mut self, route: RouteDescriptor) -> Self {
        self.route = Some(route);
        self
    }

    pub fn helper<F>(mut self, name: &str, helper: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.helpers.insert(name, helper);
        self
    }

    pub fn opts_out_of_layout(&self) -> bool {
        matches!(self.layout, Some(LayoutOverride::Enabled(false)))
    }

    /// The layout that applies to this template, given the mailer default
    pub fn effective_layout<'a>(
        &'a self,
        default: Option<&'a LayoutDescriptor>,
    ) -> Option<&'a LayoutDescriptor> {
        match &self.layout {
            Some(LayoutOverride::Enabled(false)) => None,
            Some(LayoutOverride::Custom(layout)) => Some(layout),
            Some(LayoutOverride::Enabled(true)) | None => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effective_layout() {
        let default = LayoutDescriptor::new("main", "layout.html");
        let custom = LayoutDescriptor::new("plain", "plain.html");

        let inherit = TemplateDescriptor::new("a", "a.html");
        let disabled = TemplateDescriptor::new("b", "b.html").without_layout();
        let overridden = TemplateDescriptor::new("c", "c.html").layout(custom);

        assert_eq!(inherit.effective_layout(Some(&default)).unwrap().name, "main");
        assert!(inherit.effective_layout(None).is_none());
        assert!(disabled.effective_layout(Some(&default)).is_none());
        assert_eq!(overridden.effective_layout(Some(&default)).unwrap().name, "plain");
        assert_eq!(overridden.effective_layout(None).unwrap().name, "plain");
    }

    #[test]
    fn test_layout_override_deserialization() {
        let off: TemplateDescriptor =
            serde_json::from_value(json!({"path": "a.html", "layout": false})).unwrap();
        assert!(off.opts_out_of_layout());

        let custom: TemplateDescriptor = serde_json::from_value(json!({
            "path": "a.html",
            "layout": {"name": "plain", "path": "plain.html", "css": "plain.css"}
        }))
        .unwrap();
        match custom.layout {
            Some(LayoutOverride::Custom(layout)) => {
                assert_eq!(layout.css_path.as_deref(), Some("plain.css"))
            }
            other => panic!("unexpected layout: {:?}", other),
        }
    }

    #[test]
    fn test_route_data() {
        let params = RouteParams::default();
        let plain = RouteDescriptor::new("/a");
        assert_eq!(plain.resolve_data(&params).unwrap(), serde_json::Value::Null);

        let with_data = RouteDescriptor::new("/a").data(|_| Ok(json!({"name": "Ada"})));
        assert_eq!(with_data.resolve_data(&params).unwrap()["name"], "Ada");
    }
}
