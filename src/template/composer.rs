//! Layout composition.
//!
//! Renders a template's content, wraps it into its layout with the
//! derived `body`, `css` and `preview` fields, and prepends the doctype.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use minijinja::Value;

use crate::engine::RenderError;
use crate::metrics::TemplateMetrics;

use super::{CompiledUnit, TemplateCompiler, TemplateDescriptor};

pub const DOCTYPE: &str = "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\">";

/// Final HTML of a rendered email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub html: String,
}

/// Composer failure
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Could not find template: {0}")]
    TemplateNotFound(String),

    #[error(transparent)]
    Render(#[from] RenderError),
}

pub struct LayoutComposer {
    compiler: Arc<TemplateCompiler>,
}

impl LayoutComposer {
    pub fn new(compiler: Arc<TemplateCompiler>) -> Self {
        Self { compiler }
    }

    /// Render `name` with `data`.
    ///
    /// `descriptor` is the registered descriptor for `name`, if any; with
    /// one the template is compiled on first use, without one only an
    /// already-cached unit can be rendered.
    #[tracing::instrument(name = "composer.render", skip(self, descriptor, data), fields(template = %name))]
    pub async fn render(
        &self,
        name: &str,
        descriptor: Option<&TemplateDescriptor>,
        data: &serde_json::Value,
    ) -> Result<RenderResult, ComposeError> {
        let started = Instant::now();

        let unit = match descriptor {
            Some(descriptor) => self.compiler.ensure(descriptor).await,
            None => self.compiler.cache().get(name),
        }
        .ok_or_else(|| ComposeError::TemplateNotFound(name.to_string()))?;

        let result = self.compose(&unit, descriptor, data).await;

        match &result {
            Ok(_) => TemplateMetrics::record_rendered(started.elapsed()),
            Err(_) => TemplateMetrics::record_render_failed(),
        }
        result
    }

    async fn compose(
        &self,
        unit: &CompiledUnit,
        descriptor: Option<&TemplateDescriptor>,
        data: &serde_json::Value,
    ) -> Result<RenderResult, ComposeError> {
        let body = unit.render(data, BTreeMap::new())?;

        let Some(layout_ref) = unit.layout_ref() else {
            return Ok(with_doctype(body));
        };

        let layout = self
            .compiler
            .cache()
            .get(layout_ref)
            .ok_or_else(|| ComposeError::TemplateNotFound(layout_ref.to_string()))?;

        let preview = preview_text(unit, data);
        let extra_css = match descriptor.and_then(|d| d.extra_css_path.as_deref()) {
            Some(path) => self.read_extra_css(unit.name(), path).await,
            None => None,
        };

        let mut fields = BTreeMap::new();
        fields.insert("body".to_string(), Value::from_safe_string(body));
        fields.insert(
            "css".to_string(),
            extra_css.map(Value::from_safe_string).unwrap_or(Value::UNDEFINED),
        );
        fields.insert(
            "preview".to_string(),
            preview.map(Value::from).unwrap_or(Value::UNDEFINED),
        );

        let html = layout.render(data, fields)?;
        Ok(with_doctype(html))
    }

    async fn read_extra_css(&self, template: &str, path: &str) -> Option<String> {
        match self.compiler.reader().read(path).await {
            Ok(css) => Some(css),
            Err(e) => {
                tracing::error!(
                    target: "mailer",
                    template = %template,
                    path = %path,
                    error = %e,
                    "Could not add extra CSS when rendering"
                );
                None
            }
        }
    }
}

/// The unit's `preview` helper wins over `data.preview`
fn preview_text(unit: &CompiledUnit, data: &serde_json::Value) -> Option<String> {
    if let Some(result) = unit.helpers().call("preview", &[]) {
        match result {
            Ok(value) => return Some(value.to_string()),
            Err(e) => {
                tracing::warn!(target: "mailer", template = %unit.name(), error = %e, "Preview helper failed");
            }
        }
    }

    match data.get("preview")? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn with_doctype(html: String) -> RenderResult {
    RenderResult {
        html: format!("{}\n{}", DOCTYPE, html),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetReader;
    use crate::config::MailerSettings;
    use crate::engine::{Helpers, MiniJinjaEngine};
    use crate::template::LayoutDescriptor;
    use serde_json::json;

    const LAYOUT: &str = "<html><head><style>{{ css }}</style></head><body><span class=\"pre\">{{ preview }}</span>{{ body }}</body></html>";

    fn composer(reader: MemoryAssetReader, layout: Option<LayoutDescriptor>) -> LayoutComposer {
        let compiler = TemplateCompiler::new(
            Arc::new(MailerSettings::default()),
            Arc::new(reader),
            Arc::new(MiniJinjaEngine::new()),
            Helpers::new(),
            Helpers::new(),
            layout,
        );
        LayoutComposer::new(Arc::new(compiler))
    }

    #[tokio::test]
    async fn test_render_without_layout_adds_doctype() {
        let composer = composer(MemoryAssetReader::new().with("t.html", "<p>{{ n }}</p>"), None);
        let descriptor = TemplateDescriptor::new("t", "t.html");

        let result = composer.render("t", Some(&descriptor), &json!({"n": 1})).await.unwrap();
        assert!(result.html.starts_with("<!DOCTYPE html"));
        assert!(result.html.ends_with("<p>1</p>"));
    }

    #[tokio::test]
    async fn test_unknown_template() {
        let composer = composer(MemoryAssetReader::new(), None);

        let err = composer.render("nope", None, &json!({})).await.unwrap_err();
        assert!(matches!(err, ComposeError::TemplateNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_layout_receives_body_unescaped() {
        let reader = MemoryAssetReader::new()
            .with("t.html", "<p>Hi {{ name }}</p>")
            .with("layout.html", LAYOUT);
        let composer = composer(reader, Some(LayoutDescriptor::new("main", "layout.html")));
        let descriptor = TemplateDescriptor::new("t", "t.html");

        let result = composer
            .render("t", Some(&descriptor), &json!({"name": "<Ada>"}))
            .await
            .unwrap();
        assert!(result.html.contains("<body><span class=\"pre\"></span><p>Hi &lt;Ada&gt;</p></body>"), "got: {}", result.html);
    }

    #[tokio::test]
    async fn test_derived_fields_override_data() {
        let reader = MemoryAssetReader::new()
            .with("t.html", "content")
            .with("layout.html", "[{{ body }}|{{ preview }}]");
        let composer = composer(reader, Some(LayoutDescriptor::new("main", "layout.html")));
        let descriptor = TemplateDescriptor::new("t", "t.html");

        let result = composer
            .render("t", Some(&descriptor), &json!({"body": "spoofed", "preview": "Short"}))
            .await
            .unwrap();
        assert!(result.html.ends_with("[content|Short]"), "got: {}", result.html);
    }

    #[tokio::test]
    async fn test_preview_helper_wins_over_data() {
        let reader = MemoryAssetReader::new()
            .with("t.html", "content")
            .with("layout.html", "{{ preview }}");
        let composer = composer(reader, Some(LayoutDescriptor::new("main", "layout.html")));
        let descriptor = TemplateDescriptor::new("t", "t.html")
            .helper("preview", |_| Ok(Value::from("From helper")));

        let result = composer
            .render("t", Some(&descriptor), &json!({"preview": "From data"}))
            .await
            .unwrap();
        assert!(result.html.ends_with("From helper"), "got: {}", result.html);
    }

    #[tokio::test]
    async fn test_extra_css_passed_to_layout() {
        let reader = MemoryAssetReader::new()
            .with("t.html", "content")
            .with("extra.css", "@media (max-width: 600px) { p { margin: 0 } }")
            .with("layout.html", "<style>{{ css }}</style>{{ body }}");
        let composer = composer(reader, Some(LayoutDescriptor::new("main", "layout.html")));
        let descriptor = TemplateDescriptor::new("t", "t.html").extra_css("extra.css");

        let result = composer.render("t", Some(&descriptor), &json!({})).await.unwrap();
        assert!(result.html.contains("<style>@media (max-width: 600px)"), "got: {}", result.html);
    }

    #[tokio::test]
    async fn test_missing_extra_css_is_not_fatal() {
        let reader = MemoryAssetReader::new()
            .with("t.html", "content")
            .with("layout.html", "<style>{{ css }}</style>{{ body }}");
        let composer = composer(reader, Some(LayoutDescriptor::new("main", "layout.html")));
        let descriptor = TemplateDescriptor::new("t", "t.html").extra_css("missing.css");

        let result = composer.render("t", Some(&descriptor), &json!({})).await.unwrap();
        assert!(result.html.ends_with("<style></style>content"), "got: {}", result.html);
    }

    #[tokio::test]
    async fn test_render_is_deterministic() {
        let reader = MemoryAssetReader::new()
            .with("t.html", "<p class=\"x\">{{ n }}</p>")
            .with("t.css", ".x { color: red }")
            .with("layout.html", "<div class=\"x\">{{ body }}</div>");
        let composer = composer(reader, Some(LayoutDescriptor::new("main", "layout.html")));
        let descriptor = TemplateDescriptor::new("t", "t.html").css("t.css");

        let first = composer.render("t", Some(&descriptor), &json!({"n": 2})).await.unwrap();
        composer.compiler.compile(&descriptor).await.unwrap();
        let second = composer.render("t", Some(&descriptor), &json!({"n": 2})).await.unwrap();
        assert_eq!(first, second);
    }
}
