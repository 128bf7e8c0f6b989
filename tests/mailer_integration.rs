//! Mailer integration tests
//!
//! These tests drive the public `Mailer` API end to end with in-memory
//! assets and a recording transport.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use minijinja::Value;
use serde_json::json;

use ara_mailer::assets::MemoryAssetReader;
use ara_mailer::config::MailerSettings;
use ara_mailer::engine::{Helpers, MiniJinjaEngine};
use ara_mailer::mailer::{Mailer, MailerError, RecordingTransport, SendOptions};
use ara_mailer::template::{LayoutDescriptor, TemplateDescriptor, DOCTYPE};

const LAYOUT: &str = "<html><head></head><body><div class=\"wrap\">{{ body }}</div></body></html>";

fn settings() -> MailerSettings {
    MailerSettings {
        silent: true,
        from: Some("noreply@example.com".to_string()),
        ..Default::default()
    }
}

fn reader() -> MemoryAssetReader {
    MemoryAssetReader::new()
        .with("t.html", "<p>Hello {{ name }}</p>")
        .with("layout.html", LAYOUT)
        .with("layout.css", "body{color:red}")
}

fn build(reader: MemoryAssetReader, transport: Arc<RecordingTransport>) -> Mailer {
    Mailer::builder()
        .settings(settings())
        .reader(Arc::new(reader))
        .transport(transport)
        .layout(LayoutDescriptor::new("layout", "layout.html").css("layout.css"))
        .template(TemplateDescriptor::new("t", "t.html"))
        .build()
        .unwrap()
}

fn compact(html: &str) -> String {
    html.chars().filter(|c| !c.is_whitespace()).collect()
}

#[tokio::test]
async fn test_render_is_deterministic() {
    let mailer = build(reader(), Arc::new(RecordingTransport::new()));
    let data = json!({"name": "Ada"});

    assert!(mailer.precompile("t").await.unwrap());
    let first = mailer.render("t", &data).await.unwrap();

    assert!(mailer.precompile("t").await.unwrap());
    let second = mailer.render("t", &data).await.unwrap();

    assert_eq!(first.html, second.html);
}

#[tokio::test]
async fn test_missing_template_file() {
    let reader = MemoryAssetReader::new().with("layout.html", LAYOUT);
    let mailer = Mailer::builder()
        .settings(settings())
        .reader(Arc::new(reader))
        .template(TemplateDescriptor::new("t", "missing.html"))
        .build()
        .unwrap();

    assert!(!mailer.precompile("t").await.unwrap());
    assert!(mailer.compiled("t").is_none());

    let result = mailer.render("t", &json!({})).await;
    assert!(matches!(result, Err(MailerError::TemplateNotFound(name)) if name == "t"));
}

#[tokio::test]
async fn test_unregistered_template_not_found() {
    let mailer = build(reader(), Arc::new(RecordingTransport::new()));

    let result = mailer.render("nope", &json!({})).await;
    assert!(matches!(result, Err(MailerError::TemplateNotFound(_))));
}

#[tokio::test]
async fn test_layout_css_is_inlined() {
    let mailer = build(reader(), Arc::new(RecordingTransport::new()));

    let rendered = mailer.render("t", &json!({})).await.unwrap();

    assert!(rendered.html.starts_with(DOCTYPE));
    assert!(rendered.html.starts_with("<!DOCTYPE html"));
    assert!(
        compact(&rendered.html).contains("style=\"color:red"),
        "got: {}",
        rendered.html
    );
    assert!(rendered.html.contains("<p>Hello"));
}

#[tokio::test]
async fn test_layout_css_also_styles_standalone_content() {
    let reader = reader().with("layout.css", "p{color:red}");
    let mailer = build(reader, Arc::new(RecordingTransport::new()));
    assert!(mailer.precompile("t").await.unwrap());

    let content = mailer
        .compiled("t")
        .unwrap()
        .render(&json!({"name": "Ada"}), BTreeMap::new())
        .unwrap();
    assert!(compact(&content).contains("<pstyle=\"color:red"), "got: {}", content);
}

#[tokio::test]
async fn test_template_css_styles_layout_elements() {
    let reader = reader().with("t.css", ".wrap{color:blue}");
    let mailer = Mailer::builder()
        .settings(settings())
        .reader(Arc::new(reader))
        .layout(LayoutDescriptor::new("layout", "layout.html").css("layout.css"))
        .template(TemplateDescriptor::new("t", "t.html").css("t.css"))
        .build()
        .unwrap();

    let rendered = mailer.render("t", &json!({"name": "Ada"})).await.unwrap();
    assert!(compact(&rendered.html).contains("style=\"color:blue"), "got: {}", rendered.html);
    assert!(mailer.compiled("layout+t").is_some());
    assert!(mailer.compiled("layout").is_none());
}

#[tokio::test]
async fn test_styled_table_loop_renders_every_row() {
    let reader = reader()
        .with(
            "rows.html",
            "<table>{% for r in rows %}<tr><td>{{ r }}</td></tr>{% endfor %}</table>\n\
             <p>{% if rows|length > 1 %}many{% else %}one{% endif %}</p>",
        )
        .with("rows.css", "td{color:red}");
    let mailer = Mailer::builder()
        .settings(settings())
        .reader(Arc::new(reader))
        .layout(LayoutDescriptor::new("layout", "layout.html").css("layout.css"))
        .template(TemplateDescriptor::new("rows", "rows.html").css("rows.css"))
        .build()
        .unwrap();

    let rendered = mailer
        .render("rows", &json!({"rows": ["a", "b", "c"]}))
        .await
        .unwrap();

    assert_eq!(rendered.html.matches("<td").count(), 3, "got: {}", rendered.html);
    assert!(rendered.html.contains(">c</td>"), "got: {}", rendered.html);
    assert!(rendered.html.contains("many"), "got: {}", rendered.html);
}

#[tokio::test]
async fn test_layout_receives_body_and_preview() {
    let reader = reader().with(
        "layout.html",
        "<html><head></head><body><span>{{ preview }}</span>{{ body }}</body></html>",
    );
    let mailer = build(reader, Arc::new(RecordingTransport::new()));

    let rendered = mailer
        .render("t", &json!({"name": "Ada", "preview": "Welcome aboard"}))
        .await
        .unwrap();

    assert!(rendered.html.contains("<span>Welcome aboard</span>"));
    assert!(rendered.html.contains("<p>Hello Ada</p>"));
}

#[tokio::test]
async fn test_local_helper_beats_global() {
    let reader = MemoryAssetReader::new().with("t.html", "<p>{{ foo() }}</p>");
    let engine = MiniJinjaEngine::with_global_helpers(
        Helpers::new().with("foo", |_: &[Value]| Ok(Value::from("engine"))),
    );

    let mailer = Mailer::builder()
        .settings(settings())
        .reader(Arc::new(reader))
        .engine(Arc::new(engine))
        .helpers(Helpers::new().with("foo", |_: &[Value]| Ok(Value::from("global"))))
        .template(
            TemplateDescriptor::new("t", "t.html")
                .helper("foo", |_: &[Value]| Ok(Value::from("local"))),
        )
        .template(TemplateDescriptor::new("u", "t.html"))
        .build()
        .unwrap();

    let local = mailer.render("t", &json!({})).await.unwrap();
    assert!(local.html.contains("<p>local</p>"), "got: {}", local.html);

    let global = mailer.render("u", &json!({})).await.unwrap();
    assert!(global.html.contains("<p>global</p>"), "got: {}", global.html);
}

#[tokio::test]
async fn test_empty_recipient_never_reaches_transport() {
    let transport = Arc::new(RecordingTransport::new());
    let mailer = build(reader(), transport.clone());

    let result = mailer.send(SendOptions::new("", "x", "t")).await;

    assert!(matches!(result, Err(MailerError::Validation(_))));
    assert_eq!(transport.count().await, 0);
}

#[tokio::test]
async fn test_disabled_mode_renders_without_sending() {
    let transport = Arc::new(RecordingTransport::new());
    let mailer = Mailer::builder()
        .settings(MailerSettings {
            disabled: true,
            ..settings()
        })
        .reader(Arc::new(reader()))
        .transport(transport.clone())
        .template(TemplateDescriptor::new("t", "t.html"))
        .build()
        .unwrap();

    let sent = mailer
        .send(SendOptions::new("ada@example.com", "Hi", "t").data(json!({"name": "Ada"})))
        .await
        .unwrap();

    assert!(sent);
    assert_eq!(transport.count().await, 0);
    assert!(mailer.compiled("t").is_some());
}

#[tokio::test]
async fn test_send_delivers_rendered_html() {
    let transport = Arc::new(RecordingTransport::new());
    let mailer = build(reader(), transport.clone());

    let sent = mailer
        .send(
            SendOptions::new("ada@example.com", "Hi", "t")
                .reply_to("support@example.com")
                .header("X-Campaign", "launch")
                .data(json!({"name": "Ada"})),
        )
        .await
        .unwrap();
    assert!(sent);

    let messages = transport.sent().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].html.starts_with(DOCTYPE));
    assert!(messages[0].html.contains("Hello Ada"));
    assert_eq!(messages[0].reply_to.as_deref(), Some("support@example.com"));
    assert_eq!(messages[0].headers.get("X-Campaign").map(String::as_str), Some("launch"));
}

#[tokio::test]
async fn test_concurrent_first_renders_read_source_once() {
    let reader = Arc::new(
        MemoryAssetReader::new()
            .with("t.html", "<p>{{ name }}</p>")
            .with_read_delay(Duration::from_millis(20)),
    );
    let mailer = Arc::new(
        Mailer::builder()
            .settings(settings())
            .reader(reader.clone())
            .template(TemplateDescriptor::new("t", "t.html"))
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let mailer = mailer.clone();
            tokio::spawn(async move { mailer.render("t", &json!({ "name": i })).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let rendered = handle.await.unwrap().unwrap();
        assert!(rendered.html.ends_with(&format!("<p>{}</p>", i)));
    }

    assert_eq!(reader.read_count("t.html"), 1);
}

#[tokio::test]
async fn test_init_precompiles_and_lists_routes() {
    use ara_mailer::template::RouteDescriptor;

    let reader = reader().with("other.html", "<p>other</p>");
    let mailer = Mailer::builder()
        .settings(settings())
        .reader(Arc::new(reader))
        .layout(LayoutDescriptor::new("layout", "layout.html").css("layout.css"))
        .template(TemplateDescriptor::new("t", "t.html").route(RouteDescriptor::new("/t")))
        .template(TemplateDescriptor::new("other", "other.html").without_layout())
        .template(TemplateDescriptor::new("broken", "missing.html"))
        .build()
        .unwrap();

    let routes = mailer.init().await;
    let names: Vec<_> = routes.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["previewT", "sendT"]);

    assert!(mailer.compiled("t").is_some());
    assert!(mailer.compiled("other").is_some());
    assert!(mailer.compiled("broken").is_none());
    assert!(mailer.compiled("layout").is_some());
}
