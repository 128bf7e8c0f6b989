//! Email template pipeline.
//!
//! This module provides:
//! - Template, layout and route descriptors
//! - The compiler turning descriptors into cached render units
//! - A compile cache with at-most-one compile in flight per name
//! - Layout composition producing the final HTML
//!
//! # Example
//!
//! ```ignore
//! let compiler = Arc::new(TemplateCompiler::new(settings, reader, engine, builtin, globals, layout));
//! let composer = LayoutComposer::new(compiler.clone());
//!
//! let welcome = TemplateDescriptor::new("welcome", "welcome.html").css("welcome.css");
//! compiler.compile(&welcome).await;
//!
//! let rendered = composer.render("welcome", Some(&welcome), &json!({"name": "Ada"})).await?;
//! assert!(rendered.html.starts_with("<!DOCTYPE html"));
//! ```

mod cache;
mod compiler;
mod composer;
mod descriptor;
mod unit;

pub use cache::CompileCache;
pub use compiler::TemplateCompiler;
pub use composer::{ComposeError, LayoutComposer, RenderResult, DOCTYPE};
pub use descriptor::{
    LayoutDescriptor, LayoutOverride, RouteDataFn, RouteDescriptor, TemplateDescriptor,
};
pub use unit::CompiledUnit;
