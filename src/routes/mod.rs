//! Preview and test-send routes.
//!
//! Templates that declare a route get two actions: `preview` renders the
//! template in the browser, `send` dispatches a test email. The actions
//! are plain async functions of `(template, params) -> response` so any
//! router can mount them; `server` wires them into axum.

mod actions;
mod url;

pub use actions::{preview, send_test, ActionResponse};
pub use url::{builtin_helpers, join_url};

use std::collections::HashMap;
use std::fmt;

use crate::template::TemplateDescriptor;

/// Path and query parameters of a route request
#[derive(Debug, Clone, Default)]
pub struct RouteParams {
    pub path: HashMap<String, String>,
    pub query: HashMap<String, String>,
}

impl RouteParams {
    pub fn new(path: HashMap<String, String>, query: HashMap<String, String>) -> Self {
        Self { path, query }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.path.insert(key.to_string(), value.to_string());
        self
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.path.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    Preview,
    Send,
}

impl RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Preview => "preview",
            RouteKind::Send => "send",
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailerRoute {
    /// e.g. `previewWelcome`
    pub name: String,
    /// e.g. `/emails/preview/welcome`
    pub path: String,
    pub kind: RouteKind,
    pub template: String,
}

/// Preview and send routes for every template that declares a route.
pub fn build_routes(prefix: &str, templates: &[TemplateDescriptor]) -> Vec<MailerRoute> {
    let prefix = prefix.trim_matches('/');
    let mut routes = Vec::new();

    for template in templates {
        let Some(route) = &template.route else {
            continue;
        };

        let suffix = if route.path.starts_with('/') {
            route.path.clone()
        } else {
            format!("/{}", route.path)
        };

        for kind in [RouteKind::Preview, RouteKind::Send] {
            let path = if prefix.is_empty() {
                format!("/{}{}", kind, suffix)
            } else {
                format!("/{}/{}{}", prefix, kind, suffix)
            };

            routes.push(MailerRoute {
                name: format!("{}{}", kind, capitalize_first(&template.name)),
                path,
                kind,
                template: template.name.clone(),
            });
        }
    }

    routes
}

pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
