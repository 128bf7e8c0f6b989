//! URL-building helpers available to every template.

use std::collections::HashMap;
use std::sync::Arc;

use minijinja::value::Value;
use minijinja::{Error, ErrorKind};

use crate::engine::Helpers;

use super::MailerRoute;

/// Join `base` and `path` with exactly one slash
pub fn join_url(base: Option<&str>, path: &str) -> String {
    match base {
        Some(base) if !base.is_empty() => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ),
        _ => path.to_string(),
    }
}

/// `base_url(path)` and `email_url_for(route_name, params?)`
pub fn builtin_helpers(base_url: Option<&str>, routes: &[MailerRoute]) -> Helpers {
    let base: Option<Arc<str>> = base_url.map(Arc::from);
    let paths: Arc<HashMap<String, String>> = Arc::new(
        routes
            .iter()
            .map(|route| (route.name.clone(), route.path.clone()))
            .collect(),
    );

    let base_for_url = base.clone();
    Helpers::new()
        .with("base_url", move |args: &[Value]| {
            let path = args.first().map(value_to_string).unwrap_or_default();
            Ok(Value::from(join_url(base_for_url.as_deref(), &path)))
        })
        .with("email_url_for", move |args: &[Value]| {
            let name = args.first().and_then(Value::as_str).ok_or_else(|| {
                Error::new(ErrorKind::MissingArgument, "email_url_for requires a route name")
            })?;

            let path = paths.get(name).ok_or_else(|| {
                Error::new(ErrorKind::InvalidOperation, format!("Unknown route '{}'", name))
            })?;

            let path = substitute_params(name, path, args.get(1))?;
            Ok(Value::from(join_url(base.as_deref(), &path)))
        })
}

/// Replace `{param}` segments of `path` with entries of `params`
fn substitute_params(route: &str, path: &str, params: Option<&Value>) -> Result<String, Error> {
    let mut result = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let key = &rest[start + 1..start + len];

        let value = params
            .and_then(|params| params.get_attr(key).ok())
            .filter(|value| !value.is_undefined() && !value.is_none())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::MissingArgument,
                    format!("Route '{}' requires parameter '{}'", route, key),
                )
            })?;

        result.push_str(&rest[..start]);
        result.push_str(&value_to_string(&value));
        rest = &rest[start + len + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

fn value_to_string(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}
