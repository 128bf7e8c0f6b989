//! Preview and test-send actions.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::mailer::{Mailer, SendOptions};

use super::RouteParams;

const SEND_FAILED: &str = "Did not send test email, something went wrong. Check the logs.";

/// Status and body of an action, independent of any router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl ActionResponse {
    pub fn html(body: String) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "text/html; charset=utf-8",
            body,
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }
}

impl IntoResponse for ActionResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

/// Route data for `template`, or the 500 response of a failing data function
fn route_data(
    mailer: &Mailer,
    template: &str,
    params: &RouteParams,
) -> Result<serde_json::Value, ActionResponse> {
    let Some(route) = mailer.template(template).and_then(|d| d.route.as_ref()) else {
        return Ok(serde_json::Value::Null);
    };

    route.resolve_data(params).map_err(|message| {
        tracing::error!(target: "mailer", template = %template, error = %message, "Route data function failed");
        ActionResponse::text(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Exception in {} data function: {}", template, message),
        )
    })
}

/// Recompile and render `template` for the browser
#[tracing::instrument(name = "routes.preview", skip(mailer, params))]
pub async fn preview(mailer: &Mailer, template: &str, params: &RouteParams) -> ActionResponse {
    if mailer.template(template).is_none() {
        return ActionResponse::text(
            StatusCode::NOT_FOUND,
            format!("Could not find template: {}", template),
        );
    }

    let data = match route_data(mailer, template, params) {
        Ok(data) => data,
        Err(response) => return response,
    };

    // Pick up edited sources on reload
    if let Ok(false) = mailer.precompile(template).await {
        tracing::warn!(target: "mailer", template = %template, "Recompile failed, rendering cached version");
    }

    match mailer.render(template, &data).await {
        Ok(rendered) => ActionResponse::html(rendered.html),
        Err(e) => {
            tracing::error!(target: "mailer", template = %template, error = %e, "Could not render preview");
            ActionResponse::text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Exception rendering {}: {}", template, e),
            )
        }
    }
}

/// Render `template` and send it to `?to=` or the configured test address
#[tracing::instrument(name = "routes.send_test", skip(mailer, params))]
pub async fn send_test(mailer: &Mailer, template: &str, params: &RouteParams) -> ActionResponse {
    if mailer.template(template).is_none() {
        return ActionResponse::text(
            StatusCode::NOT_FOUND,
            format!("Could not find template: {}", template),
        );
    }

    let to = params
        .query("to")
        .filter(|to| !to.trim().is_empty())
        .map(str::to_string)
        .or_else(|| mailer.settings().test_email.clone());

    let Some(to) = to else {
        return ActionResponse::text(StatusCode::BAD_REQUEST, "No testEmail provided.");
    };

    let data = match route_data(mailer, template, params) {
        Ok(data) => data,
        Err(response) => return response,
    };

    let options =
        SendOptions::new(&to, &format!("[TEST] {}", template), template).data(data);

    match mailer.send(options).await {
        Ok(true) => {
            let body = if mailer.settings().disabled || !mailer.transport().delivers_remotely() {
                "Sent email to STDOUT".to_string()
            } else {
                format!("Sent test email to {}", to)
            };
            ActionResponse::text(StatusCode::OK, body)
        }
        Ok(false) => ActionResponse::text(StatusCode::INTERNAL_SERVER_ERROR, SEND_FAILED),
        Err(e) => {
            tracing::error!(target: "mailer", template = %template, error = %e, "Test email rejected");
            ActionResponse::text(StatusCode::INTERNAL_SERVER_ERROR, SEND_FAILED)
        }
    }
}
