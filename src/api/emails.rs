//! Email dispatch and render endpoints.

use axum::{
    extract::{Path, State},
    response::Html,
    Json,
};
use serde::Serialize;

use crate::error::Result;
use crate::mailer::SendOptions;
use crate::server::AppState;

/// Response for send operations
#[derive(Debug, Serialize)]
pub struct SendEmailResponse {
    /// Rendered and (unless disabled) accepted by the transport
    pub success: bool,
    pub template: String,
    pub to: String,
    /// Sending is disabled, nothing left the process
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct TemplateSummary {
    pub name: String,
    pub path: String,
    pub compiled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    pub routes: Vec<String>,
}

/// POST /api/v1/emails/send
pub async fn send_email(
    State(state): State<AppState>,
    Json(request): Json<SendOptions>,
) -> Result<Json<SendEmailResponse>> {
    let template = request.template.clone();
    let to = request.to.clone();

    let success = state.mailer.send(request).await?;

    Ok(Json(SendEmailResponse {
        success,
        template,
        to,
        dry_run: state.mailer.settings().disabled,
    }))
}

/// POST /api/v1/emails/{template}/render
pub async fn render_email(
    State(state): State<AppState>,
    Path(template): Path<String>,
    Json(data): Json<serde_json::Value>,
) -> Result<Html<String>> {
    let rendered = state.mailer.render(&template, &data).await?;
    Ok(Html(rendered.html))
}

/// GET /api/v1/emails
pub async fn list_templates(State(state): State<AppState>) -> Json<Vec<TemplateSummary>> {
    let mailer = &state.mailer;

    let summaries = mailer
        .templates()
        .map(|descriptor| {
            let unit = mailer.compiled(&descriptor.name);
            TemplateSummary {
                name: descriptor.name.clone(),
                path: descriptor.path.clone(),
                compiled: unit.is_some(),
                layout: unit.and_then(|u| u.layout_ref().map(str::to_string)),
                routes: mailer
                    .routes()
                    .iter()
                    .filter(|r| r.template == descriptor.name)
                    .map(|r| r.path.clone())
                    .collect(),
            }
        })
        .collect();

    Json(summaries)
}
