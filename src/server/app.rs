use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    routing::{get, MethodRouter},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::api::api_routes;
use crate::routes::{self, ActionResponse, MailerRoute, RouteKind, RouteParams};

use super::AppState;

pub fn create_app(state: AppState) -> Router {
    let mut router = Router::new().merge(api_routes());

    if state.mailer.settings().add_routes {
        router = router.merge(mailer_routes(state.mailer.routes()));
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Preview and test-send endpoints of every routed template
fn mailer_routes(routes: &[MailerRoute]) -> Router<AppState> {
    routes.iter().fold(Router::new(), |router, route| {
        router.route(&route.path, action_handler(route))
    })
}

fn action_handler(route: &MailerRoute) -> MethodRouter<AppState> {
    let template = route.template.clone();
    let kind = route.kind;

    // `Path` rejects routes without parameters
    if route.path.contains('{') {
        get(
            move |State(state): State<AppState>,
                  Path(path): Path<HashMap<String, String>>,
                  Query(query): Query<HashMap<String, String>>| {
                let template = template.clone();
                async move {
                    run_action(&state, kind, &template, RouteParams::new(path, query)).await
                }
            },
        )
    } else {
        get(
            move |State(state): State<AppState>,
                  Query(query): Query<HashMap<String, String>>| {
                let template = template.clone();
                async move {
                    let params = RouteParams::new(HashMap::new(), query);
                    run_action(&state, kind, &template, params).await
                }
            },
        )
    }
}

async fn run_action(
    state: &AppState,
    kind: RouteKind,
    template: &str,
    params: RouteParams,
) -> ActionResponse {
    match kind {
        RouteKind::Preview => routes::preview(&state.mailer, template, &params).await,
        RouteKind::Send => routes::send_test(&state.mailer, template, &params).await,
    }
}
