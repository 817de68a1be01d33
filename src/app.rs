use axum::{
    Router,
    routing::{get, post},
};
use http::{Method, header};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{handlers, state::AppState};

/// Builds the HTTP application: the CAPPORT API, the legacy portal pages and
/// the static fallback.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(86400));

    let mut create_routes = Router::new()
        .route("/capport/sessions", post(handlers::capport::create_session));

    let per_second = state.config.rate_limit_per_second;
    if per_second > 0 {
        let governor_conf = GovernorConfigBuilder::default()
            .per_millisecond((1000 / per_second).max(1))
            .burst_size(u32::try_from(per_second).unwrap_or(u32::MAX))
            .use_headers()
            .finish();
        match governor_conf {
            Some(conf) => {
                create_routes = create_routes.layer(GovernorLayer::new(Arc::new(conf)));
                tracing::info!("✅ Session creation limited to {}/s per client", per_second);
            }
            None => tracing::warn!("Invalid rate limit {}, session creation is unlimited", per_second),
        }
    }

    let api_routes = Router::new()
        .route("/capport", get(handlers::capport::discover))
        .route(
            "/capport/sessions/{session_id}",
            get(handlers::capport::get_session).delete(handlers::capport::delete_session),
        )
        .merge(create_routes);

    let portal_routes = Router::new()
        .route(
            "/terms",
            get(handlers::portal::terms).post(handlers::portal::submit_terms),
        )
        .route(
            "/login",
            get(handlers::portal::login).post(handlers::portal::submit_login),
        );

    let static_dir = state.config.static_dir.clone();

    Router::new()
        .merge(api_routes)
        .merge(portal_routes)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(cors)
        .fallback_service(ServeDir::new(static_dir))
}
