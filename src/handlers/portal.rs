//! Legacy browser flow: the pages a client visits to satisfy requirements.
//!
//! A page is requested once without its completion field to show the prompt,
//! and again with it to complete the requirement. Completion is accepted via
//! GET query for existing clients and via POST form, which is what the
//! built-in prompts submit.

use axum::{
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::requirement::RequirementKind,
    services::portal as portal_service,
    state::AppState,
};

const INVALID_PAGE: &str = "<!doctype html>\n<html><head><title>Invalid session</title></head>\
<body><h1>Invalid session</h1><p>This session does not exist or has ended.</p></body></html>\n";

const ACCEPTED_PAGE: &str = "<!doctype html>\n<html><head><title>Terms accepted</title></head>\
<body><h1>Terms accepted</h1><p>Thank you for accepting the terms and conditions.</p></body></html>\n";

const WELCOME_PAGE: &str = "<!doctype html>\n<html><head><title>Welcome</title></head>\
<body><h1>Welcome</h1><p>You are logged in.</p></body></html>\n";

/// Fields of the terms page.
#[derive(Deserialize, Debug, Default)]
pub struct TermsRequest {
    pub session: Option<String>,
    pub accept: Option<String>,
}

/// Fields of the login page.
#[derive(Deserialize, Debug, Default)]
pub struct LoginRequest {
    pub session: Option<String>,
    pub password: Option<String>,
}

fn page(body: String) -> Response {
    ([(header::CACHE_CONTROL, "no-store")], Html(body)).into_response()
}

fn terms_prompt(session_id: Uuid) -> String {
    format!(
        "<!doctype html>\n<html><head><title>Terms and conditions</title></head><body>\
<h1>Terms and conditions</h1>\
<p>Access to this network is subject to the terms and conditions of the operator.</p>\
<form method=\"post\" action=\"terms\">\
<input type=\"hidden\" name=\"session\" value=\"{session_id}\">\
<input type=\"hidden\" name=\"accept\" value=\"yes\">\
<button type=\"submit\">Accept</button></form></body></html>\n"
    )
}

fn login_prompt(session_id: Uuid) -> String {
    format!(
        "<!doctype html>\n<html><head><title>Log in</title></head><body>\
<h1>Log in</h1>\
<form method=\"post\" action=\"login\">\
<input type=\"hidden\" name=\"session\" value=\"{session_id}\">\
<label>Password <input type=\"password\" name=\"password\"></label>\
<button type=\"submit\">Log in</button></form></body></html>\n"
    )
}

/// Resolves the `session` field to an existing session id. `None` means the
/// invalid page should be shown.
async fn resolve_session(state: &AppState, session: Option<&str>) -> Result<Option<Uuid>> {
    let Some(session_id) = session.and_then(|s| Uuid::parse_str(s).ok()) else {
        return Ok(None);
    };

    match portal_service::load_session(state, session_id).await {
        Ok(_) => Ok(Some(session_id)),
        Err(AppError::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Shows the prompt, or completes `kind` when `completed` is set.
async fn requirement_page(
    state: &AppState,
    session: Option<&str>,
    completed: bool,
    kind: RequirementKind,
    prompt: fn(Uuid) -> String,
    done_page: &str,
) -> Result<Response> {
    let Some(session_id) = resolve_session(state, session).await? else {
        tracing::debug!("Portal page requested for unknown session");
        return Ok(page(INVALID_PAGE.to_string()));
    };

    if !completed {
        return Ok(page(prompt(session_id)));
    }

    match portal_service::satisfy_requirement(state, session_id, &kind).await {
        Ok(_) => Ok(page(done_page.to_string())),
        // Deleted between the lookup and the completion.
        Err(AppError::NotFound) => Ok(page(INVALID_PAGE.to_string())),
        Err(e) => Err(e),
    }
}

async fn terms_page(state: &AppState, request: TermsRequest) -> Result<Response> {
    requirement_page(
        state,
        request.session.as_deref(),
        request.accept.is_some(),
        RequirementKind::ViewPage,
        terms_prompt,
        ACCEPTED_PAGE,
    )
    .await
}

async fn login_page(state: &AppState, request: LoginRequest) -> Result<Response> {
    // Credentials are not checked; supplying a password completes the step.
    requirement_page(
        state,
        request.session.as_deref(),
        request.password.is_some(),
        RequirementKind::ProvideCredentials,
        login_prompt,
        WELCOME_PAGE,
    )
    .await
}

/// Terms page via query string.
#[axum::debug_handler]
pub async fn terms(
    State(state): State<AppState>,
    Query(request): Query<TermsRequest>,
) -> Result<Response> {
    terms_page(&state, request).await
}

/// Terms page via form submission.
#[axum::debug_handler]
pub async fn submit_terms(
    State(state): State<AppState>,
    Form(request): Form<TermsRequest>,
) -> Result<Response> {
    terms_page(&state, request).await
}

/// Login page via query string.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Query(request): Query<LoginRequest>,
) -> Result<Response> {
    login_page(&state, request).await
}

/// Login page via form submission.
#[axum::debug_handler]
pub async fn submit_login(
    State(state): State<AppState>,
    Form(request): Form<LoginRequest>,
) -> Result<Response> {
    login_page(&state, request).await
}
