use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    handlers::request::{url_root, wants_json},
    models::session::Session,
    services::portal as portal_service,
    state::AppState,
    validation::session::extract_identity,
};

fn json_response<T: serde::Serialize>(status: StatusCode, value: &T) -> Result<Response> {
    let body = sonic_rs::to_string(value)
        .map_err(|e| AppError::Internal(format!("Response serialization failed: {}", e)))?;
    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Session ids in paths are parsed by hand so that a malformed id is
/// reported like any other unknown session.
fn parse_session_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound)
}

async fn status_response(state: &AppState, session: &Session, root: &str) -> Result<Response> {
    let document = portal_service::status_document(state, session, root).await;
    json_response(StatusCode::OK, &document)
}

/// Discovery: where to create a session and where to browse.
#[axum::debug_handler]
pub async fn discover(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response> {
    let root = url_root(&headers);
    let create = state
        .config
        .create_session_url
        .clone()
        .unwrap_or_else(|| format!("{}capport/sessions", root));
    let browse = state.config.browse_url.clone().unwrap_or(root);

    if wants_json(&headers) {
        return json_response(
            StatusCode::OK,
            &sonic_rs::json!({
                "create_href": create,
                "browse_href": browse
            }),
        );
    }

    tracing::debug!("Discovery without JSON preference, redirecting to {}", browse);
    Ok(Redirect::temporary(&browse).into_response())
}

/// Creates a session for the identity in the JSON body.
#[axum::debug_handler]
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let identity = extract_identity(&body)?;
    tracing::info!("📝 Session requested for identity: {}", identity);

    let root = url_root(&headers);
    let session = portal_service::create_session(&state, identity, &root).await?;

    status_response(&state, &session, &root).await
}

/// Returns the status document of a session.
#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Response> {
    let session_id = parse_session_id(&session_id)?;
    let session = portal_service::load_session(&state, session_id).await?;

    status_response(&state, &session, &url_root(&headers)).await
}

/// Deletes a session when the client leaves the network.
#[axum::debug_handler]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response> {
    let session_id = parse_session_id(&session_id)?;
    portal_service::delete_session(&state, session_id).await?;

    tracing::info!("👋 Session {} deleted by client", session_id);
    Ok(StatusCode::NO_CONTENT.into_response())
}
