use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, Result},
    models::{requirement::RequirementKind, session::Session},
    services::{session_state, usage::usage_for},
    state::AppState,
};

/// `expires` is rendered with an explicit UTC offset rather than `Z`.
const EXPIRES_FORMAT: &str = "%Y-%m-%dT%H:%M:%S+00:00";

/// The CAPPORT status document returned by the session endpoints.
#[derive(Debug, Serialize)]
pub struct StatusDocument {
    pub id: SessionRef,
    pub identity: String,
    pub state: StateDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub requirements: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Serialize)]
pub struct SessionRef {
    pub uuid: String,
    pub href: String,
}

#[derive(Debug, Serialize)]
pub struct StateDocument {
    pub permitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_remaining: Option<u64>,
}

/// Appends `session={id}` to an action URL so the page knows which session
/// to update.
pub fn with_session_param(url: &str, session_id: Uuid) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}session={}", url, separator, session_id)
}

/// The requirements every new session starts with.
pub fn default_requirements(config: &Config, root: &str, session_id: Uuid) -> Vec<(RequirementKind, String)> {
    let terms = config
        .terms_url
        .clone()
        .unwrap_or_else(|| format!("{}terms", root));
    let login = config
        .login_url
        .clone()
        .unwrap_or_else(|| format!("{}login", root));

    vec![
        (RequirementKind::ViewPage, with_session_param(&terms, session_id)),
        (RequirementKind::ProvideCredentials, with_session_param(&login, session_id)),
    ]
}

/// Creates a session for `identity` with the default requirements, expiry
/// and quota.
///
/// Either the record and all requirements are persisted, or the partial
/// session is deleted again and `AppError::SessionInit` is returned.
pub async fn create_session(state: &AppState, identity: String, root: &str) -> Result<Session> {
    let session = state
        .sessions
        .create(identity)
        .await
        .map_err(|e| AppError::SessionInit(e.to_string()))?;
    let session_id = session.id;

    match initialize_session(state, session, root).await {
        Ok(session) => Ok(session),
        Err(e) => {
            tracing::error!("❌ Initializing session {} failed, rolling back: {}", session_id, e);
            if let Err(rollback) = state.sessions.delete(session_id).await {
                tracing::error!("❌ Rollback of session {} failed: {}", session_id, rollback);
            }
            Err(AppError::SessionInit(e.to_string()))
        }
    }
}

async fn initialize_session(state: &AppState, mut session: Session, root: &str) -> Result<Session> {
    for (kind, url) in default_requirements(&state.config, root, session.id) {
        state.requirements.create(session.id, kind, url).await?;
    }

    let ttl = chrono::Duration::from_std(state.config.session_ttl)
        .map_err(|e| AppError::Internal(format!("Session TTL out of range: {}", e)))?;
    session.expire = Utc::now() + ttl;
    session.data_limit = state.config.session_data_limit;
    state.sessions.save(&session).await?;

    tracing::info!(
        "✅ Session {} initialized for {} (expires {})",
        session.id,
        session.identity,
        session.expire
    );

    // Re-read so the response reflects exactly what was stored.
    load_session(state, session.id).await
}

/// Loads a session or fails with `AppError::NotFound`.
pub async fn load_session(state: &AppState, session_id: Uuid) -> Result<Session> {
    state
        .sessions
        .load(session_id)
        .await?
        .ok_or(AppError::NotFound)
}

/// Deletes a session and its requirements. Fails with `AppError::NotFound`
/// if the session does not exist.
pub async fn delete_session(state: &AppState, session_id: Uuid) -> Result<()> {
    load_session(state, session_id).await?;
    state.sessions.delete(session_id).await
}

/// Marks requirement `kind` of a session as satisfied.
///
/// Satisfying an already satisfied requirement is a no-op. If this leaves the
/// session with no outstanding requirements, traffic is enabled for its
/// identity straight away. A failed enablement is logged and does not undo
/// the satisfaction.
pub async fn satisfy_requirement(state: &AppState, session_id: Uuid, kind: &RequirementKind) -> Result<Session> {
    load_session(state, session_id).await?;
    state.requirements.delete(session_id, kind).await?;
    tracing::info!("✅ Requirement {} satisfied for session {}", kind, session_id);

    let session = load_session(state, session_id).await?;
    if session_state::met_requirements(&session) {
        if let Err(e) = state.traffic.enable(&session.identity).await {
            tracing::error!("❌ Enabling traffic for {} failed: {}", session.identity, e);
        }
    }
    Ok(session)
}

/// Renders the status document of a session as of now.
pub async fn status_document(state: &AppState, session: &Session, root: &str) -> StatusDocument {
    let usage = usage_for(
        state.usage.as_ref(),
        session,
        state.config.usage_failure_policy,
    )
    .await;
    render_status(session, Utc::now(), usage, root)
}

/// Renders the status document for a given clock and usage figure.
pub fn render_status(session: &Session, now: DateTime<Utc>, usage: u64, root: &str) -> StatusDocument {
    let evaluated = session_state::evaluate(session, now, usage);

    StatusDocument {
        id: SessionRef {
            uuid: session.id.to_string(),
            href: format!("{}capport/sessions/{}", root, session.id),
        },
        identity: session.identity.clone(),
        token: evaluated.permitted.then(|| session.token.clone()),
        state: StateDocument {
            permitted: evaluated.permitted,
            expires: evaluated
                .expires
                .map(|expires| expires.format(EXPIRES_FORMAT).to_string()),
            bytes_remaining: evaluated.bytes_remaining,
        },
        requirements: session
            .requirements
            .iter()
            .map(|r| BTreeMap::from([(r.kind.to_string(), r.url.clone())]))
            .collect(),
    }
}
