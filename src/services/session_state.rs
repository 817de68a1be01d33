//! Derivation of a session's externally visible state.
//!
//! Everything here is a pure function of the loaded session, the current
//! time and the metered usage. Nothing is cached: permission depends on the
//! clock and on usage, so it is evaluated again on every read.

use chrono::{DateTime, Utc};

use crate::models::session::Session;

/// The `state` object of a status document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub permitted: bool,
    /// Present only while permitted.
    pub expires: Option<DateTime<Utc>>,
    /// Present only while permitted and a quota is set.
    pub bytes_remaining: Option<u64>,
}

/// Whether all of the session's requirements have been satisfied.
pub fn met_requirements(session: &Session) -> bool {
    session.requirements.is_empty()
}

/// Whether the session's traffic may flow at `now` given `usage` bytes used.
///
/// True iff the session has not expired, has no outstanding requirements and
/// is under its quota (a quota of 0 is unlimited).
pub fn is_permitted(session: &Session, now: DateTime<Utc>, usage: u64) -> bool {
    now < session.expire
        && met_requirements(session)
        && (session.data_limit == 0 || usage < session.data_limit)
}

/// Bytes left in the quota, or `None` for an unlimited session.
pub fn remaining_bytes(session: &Session, usage: u64) -> Option<u64> {
    (session.data_limit > 0).then(|| session.data_limit.saturating_sub(usage))
}

/// Evaluates the session into its `state` object.
pub fn evaluate(session: &Session, now: DateTime<Utc>, usage: u64) -> SessionState {
    if !is_permitted(session, now, usage) {
        return SessionState {
            permitted: false,
            expires: None,
            bytes_remaining: None,
        };
    }

    SessionState {
        permitted: true,
        expires: Some(session.expire),
        bytes_remaining: remaining_bytes(session, usage),
    }
}
