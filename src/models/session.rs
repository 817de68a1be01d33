use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::requirement::Requirement;

/// A client's attempt to gain network access.
///
/// Permission is never stored here; see `services::session_state` for how it
/// is derived on every read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The unique identifier for the session.
    pub id: Uuid,
    /// The subscriber label supplied at creation.
    pub identity: String,
    /// The moment after which the session is no longer permitted.
    pub expire: DateTime<Utc>,
    /// Byte quota. 0 means unlimited.
    pub data_limit: u64,
    /// Opaque credential handed to the client once permitted.
    pub token: String,
    /// Outstanding requirements, in `RequirementKind` order.
    pub requirements: Vec<Requirement>,
}

impl Session {
    /// The persisted part of the session. Requirements live in their own store.
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id,
            identity: self.identity.clone(),
            expire: self.expire,
            data_limit: self.data_limit,
            token: self.token.clone(),
        }
    }

    /// Rebuilds a session from its record and the requirements loaded for it.
    pub fn from_record(record: SessionRecord, requirements: Vec<Requirement>) -> Self {
        Self {
            id: record.id,
            identity: record.identity,
            expire: record.expire,
            data_limit: record.data_limit,
            token: record.token,
            requirements,
        }
    }
}

/// The stored session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub identity: String,
    pub expire: DateTime<Utc>,
    pub data_limit: u64,
    pub token: String,
}
