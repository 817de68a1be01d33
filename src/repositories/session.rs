use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, aio::ConnectionManager};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    crypto::token::generate_session_token,
    db::with_timeout,
    error::{AppError, Result},
    models::session::{Session, SessionRecord},
    repositories::requirement::{RedisRequirementStore, RequirementStore},
};

/// How many fresh ids `create` tries before giving up.
const MAX_ID_ATTEMPTS: usize = 3;

/// Storage for session records. Sessions own their requirements: `load`
/// returns them attached and `delete` removes them.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates and persists a session for `identity` with a fresh id and
    /// token. The new session has no requirements, no quota and expires now.
    async fn create(&self, identity: String) -> Result<Session>;

    /// Loads a session with its outstanding requirements.
    async fn load(&self, id: Uuid) -> Result<Option<Session>>;

    /// Persists identity, expiry, quota and token. Fails with
    /// `AppError::NotFound` if the session has been deleted.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Deletes the session record and all of its requirements.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

fn new_record(identity: &str) -> SessionRecord {
    SessionRecord {
        id: Uuid::new_v4(),
        identity: identity.to_string(),
        expire: Utc::now(),
        data_limit: 0,
        token: generate_session_token(),
    }
}

/// Redis-backed session store. Records are JSON under `capport:session:{id}`
/// with no Redis TTL; expiry is evaluated when the session is read. The
/// requirement hashes are expected on the same Redis instance so `delete`
/// can drop both in one transaction.
#[derive(Clone)]
pub struct RedisSessionStore {
    redis: ConnectionManager,
    requirements: Arc<dyn RequirementStore>,
    timeout: Duration,
}

impl RedisSessionStore {
    pub fn new(
        redis: ConnectionManager,
        requirements: Arc<dyn RequirementStore>,
        timeout: Duration,
    ) -> Self {
        Self { redis, requirements, timeout }
    }

    fn key(id: Uuid) -> String {
        format!("capport:session:{}", id)
    }

    fn encode(record: &SessionRecord) -> Result<String> {
        sonic_rs::to_string(record)
            .map_err(|e| AppError::Internal(format!("Session serialization failed: {}", e)))
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, identity: String) -> Result<Session> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let record = new_record(&identity);
            let json = Self::encode(&record)?;
            let mut redis = self.redis.clone();
            let key = Self::key(record.id);

            let inserted: bool = with_timeout(self.timeout, async {
                redis.set_nx(&key, &json).await.map_err(AppError::from)
            })
            .await?;

            if inserted {
                tracing::info!("Session created: {} for identity {}", record.id, record.identity);
                return Ok(Session::from_record(record, Vec::new()));
            }
            tracing::warn!("Session id collision on {}, retrying", record.id);
        }

        Err(AppError::Store("could not allocate a unique session id".to_string()))
    }

    async fn load(&self, id: Uuid) -> Result<Option<Session>> {
        let mut redis = self.redis.clone();
        let key = Self::key(id);
        let json: Option<String> = with_timeout(self.timeout, async {
            redis.get(&key).await.map_err(AppError::from)
        })
        .await?;

        let Some(json) = json else {
            return Ok(None);
        };

        let record: SessionRecord = sonic_rs::from_str(&json)
            .map_err(|e| AppError::Store(format!("Corrupt session record {}: {}", id, e)))?;
        let requirements = self.requirements.list_by_session(id).await?;

        Ok(Some(Session::from_record(record, requirements)))
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let json = Self::encode(&session.record())?;
        let mut redis = self.redis.clone();
        let key = Self::key(session.id);

        // SET .. XX only overwrites an existing record.
        let reply: Option<String> = with_timeout(self.timeout, async {
            redis::cmd("SET")
                .arg(&key)
                .arg(&json)
                .arg("XX")
                .query_async(&mut redis)
                .await
                .map_err(AppError::from)
        })
        .await?;

        match reply {
            Some(_) => {
                tracing::debug!("Session saved: {}", session.id);
                Ok(())
            }
            None => Err(AppError::NotFound),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut redis = self.redis.clone();
        let key = Self::key(id);
        let requirements_key = RedisRequirementStore::key(id);

        // Record and requirement hash go together or not at all.
        with_timeout(self.timeout, async {
            redis::pipe()
                .atomic()
                .del(&key)
                .ignore()
                .del(&requirements_key)
                .ignore()
                .query_async::<()>(&mut redis)
                .await
                .map_err(AppError::from)
        })
        .await?;

        tracing::info!("Session deleted: {}", id);
        Ok(())
    }
}

/// In-process session store.
#[derive(Clone)]
pub struct MemorySessionStore {
    records: Arc<RwLock<HashMap<Uuid, SessionRecord>>>,
    requirements: Arc<dyn RequirementStore>,
}

impl MemorySessionStore {
    pub fn new(requirements: Arc<dyn RequirementStore>) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            requirements,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, identity: String) -> Result<Session> {
        let mut records = self.records.write().await;
        for _ in 0..MAX_ID_ATTEMPTS {
            let record = new_record(&identity);
            if records.contains_key(&record.id) {
                continue;
            }
            records.insert(record.id, record.clone());
            return Ok(Session::from_record(record, Vec::new()));
        }
        Err(AppError::Store("could not allocate a unique session id".to_string()))
    }

    async fn load(&self, id: Uuid) -> Result<Option<Session>> {
        let record = self.records.read().await.get(&id).cloned();
        match record {
            Some(record) => {
                let requirements = self.requirements.list_by_session(id).await?;
                Ok(Some(Session::from_record(record, requirements)))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let mut records = self.records.write().await;
        match records.get_mut(&session.id) {
            Some(stored) => {
                *stored = session.record();
                Ok(())
            }
            None => Err(AppError::NotFound),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.records.write().await.remove(&id);
        self.requirements.delete_all_by_session(id).await
    }
}
