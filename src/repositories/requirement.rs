use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    db::with_timeout,
    error::{AppError, Result},
    models::requirement::{Requirement, RequirementKind},
};

/// Storage for requirement records keyed by (session, kind).
///
/// Every write is durable when the call returns.
#[async_trait]
pub trait RequirementStore: Send + Sync {
    /// Creates a requirement. Fails with `AppError::Conflict` if the session
    /// already has one of this kind; the existing record is left as is.
    async fn create(&self, session_id: Uuid, kind: RequirementKind, url: String) -> Result<Requirement>;

    /// Loads a single requirement.
    async fn load(&self, session_id: Uuid, kind: &RequirementKind) -> Result<Option<Requirement>>;

    /// Lists the outstanding requirements of a session in `RequirementKind` order.
    async fn list_by_session(&self, session_id: Uuid) -> Result<Vec<Requirement>>;

    /// Deletes a requirement. Deleting an absent requirement is a no-op.
    async fn delete(&self, session_id: Uuid, kind: &RequirementKind) -> Result<()>;

    /// Deletes every requirement of a session.
    async fn delete_all_by_session(&self, session_id: Uuid) -> Result<()>;
}

fn conflict(session_id: Uuid, kind: &RequirementKind) -> AppError {
    AppError::Conflict(format!(
        "requirement {} already exists for session {}",
        kind, session_id
    ))
}

/// Redis-backed requirement store. Each session's requirements live in one
/// hash, field = kind, value = url.
#[derive(Clone)]
pub struct RedisRequirementStore {
    redis: ConnectionManager,
    timeout: Duration,
}

impl RedisRequirementStore {
    pub fn new(redis: ConnectionManager, timeout: Duration) -> Self {
        Self { redis, timeout }
    }

    /// The hash holding a session's requirements.
    pub fn key(session_id: Uuid) -> String {
        format!("capport:requirements:{}", session_id)
    }
}

#[async_trait]
impl RequirementStore for RedisRequirementStore {
    async fn create(&self, session_id: Uuid, kind: RequirementKind, url: String) -> Result<Requirement> {
        let mut redis = self.redis.clone();
        let key = Self::key(session_id);
        let created: bool = with_timeout(self.timeout, async {
            redis
                .hset_nx(&key, kind.as_str(), &url)
                .await
                .map_err(AppError::from)
        })
        .await?;

        if !created {
            return Err(conflict(session_id, &kind));
        }

        tracing::debug!("Requirement {} created for session {}", kind, session_id);
        Ok(Requirement { session_id, kind, url })
    }

    async fn load(&self, session_id: Uuid, kind: &RequirementKind) -> Result<Option<Requirement>> {
        let mut redis = self.redis.clone();
        let key = Self::key(session_id);
        let url: Option<String> = with_timeout(self.timeout, async {
            redis.hget(&key, kind.as_str()).await.map_err(AppError::from)
        })
        .await?;

        Ok(url.map(|url| Requirement {
            session_id,
            kind: kind.clone(),
            url,
        }))
    }

    async fn list_by_session(&self, session_id: Uuid) -> Result<Vec<Requirement>> {
        let mut redis = self.redis.clone();
        let key = Self::key(session_id);
        let fields: HashMap<String, String> = with_timeout(self.timeout, async {
            redis.hgetall(&key).await.map_err(AppError::from)
        })
        .await?;

        let mut requirements: Vec<Requirement> = fields
            .into_iter()
            .map(|(kind, url)| Requirement {
                session_id,
                kind: RequirementKind::from(kind.as_str()),
                url,
            })
            .collect();
        requirements.sort_by(|a, b| a.kind.cmp(&b.kind));
        Ok(requirements)
    }

    async fn delete(&self, session_id: Uuid, kind: &RequirementKind) -> Result<()> {
        let mut redis = self.redis.clone();
        let key = Self::key(session_id);
        let removed: i64 = with_timeout(self.timeout, async {
            redis.hdel(&key, kind.as_str()).await.map_err(AppError::from)
        })
        .await?;

        if removed == 0 {
            tracing::debug!("Requirement {} already gone for session {}", kind, session_id);
        }
        Ok(())
    }

    async fn delete_all_by_session(&self, session_id: Uuid) -> Result<()> {
        let mut redis = self.redis.clone();
        let key = Self::key(session_id);
        with_timeout(self.timeout, async {
            redis.del::<_, ()>(&key).await.map_err(AppError::from)
        })
        .await
    }
}

/// In-process requirement store.
#[derive(Clone, Default)]
pub struct MemoryRequirementStore {
    records: Arc<RwLock<HashMap<Uuid, BTreeMap<RequirementKind, String>>>>,
}

impl MemoryRequirementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequirementStore for MemoryRequirementStore {
    async fn create(&self, session_id: Uuid, kind: RequirementKind, url: String) -> Result<Requirement> {
        let mut records = self.records.write().await;
        let by_kind = records.entry(session_id).or_default();
        if by_kind.contains_key(&kind) {
            return Err(conflict(session_id, &kind));
        }
        by_kind.insert(kind.clone(), url.clone());
        Ok(Requirement { session_id, kind, url })
    }

    async fn load(&self, session_id: Uuid, kind: &RequirementKind) -> Result<Option<Requirement>> {
        let records = self.records.read().await;
        Ok(records
            .get(&session_id)
            .and_then(|by_kind| by_kind.get(kind))
            .map(|url| Requirement {
                session_id,
                kind: kind.clone(),
                url: url.clone(),
            }))
    }

    async fn list_by_session(&self, session_id: Uuid) -> Result<Vec<Requirement>> {
        let records = self.records.read().await;
        Ok(records
            .get(&session_id)
            .map(|by_kind| {
                by_kind
                    .iter()
                    .map(|(kind, url)| Requirement {
                        session_id,
                        kind: kind.clone(),
                        url: url.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, session_id: Uuid, kind: &RequirementKind) -> Result<()> {
        let mut records = self.records.write().await;
        if let Some(by_kind) = records.get_mut(&session_id) {
            by_kind.remove(kind);
            if by_kind.is_empty() {
                records.remove(&session_id);
            }
        }
        Ok(())
    }

    async fn delete_all_by_session(&self, session_id: Uuid) -> Result<()> {
        self.records.write().await.remove(&session_id);
        Ok(())
    }
}
