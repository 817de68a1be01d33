use std::sync::Arc;
use crate::config::{Config, StoreBackend};
use crate::error::Result;
use crate::repositories::requirement::{
    MemoryRequirementStore, RedisRequirementStore, RequirementStore,
};
use crate::repositories::session::{MemorySessionStore, RedisSessionStore, SessionStore};
use crate::services::traffic::{LoggingTrafficEnabler, TrafficEnabler};
use crate::services::usage::{FixedUsageMeter, UsageMeter};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// Session records.
    pub sessions: Arc<dyn SessionStore>,
    /// Requirement records.
    pub requirements: Arc<dyn RequirementStore>,
    /// The usage-metering collaborator.
    pub usage: Arc<dyn UsageMeter>,
    /// The traffic-enablement collaborator.
    pub traffic: Arc<dyn TrafficEnabler>,
}

impl AppState {
    /// Creates a new `AppState` with the stores selected by the configuration
    /// and the default collaborators.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let (sessions, requirements): (Arc<dyn SessionStore>, Arc<dyn RequirementStore>) =
            match config.store {
                StoreBackend::Redis => {
                    let redis =
                        crate::db::connect_redis(&config.redis_url, config.store_timeout).await?;
                    tracing::info!("✅ Redis Connection Manager initialized");

                    let requirements: Arc<dyn RequirementStore> = Arc::new(
                        RedisRequirementStore::new(redis.clone(), config.store_timeout),
                    );
                    let sessions: Arc<dyn SessionStore> = Arc::new(RedisSessionStore::new(
                        redis,
                        requirements.clone(),
                        config.store_timeout,
                    ));
                    (sessions, requirements)
                }
                StoreBackend::Memory => {
                    tracing::warn!("Using in-memory store; sessions are lost on restart");
                    Self::memory_stores()
                }
            };

        Ok(Self::with_parts(
            config.clone(),
            sessions,
            requirements,
            Arc::new(FixedUsageMeter::default()),
            Arc::new(LoggingTrafficEnabler),
        ))
    }

    /// Assembles a state from explicit parts.
    pub fn with_parts(
        config: Config,
        sessions: Arc<dyn SessionStore>,
        requirements: Arc<dyn RequirementStore>,
        usage: Arc<dyn UsageMeter>,
        traffic: Arc<dyn TrafficEnabler>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
            requirements,
            usage,
            traffic,
        }
    }

    /// A fresh pair of in-memory stores sharing one requirement store.
    pub fn memory_stores() -> (Arc<dyn SessionStore>, Arc<dyn RequirementStore>) {
        let requirements: Arc<dyn RequirementStore> = Arc::new(MemoryRequirementStore::new());
        let sessions: Arc<dyn SessionStore> =
            Arc::new(MemorySessionStore::new(requirements.clone()));
        (sessions, requirements)
    }
}
