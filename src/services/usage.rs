use async_trait::async_trait;

use crate::{
    config::UsageFailurePolicy,
    error::Result,
    models::session::Session,
};

/// Reports how many bytes a subscriber has used.
#[async_trait]
pub trait UsageMeter: Send + Sync {
    async fn usage(&self, identity: &str) -> Result<u64>;
}

/// A meter that reports the same figure for everyone. Used until a real
/// accounting backend is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedUsageMeter {
    bytes: u64,
}

impl FixedUsageMeter {
    pub fn new(bytes: u64) -> Self {
        Self { bytes }
    }
}

#[async_trait]
impl UsageMeter for FixedUsageMeter {
    async fn usage(&self, _identity: &str) -> Result<u64> {
        Ok(self.bytes)
    }
}

/// Reads the session's usage, applying `policy` if the meter fails.
///
/// Failing closed reports the quota as used up, so a session with a quota is
/// not permitted. Failing open reports zero usage.
pub async fn usage_for(meter: &dyn UsageMeter, session: &Session, policy: UsageFailurePolicy) -> u64 {
    match meter.usage(&session.identity).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(
                "Usage meter failed for {} ({:?} policy applied): {}",
                session.identity,
                policy,
                e
            );
            match policy {
                UsageFailurePolicy::Closed => session.data_limit,
                UsageFailurePolicy::Open => 0,
            }
        }
    }
}
