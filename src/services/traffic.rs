use async_trait::async_trait;

use crate::error::Result;

/// Lifts the network restriction for a subscriber.
#[async_trait]
pub trait TrafficEnabler: Send + Sync {
    async fn enable(&self, identity: &str) -> Result<()>;
}

/// Records the enablement in the log. Stands in for the enforcement point
/// until one is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTrafficEnabler;

#[async_trait]
impl TrafficEnabler for LoggingTrafficEnabler {
    async fn enable(&self, identity: &str) -> Result<()> {
        tracing::info!("All requirements met, enabling traffic for {}", identity);
        Ok(())
    }
}
