use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

/// Best-effort tactile feedback; callers ignore failures.
#[async_trait]
pub trait HapticFeedback: Send + Sync {
    async fn impact(&self) -> Result<()>;
}

pub struct NoHaptics;

#[async_trait]
impl HapticFeedback for NoHaptics {
    async fn impact(&self) -> Result<()> {
        Ok(())
    }
}

/// Stands in for a vibration motor on hosts without one.
pub struct LogHaptics;

#[async_trait]
impl HapticFeedback for LogHaptics {
    async fn impact(&self) -> Result<()> {
        debug!("haptics: impact pulse");
        Ok(())
    }
}
