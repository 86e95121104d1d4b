use crate::config::PollerConfig;
use crate::domain::model::SessionIdentity;
use crate::domain::ports::Archive;
use crate::utils::error::{CourierError, Result};
use std::time::Duration;

/// Blocks the pipeline until the archive reports the session exists, i.e. the
/// asynchronous ingestion of the submitted package has finished. Bounded: a
/// session that never appears surfaces as `ReadinessTimeout` instead of
/// polling forever.
pub struct ReadinessPoller {
    interval: Duration,
    max_attempts: u32,
}

impl ReadinessPoller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    pub fn from_config(config: &PollerConfig) -> Self {
        Self::new(Duration::from_secs(config.interval_secs), config.max_attempts)
    }

    pub async fn wait_until_ready<A: Archive>(
        &self,
        archive: &A,
        session: &SessionIdentity,
    ) -> Result<()> {
        for attempt in 1..=self.max_attempts {
            if archive.session_ready(session).await? {
                tracing::info!(
                    "Session {} archived after {} probe(s)",
                    session.experiment,
                    attempt
                );
                return Ok(());
            }

            tracing::debug!(
                "Session {} not yet archived (probe {}/{})",
                session.experiment,
                attempt,
                self.max_attempts
            );
            // No point sleeping after the last probe, the timeout is decided.
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(CourierError::ReadinessTimeout {
            attempts: self.max_attempts,
        })
    }
}
