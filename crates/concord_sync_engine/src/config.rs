//! Configuration for the sync engine.

use concord_scheduler::BackoffPolicy;
use std::time::Duration;

/// Configuration for a [`crate::SyncEngine`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long an entity lookup waits for the entity to be registered.
    pub lookup_timeout: Duration,
    /// Retry policy for the registration-time full sync.
    pub sync_retry: BackoffPolicy,
}

impl SyncConfig {
    /// Creates a configuration with the given lookup timeout.
    pub fn new(lookup_timeout: Duration) -> Self {
        Self {
            lookup_timeout,
            sync_retry: BackoffPolicy::default(),
        }
    }

    /// Sets the lookup timeout.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Sets the registration sync retry policy.
    pub fn with_sync_retry(mut self, retry: BackoffPolicy) -> Self {
        self.sync_retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::default()
            .with_lookup_timeout(Duration::from_millis(250))
            .with_sync_retry(BackoffPolicy::no_retry());

        assert_eq!(config.lookup_timeout, Duration::from_millis(250));
        assert_eq!(config.sync_retry.max_attempts, 1);
    }

    #[test]
    fn default_timeout() {
        assert_eq!(SyncConfig::default().lookup_timeout, Duration::from_secs(10));
        assert_eq!(SyncConfig::default().sync_retry.max_attempts, 3);
    }
}
