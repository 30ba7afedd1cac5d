//! Configuration for the scheduler.

use std::time::Duration;

/// Configuration for a [`crate::PersistentScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of buffered units that releases a batch immediately.
    pub max_batch_size: usize,
    /// Time after the first buffered unit at which a batch is released.
    pub buffer_period: Duration,
    /// Optional cap on units running at once across all batches.
    ///
    /// `None` means batches fan out without a global limit.
    pub max_in_flight: Option<usize>,
    /// Capacity of the scheduler lane's command channel.
    pub command_capacity: usize,
}

impl SchedulerConfig {
    /// Creates a configuration with the given batching window.
    pub fn new(max_batch_size: usize, buffer_period: Duration) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            buffer_period,
            ..Self::default()
        }
    }

    /// Sets the batch size threshold.
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    /// Sets the buffering window.
    pub fn with_buffer_period(mut self, period: Duration) -> Self {
        self.buffer_period = period;
        self
    }

    /// Caps the number of units executing at once.
    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = Some(limit.max(1));
        self
    }

    /// Sets the lane's command channel capacity.
    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            buffer_period: Duration::from_secs(3),
            max_in_flight: None,
            command_capacity: 256,
        }
    }
}
