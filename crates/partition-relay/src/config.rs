use crate::{Error, Result};
use core::time::Duration;

/// Exponential delay between consecutive failed attempts.
///
/// The delay for attempt `n` (zero-based) is `initial * 2^n`, capped at `max`.
/// A zero `initial` disables backoff entirely, which yields a tight retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    /// No delay between attempts.
    pub const fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Returns `true` if this backoff never waits.
    pub fn is_disabled(&self) -> bool {
        self.initial.is_zero()
    }

    /// Delay to wait before retrying after `attempt` consecutive failures.
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.is_disabled() {
            return Duration::ZERO;
        }
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max.max(self.initial))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::none()
    }
}

/// Bounded retry policy for a single publish.
///
/// `max_retries = 0` publishes each item exactly once and drops it on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Backoff::none(),
        }
    }

    pub const fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }
}

/// Runtime configuration of the relay pipeline.
///
/// The partition count doubles as the number of dispatcher tasks and reader
/// tasks, since each of them is statically bound to one partition for the
/// pipeline's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Broker topic that dispatchers publish to and readers consume from.
    pub topic: String,
    /// Number of partitions, dispatchers and readers.
    pub partition_count: u32,
    /// Replication factor requested when the topic is created.
    pub replication_factor: u16,
    /// Number of producer tasks feeding the handoff queue.
    pub producer_count: u32,
    /// Pause between two consecutive offers of the same producer.
    pub tick_interval: Duration,
    /// Pause after deleting and after creating the topic, giving the broker
    /// time to propagate metadata.
    pub topic_settle: Duration,
    /// Retry policy applied by dispatchers on a failed publish.
    pub publish_retry: RetryPolicy,
    /// Backoff applied by readers between consecutive consume errors.
    pub consume_backoff: Backoff,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topic: String::from("my-topic"),
            partition_count: 2,
            replication_factor: 1,
            producer_count: 2,
            tick_interval: Duration::from_secs(1),
            topic_settle: Duration::ZERO,
            publish_retry: RetryPolicy::none(),
            consume_backoff: Backoff::none(),
        }
    }
}

impl PipelineConfig {
    /// Checks the invariants the pipeline relies on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the topic name is empty or any of the
    /// partition count, producer count or replication factor is zero.
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(invalid("topic name must not be empty"));
        }
        if self.partition_count == 0 {
            return Err(invalid("partition count must be greater than 0"));
        }
        if self.producer_count == 0 {
            return Err(invalid("producer count must be greater than 0"));
        }
        if self.replication_factor == 0 {
            return Err(invalid("replication factor must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> Error {
    Error::InvalidConfig {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(1000));
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_millis(1000));
        assert_eq!(backoff.delay(64), Duration::from_millis(1000));
    }

    #[test]
    fn disabled_backoff_never_waits() {
        assert_eq!(Backoff::none().delay(0), Duration::ZERO);
        assert_eq!(Backoff::none().delay(10), Duration::ZERO);
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(PipelineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_counts() {
        let config = PipelineConfig {
            partition_count: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));

        let config = PipelineConfig {
            producer_count: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));

        let config = PipelineConfig {
            replication_factor: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn rejects_blank_topic() {
        let config = PipelineConfig {
            topic: String::from("  "),
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));
    }
}
