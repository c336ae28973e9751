use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use partition_relay::{Backoff, PipelineConfig, RetryPolicy};

/// Settle delay used for Kafka when `TOPIC_SETTLE_MS` is unset, giving the
/// cluster time to propagate topic metadata.
const KAFKA_TOPIC_SETTLE_MS: u64 = 2_000;

/// Which broker adapter the pipeline runs against.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    /// In-process broker; nothing leaves the process.
    Memory,
    /// Kafka cluster at `BROKER_ADDR`. Requires the `kafka` feature.
    Kafka,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Runtime configuration for the `partition-relay` binary.
///
/// All values are parsed from CLI arguments or environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "partition-relay",
    version,
    about = "Balances generated work across the partitions of a broker topic and reads it back"
)]
pub struct CliArgs {
    /// Broker adapter to use.
    ///
    /// Environment variable: `BROKER`
    #[arg(long, env = "BROKER", value_enum, default_value_t = BrokerKind::Memory)]
    pub broker: BrokerKind,

    /// Bootstrap address of the broker. Ignored by the in-process broker.
    ///
    /// Environment variable: `BROKER_ADDR`
    #[arg(long, env = "BROKER_ADDR", default_value_t = String::from("localhost:9092"))]
    pub broker_addr: String,

    /// Topic that is recreated on startup, then published to and read back.
    ///
    /// Environment variable: `TOPIC`
    #[arg(long, env = "TOPIC", default_value_t = String::from("my-topic"))]
    pub topic: String,

    /// Number of partitions. One dispatcher and one reader run per partition.
    ///
    /// Environment variable: `PARTITIONS`
    #[arg(long, env = "PARTITIONS", default_value_t = 2)]
    pub partitions: u32,

    /// Replication factor requested when creating the topic.
    ///
    /// Environment variable: `REPLICATION_FACTOR`
    #[arg(long, env = "REPLICATION_FACTOR", default_value_t = 1)]
    pub replication_factor: u16,

    /// Number of producer tasks.
    ///
    /// Environment variable: `PRODUCERS`
    #[arg(long, env = "PRODUCERS", default_value_t = 2)]
    pub producers: u32,

    /// Pause between two items of the same producer, in milliseconds.
    ///
    /// Environment variable: `TICK_INTERVAL_MS`
    #[arg(long, env = "TICK_INTERVAL_MS", default_value_t = 1_000)]
    pub tick_interval_ms: u64,

    /// Pause after deleting and after creating the topic, in milliseconds.
    ///
    /// Defaults to 0 for the in-process broker and 2000 for Kafka.
    ///
    /// Environment variable: `TOPIC_SETTLE_MS`
    #[arg(long, env = "TOPIC_SETTLE_MS")]
    pub topic_settle_ms: Option<u64>,

    /// Retries per failed publish before the item is dropped.
    ///
    /// Environment variable: `PUBLISH_RETRIES`
    #[arg(long, env = "PUBLISH_RETRIES", default_value_t = 0)]
    pub publish_retries: u32,

    /// Delay before the first publish retry, in milliseconds. Doubles per
    /// attempt.
    ///
    /// Environment variable: `RETRY_BACKOFF_MS`
    #[arg(long, env = "RETRY_BACKOFF_MS", default_value_t = 100)]
    pub retry_backoff_ms: u64,

    /// Upper bound for both publish retry and consume backoff, in
    /// milliseconds.
    ///
    /// Environment variable: `MAX_BACKOFF_MS`
    #[arg(long, env = "MAX_BACKOFF_MS", default_value_t = 5_000)]
    pub max_backoff_ms: u64,

    /// Delay after the first consecutive consume error, in milliseconds.
    /// Doubles per consecutive error. `0` retries immediately.
    ///
    /// Environment variable: `CONSUME_BACKOFF_MS`
    #[arg(long, env = "CONSUME_BACKOFF_MS", default_value_t = 0)]
    pub consume_backoff_ms: u64,

    /// Log output format.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub broker: BrokerKind,
    pub broker_addr: String,
    pub log_format: LogFormat,
    pub pipeline: PipelineConfig,
}

impl TryFrom<CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.partitions == 0 {
            bail!("PARTITIONS must be greater than 0");
        }
        if args.producers == 0 {
            bail!("PRODUCERS must be greater than 0");
        }
        if args.replication_factor == 0 {
            bail!("REPLICATION_FACTOR must be greater than 0");
        }
        if args.topic.trim().is_empty() {
            bail!("TOPIC must not be empty");
        }
        if args.tick_interval_ms == 0 {
            bail!("TICK_INTERVAL_MS must be greater than 0");
        }
        if args.broker == BrokerKind::Kafka && args.broker_addr.trim().is_empty() {
            bail!("BROKER_ADDR must be set when BROKER=kafka");
        }
        if args.max_backoff_ms < args.retry_backoff_ms || args.max_backoff_ms < args.consume_backoff_ms {
            bail!(
                "MAX_BACKOFF_MS ({}) must not be smaller than RETRY_BACKOFF_MS ({}) or CONSUME_BACKOFF_MS ({})",
                args.max_backoff_ms,
                args.retry_backoff_ms,
                args.consume_backoff_ms
            );
        }

        let settle_ms = args.topic_settle_ms.unwrap_or(match args.broker {
            BrokerKind::Memory => 0,
            BrokerKind::Kafka => KAFKA_TOPIC_SETTLE_MS,
        });
        let max_backoff = Duration::from_millis(args.max_backoff_ms);

        let publish_retry = if args.publish_retries == 0 {
            RetryPolicy::none()
        } else {
            RetryPolicy::new(
                args.publish_retries,
                Backoff::new(Duration::from_millis(args.retry_backoff_ms), max_backoff),
            )
        };
        let consume_backoff = if args.consume_backoff_ms == 0 {
            Backoff::none()
        } else {
            Backoff::new(Duration::from_millis(args.consume_backoff_ms), max_backoff)
        };

        let pipeline = PipelineConfig {
            topic: args.topic,
            partition_count: args.partitions,
            replication_factor: args.replication_factor,
            producer_count: args.producers,
            tick_interval: Duration::from_millis(args.tick_interval_ms),
            topic_settle: Duration::from_millis(settle_ms),
            publish_retry,
            consume_backoff,
        };
        pipeline.validate()?;

        Ok(Self {
            broker: args.broker,
            broker_addr: args.broker_addr,
            log_format: args.log_format,
            pipeline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(core::iter::once("partition-relay").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_the_baseline_pipeline() {
        let config = RunConfig::try_from(parse(&[])).unwrap();
        assert_eq!(config.broker, BrokerKind::Memory);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn kafka_gets_a_settle_delay_unless_overridden() {
        let config = RunConfig::try_from(parse(&["--broker", "kafka"])).unwrap();
        assert_eq!(config.pipeline.topic_settle, Duration::from_secs(2));

        let config =
            RunConfig::try_from(parse(&["--broker", "kafka", "--topic-settle-ms", "250"])).unwrap();
        assert_eq!(config.pipeline.topic_settle, Duration::from_millis(250));
    }

    #[test]
    fn retries_and_backoff_are_wired_through() {
        let config = RunConfig::try_from(parse(&[
            "--publish-retries",
            "3",
            "--retry-backoff-ms",
            "50",
            "--max-backoff-ms",
            "400",
            "--consume-backoff-ms",
            "20",
        ]))
        .unwrap();

        let retry = config.pipeline.publish_retry;
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.backoff.delay(0), Duration::from_millis(50));
        assert_eq!(retry.backoff.delay(10), Duration::from_millis(400));
        assert_eq!(config.pipeline.consume_backoff.delay(1), Duration::from_millis(40));
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert!(RunConfig::try_from(parse(&["--partitions", "0"])).is_err());
        assert!(RunConfig::try_from(parse(&["--producers", "0"])).is_err());
        assert!(RunConfig::try_from(parse(&["--replication-factor", "0"])).is_err());
        assert!(RunConfig::try_from(parse(&["--tick-interval-ms", "0"])).is_err());
    }

    #[test]
    fn backoff_bound_must_cover_initial_delays() {
        let err = RunConfig::try_from(parse(&["--retry-backoff-ms", "900", "--max-backoff-ms", "100"]))
            .unwrap_err();
        assert!(err.to_string().contains("MAX_BACKOFF_MS"));
    }

    #[test]
    fn unknown_broker_is_a_parse_error() {
        let parsed = CliArgs::try_parse_from(["partition-relay", "--broker", "nats"]);
        assert!(parsed.is_err());
    }
}
