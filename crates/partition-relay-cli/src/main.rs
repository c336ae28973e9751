#![doc = include_str!("../README.md")]

mod app;

use app::config::{BrokerKind, CliArgs, RunConfig};
use app::signal::cancel_on_shutdown;
use app::telemetry::init_tracing;
use clap::Parser;
use partition_relay::{Orchestrator, PipelineReport, broker::BrokerPort, broker::MemoryBroker};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = RunConfig::try_from(args)?;

    init_tracing(config.log_format)?;
    log_startup_info(&config);

    let token = CancellationToken::new();
    let signals = tokio::spawn(cancel_on_shutdown(token.clone()));

    let broker_kind = config.broker;
    let result = match broker_kind {
        BrokerKind::Memory => run(config, Arc::new(MemoryBroker::new()), token.clone()).await,
        #[cfg(feature = "kafka")]
        BrokerKind::Kafka => {
            let broker = partition_relay::broker::KafkaBroker::new(config.broker_addr.clone());
            run(config, Arc::new(broker), token.clone()).await
        }
        #[cfg(not(feature = "kafka"))]
        BrokerKind::Kafka => {
            anyhow::bail!("BROKER=kafka requires building with the `kafka` feature");
        }
    };

    // Release the signal task if the pipeline stopped on its own.
    token.cancel();
    let _ = signals.await;

    let report = result?;
    log_summary(&report);
    tracing::info!("Relay shut down successfully");
    Ok(())
}

async fn run<B: BrokerPort>(
    config: RunConfig,
    broker: Arc<B>,
    token: CancellationToken,
) -> anyhow::Result<PipelineReport> {
    let orchestrator = Orchestrator::new(config.pipeline, broker)?;
    Ok(orchestrator.run(token).await?)
}

fn log_startup_info(config: &RunConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting relay with full config: {:#?}", config);
    } else {
        tracing::info!(
            broker = ?config.broker,
            topic = %config.pipeline.topic,
            partitions = config.pipeline.partition_count,
            producers = config.pipeline.producer_count,
            "Starting relay"
        );
    }
}

fn log_summary(report: &PipelineReport) {
    for producer in &report.producers {
        tracing::info!(
            producer_id = producer.producer_id,
            handed_off = producer.handed_off,
            dropped = producer.dropped,
            "Producer summary"
        );
    }
    for dispatcher in &report.dispatchers {
        tracing::info!(
            partition = dispatcher.partition,
            published = dispatcher.published,
            failed = dispatcher.failed,
            attempts_failed = dispatcher.attempts_failed,
            "Dispatcher summary"
        );
    }
    for reader in &report.readers {
        tracing::info!(
            partition = reader.partition,
            records = reader.records,
            errors = reader.errors,
            subscriptions = reader.subscriptions,
            "Reader summary"
        );
    }
    tracing::info!(
        published = report.published(),
        failed = report.failed(),
        consumed = report.consumed(),
        consume_errors = report.consume_errors(),
        "Run summary"
    );
}
