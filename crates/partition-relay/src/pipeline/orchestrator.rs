use super::{
    balancer::{Balancer, BalancerReport},
    dispatcher::DispatcherStats,
    join_task,
    producer::ProducerStats,
    reader::{ConsumedRecord, Reader, ReaderStats},
};
use crate::{Error, Result, broker::BrokerPort, config::PipelineConfig};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Everything the pipeline did before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub producers: Vec<ProducerStats>,
    pub dispatchers: Vec<DispatcherStats>,
    pub readers: Vec<ReaderStats>,
}

impl PipelineReport {
    pub fn published(&self) -> u64 {
        self.dispatchers.iter().map(|d| d.published).sum()
    }

    pub fn failed(&self) -> u64 {
        self.dispatchers.iter().map(|d| d.failed).sum()
    }

    pub fn consumed(&self) -> u64 {
        self.readers.iter().map(|r| r.records).sum()
    }

    pub fn consume_errors(&self) -> u64 {
        self.readers.iter().map(|r| r.errors).sum()
    }
}

/// Wires topic setup, readers and the balancer under one cancellation scope.
pub struct Orchestrator<B> {
    config: PipelineConfig,
    broker: Arc<B>,
    observer: Option<mpsc::Sender<ConsumedRecord>>,
}

impl<B: BrokerPort> Orchestrator<B> {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` fails validation.
    pub fn new(config: PipelineConfig, broker: Arc<B>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            broker,
            observer: None,
        })
    }

    /// Forwards every consumed record to `observer`, in addition to logging it.
    #[must_use]
    pub fn with_observer(mut self, observer: mpsc::Sender<ConsumedRecord>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Recreates the topic with the configured partition count.
    ///
    /// Deletes the topic first, tolerating its absence, then creates it. The
    /// configured settle delay is observed after each step. Every step is
    /// abandoned as soon as `token` is cancelled.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `token` fires before setup completes.
    /// - [`Error::TopicSetup`] on any failure other than the topic being
    ///   absent on delete.
    #[tracing::instrument(skip_all, fields(topic = %self.config.topic))]
    pub async fn ensure_topic(&self, token: &CancellationToken) -> Result<()> {
        let topic = &self.config.topic;

        let deleted = tokio::select! {
            biased;
            () = token.cancelled() => return Err(Error::Cancelled),
            deleted = self.broker.delete_topic(topic) => deleted,
        };
        match deleted {
            Ok(()) => tracing::info!("Deleted existing topic"),
            Err(Error::UnknownTopic { .. }) => tracing::debug!("Topic not present, nothing to delete"),
            Err(e) => {
                return Err(Error::TopicSetup {
                    reason: format!("delete {topic}: {e}"),
                });
            }
        }
        self.settle(token).await?;

        let created = tokio::select! {
            biased;
            () = token.cancelled() => return Err(Error::Cancelled),
            created = self.broker.create_topic(
                topic,
                self.config.partition_count,
                self.config.replication_factor,
            ) => created,
        };
        created.map_err(|e| Error::TopicSetup {
            reason: format!("create {topic}: {e}"),
        })?;
        self.settle(token).await?;

        tracing::info!(
            partitions = self.config.partition_count,
            replication_factor = self.config.replication_factor,
            "Topic created"
        );
        Ok(())
    }

    async fn settle(&self, token: &CancellationToken) -> Result<()> {
        if self.config.topic_settle.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            () = token.cancelled() => Err(Error::Cancelled),
            () = tokio::time::sleep(self.config.topic_settle) => Ok(()),
        }
    }

    /// Runs the pipeline until `token` is cancelled and every task has exited.
    ///
    /// Topic setup happens first and is fatal on failure; cancellation during
    /// setup returns an empty report without starting any task. Readers start next,
    /// then the balancer. If the balancer cannot start, the readers are
    /// stopped before the error is returned. No task failure is allowed to
    /// stop its siblings; panics are reported once everything is joined.
    ///
    /// # Errors
    ///
    /// - [`Error::TopicSetup`] if the topic could not be recreated.
    /// - Any error from starting the balancer.
    /// - [`Error::TaskFailed`] if a task panicked.
    pub async fn run(self, token: CancellationToken) -> Result<PipelineReport> {
        tracing::info!(
            topic = %self.config.topic,
            partitions = self.config.partition_count,
            producers = self.config.producer_count,
            "Starting pipeline"
        );

        match self.ensure_topic(&token).await {
            Err(Error::Cancelled) => {
                tracing::info!("Cancelled during topic setup, nothing started");
                return Ok(PipelineReport::default());
            }
            setup => setup?,
        }

        let scope = token.child_token();
        let topic: Arc<str> = Arc::from(self.config.topic.as_str());

        let readers: Vec<_> = (0..self.config.partition_count)
            .map(|partition| {
                let reader = Reader::new(
                    partition,
                    Arc::clone(&topic),
                    Arc::clone(&self.broker),
                    self.config.consume_backoff,
                );
                tokio::spawn(reader.run(scope.clone(), self.observer.clone()))
            })
            .collect();

        let balancer = Balancer::new(
            Arc::clone(&self.broker),
            Arc::clone(&topic),
            self.config.producer_count,
            self.config.partition_count,
            self.config.tick_interval,
            self.config.publish_retry,
        );
        let balanced = balancer.start(scope.clone()).await;
        if let Err(e) = &balanced {
            tracing::error!(error = %e, "Balancer failed, stopping readers");
            scope.cancel();
        }

        let readers = futures::future::join_all(
            readers
                .into_iter()
                .zip(0..)
                .map(|(handle, partition)| join_task(format!("reader-{partition}"), handle)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>();

        let BalancerReport {
            producers,
            dispatchers,
        } = balanced?;
        let report = PipelineReport {
            producers,
            dispatchers,
            readers: readers?,
        };

        tracing::info!(
            published = report.published(),
            failed = report.failed(),
            consumed = report.consumed(),
            "Pipeline stopped"
        );
        Ok(report)
    }
}
