//! N:M balancing between producers and dispatchers.
//!
//! The [`Balancer`] owns one [`HandoffQueue`] and the full set of producer and
//! dispatcher tasks that share it. Producer count and partition count are
//! independent; the zero-capacity queue is the only throttle between them.

use super::{
    dispatcher::{Dispatcher, DispatcherStats},
    join_task,
    producer::{Producer, ProducerStats},
};
use crate::{
    Result, WorkItem,
    broker::BrokerPort,
    config::RetryPolicy,
    handoff::HandoffQueue,
};
use core::time::Duration;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of one balancer generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalancerReport {
    /// Producer tallies, ordered by producer id.
    pub producers: Vec<ProducerStats>,
    /// Dispatcher tallies, ordered by partition.
    pub dispatchers: Vec<DispatcherStats>,
}

impl BalancerReport {
    pub fn published(&self) -> u64 {
        self.dispatchers.iter().map(|d| d.published).sum()
    }

    pub fn failed(&self) -> u64 {
        self.dispatchers.iter().map(|d| d.failed).sum()
    }

    pub fn handed_off(&self) -> u64 {
        self.producers.iter().map(|p| p.handed_off).sum()
    }
}

/// Spawns and joins producers and dispatchers under one cancellation scope.
pub struct Balancer<B> {
    broker: Arc<B>,
    topic: Arc<str>,
    producer_count: u32,
    partition_count: u32,
    tick_interval: Duration,
    retry: RetryPolicy,
}

impl<B: BrokerPort> Balancer<B> {
    pub const fn new(
        broker: Arc<B>,
        topic: Arc<str>,
        producer_count: u32,
        partition_count: u32,
        tick_interval: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            broker,
            topic,
            producer_count,
            partition_count,
            tick_interval,
            retry,
        }
    }

    /// Runs producers `1..=producer_count` and dispatchers
    /// `0..partition_count` until `token` is cancelled and every one of them
    /// has exited.
    ///
    /// # Errors
    ///
    /// - Any error from opening a dispatcher's publisher. Nothing is spawned
    ///   in that case.
    /// - [`Error::TaskFailed`](crate::Error::TaskFailed) if a task panicked.
    ///   Reported only after all tasks have been joined.
    pub async fn start(&self, token: CancellationToken) -> Result<BalancerReport> {
        // Open every connection up front so a broken broker fails the whole
        // generation rather than a subset of partitions.
        let publishers = (0..self.partition_count)
            .map(|partition| self.broker.publisher().map(|p| (partition, p)))
            .collect::<Result<Vec<_>>>()?;

        let queue = HandoffQueue::<WorkItem>::new();

        let producers: Vec<_> = (1..=self.producer_count)
            .map(|producer_id| {
                let producer = Producer::new(producer_id, self.tick_interval);
                tokio::spawn(producer.run(queue.clone(), token.clone()))
            })
            .collect();

        let dispatchers: Vec<_> = publishers
            .into_iter()
            .map(|(partition, publisher)| {
                let dispatcher =
                    Dispatcher::new(partition, Arc::clone(&self.topic), publisher, self.retry);
                tokio::spawn(dispatcher.run(queue.clone(), token.clone()))
            })
            .collect();

        tracing::info!(
            producers = self.producer_count,
            dispatchers = self.partition_count,
            "Balancer started"
        );

        let (producers, dispatchers) = futures::future::join(
            futures::future::join_all(
                producers
                    .into_iter()
                    .zip(1..)
                    .map(|(handle, id)| join_task(format!("producer-{id}"), handle)),
            ),
            futures::future::join_all(
                dispatchers
                    .into_iter()
                    .zip(0..)
                    .map(|(handle, partition)| join_task(format!("dispatcher-{partition}"), handle)),
            ),
        )
        .await;

        let producers = producers.into_iter().collect::<Result<Vec<_>>>();
        let dispatchers = dispatchers.into_iter().collect::<Result<Vec<_>>>();

        tracing::info!("Balancer stopped");

        Ok(BalancerReport {
            producers: producers?,
            dispatchers: dispatchers?,
        })
    }
}
