use crate::{
    Error, Result, WorkItem,
    broker::Publisher,
    config::RetryPolicy,
    handoff::HandoffQueue,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Final tally of a dispatcher task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherStats {
    pub partition: u32,
    /// Items acknowledged by the broker.
    pub published: u64,
    /// Items given up on after exhausting the retry policy.
    pub failed: u64,
    /// Publish calls that failed, including ones later retried successfully.
    pub attempts_failed: u64,
}

/// Publishes handed-off items to one fixed partition.
///
/// The partition binding never changes, and the dispatcher owns its publisher
/// connection exclusively.
pub struct Dispatcher<P> {
    partition: u32,
    topic: Arc<str>,
    publisher: P,
    retry: RetryPolicy,
}

impl<P: Publisher> Dispatcher<P> {
    pub const fn new(partition: u32, topic: Arc<str>, publisher: P, retry: RetryPolicy) -> Self {
        Self {
            partition,
            topic,
            publisher,
            retry,
        }
    }

    /// Takes one item at a time from `queue` and publishes it, until `token`
    /// is cancelled.
    ///
    /// Publish failures are logged and the item is dropped once the retry
    /// policy is exhausted. They never stop the loop. Items still waiting in
    /// producers at shutdown are not drained.
    pub async fn run(
        mut self,
        queue: HandoffQueue<WorkItem>,
        token: CancellationToken,
    ) -> DispatcherStats {
        let mut stats = DispatcherStats {
            partition: self.partition,
            published: 0,
            failed: 0,
            attempts_failed: 0,
        };

        tracing::debug!(partition = self.partition, "Dispatcher started");

        loop {
            let item = match queue.take(&token).await {
                Ok(item) => item,
                Err(Error::Cancelled) => break,
                Err(e) => {
                    tracing::error!(partition = self.partition, error = %e, "Handoff queue unavailable");
                    break;
                }
            };

            match self.publish(item, &token, &mut stats).await {
                Ok(()) => {
                    stats.published += 1;
                    tracing::info!(
                        partition = self.partition,
                        producer_id = item.producer_id(),
                        sequence = item.sequence(),
                        "Published"
                    );
                }
                Err(e) if token.is_cancelled() => {
                    stats.failed += 1;
                    tracing::debug!(
                        partition = self.partition,
                        producer_id = item.producer_id(),
                        sequence = item.sequence(),
                        error = %e,
                        "Publish abandoned during shutdown"
                    );
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::error!(
                        partition = self.partition,
                        producer_id = item.producer_id(),
                        sequence = item.sequence(),
                        error = %e,
                        "Publish failed"
                    );
                }
            }
        }

        tracing::debug!(partition = self.partition, "Dispatcher stopped");
        stats
    }

    /// Publishes `item`, retrying per the policy.
    ///
    /// An in-flight publish call is never interrupted; only the wait between
    /// attempts observes cancellation.
    async fn publish(
        &mut self,
        item: WorkItem,
        token: &CancellationToken,
        stats: &mut DispatcherStats,
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            let result = self
                .publisher
                .publish(&self.topic, self.partition, item.key(), item.value())
                .await;
            let err = match result {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            stats.attempts_failed += 1;

            if attempt >= self.retry.max_retries || token.is_cancelled() {
                return Err(err);
            }

            let delay = self.retry.backoff.delay(attempt);
            tracing::warn!(
                partition = self.partition,
                producer_id = item.producer_id(),
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Publish failed, retrying"
            );
            tokio::select! {
                biased;
                () = token.cancelled() => return Err(err),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
