use crate::{
    WorkItem,
    broker::{BrokerPort, Record},
    config::Backoff,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A record consumed by a reader, tagged with its partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedRecord {
    pub partition: u32,
    pub record: Record,
}

impl ConsumedRecord {
    /// Decodes the relay's key/value format, if the record follows it.
    pub fn work_item(&self) -> Option<WorkItem> {
        WorkItem::parse(&self.record.key, &self.record.value)
    }
}

/// Final tally of a reader task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    pub partition: u32,
    pub records: u64,
    pub errors: u64,
    /// Number of subscriptions opened, including the first one.
    pub subscriptions: u64,
}

/// Consumes one partition for the lifetime of the pipeline.
///
/// Each reader owns its subscription; readers are independent of the
/// producer/dispatcher side and of each other.
pub struct Reader<B> {
    partition: u32,
    topic: Arc<str>,
    broker: Arc<B>,
    backoff: Backoff,
}

impl<B: BrokerPort> Reader<B> {
    pub const fn new(partition: u32, topic: Arc<str>, broker: Arc<B>, backoff: Backoff) -> Self {
        Self {
            partition,
            topic,
            broker,
            backoff,
        }
    }

    /// Reports every record of the partition until `token` is cancelled.
    ///
    /// Records are logged and, if `observer` is given, forwarded to it. A
    /// dropped observer is ignored from then on.
    ///
    /// Errors while the token is live are transient: they are logged, the
    /// reader waits per its [`Backoff`] and reads again. An error that
    /// surfaces once the token is cancelled is treated as shutdown. A
    /// subscription that ends or cannot be opened is reopened.
    pub async fn run(
        self,
        token: CancellationToken,
        mut observer: Option<mpsc::Sender<ConsumedRecord>>,
    ) -> ReaderStats {
        let mut stats = ReaderStats {
            partition: self.partition,
            records: 0,
            errors: 0,
            subscriptions: 0,
        };
        let mut consecutive_errors = 0_u32;

        tracing::info!(partition = self.partition, topic = %self.topic, "Reader starting");

        'subscribe: while !token.is_cancelled() {
            let mut stream = match self.broker.consume(&self.topic, self.partition) {
                Ok(stream) => {
                    stats.subscriptions += 1;
                    stream
                }
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(partition = self.partition, error = %e, "Subscription failed");
                    if !self.pause(consecutive_errors, &token).await {
                        break;
                    }
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    continue;
                }
            };

            loop {
                let next = tokio::select! {
                    biased;
                    () = token.cancelled() => break 'subscribe,
                    next = stream.next() => next,
                };

                match next {
                    Some(Ok(record)) => {
                        consecutive_errors = 0;
                        stats.records += 1;
                        tracing::info!(
                            partition = self.partition,
                            key = %String::from_utf8_lossy(&record.key),
                            value = %String::from_utf8_lossy(&record.value),
                            offset = record.offset,
                            "Consumed"
                        );
                        let consumed = ConsumedRecord {
                            partition: self.partition,
                            record,
                        };
                        if !forward(&mut observer, consumed, &token).await {
                            break 'subscribe;
                        }
                    }
                    Some(Err(e)) => {
                        if token.is_cancelled() {
                            break 'subscribe;
                        }
                        stats.errors += 1;
                        tracing::warn!(partition = self.partition, error = %e, "Consume failed");
                        if !self.pause(consecutive_errors, &token).await {
                            break 'subscribe;
                        }
                        consecutive_errors = consecutive_errors.saturating_add(1);
                    }
                    None => {
                        tracing::warn!(partition = self.partition, "Subscription ended, reopening");
                        if !self.pause(consecutive_errors, &token).await {
                            break 'subscribe;
                        }
                        consecutive_errors = consecutive_errors.saturating_add(1);
                        continue 'subscribe;
                    }
                }
            }
        }

        tracing::info!(
            partition = self.partition,
            records = stats.records,
            errors = stats.errors,
            "Reader stopped"
        );
        stats
    }

    /// Waits out the backoff for `attempt`. Returns `false` if cancelled.
    ///
    /// A zero delay still yields once, since opening a subscription never
    /// suspends on its own.
    async fn pause(&self, attempt: u32, token: &CancellationToken) -> bool {
        let delay = self.backoff.delay(attempt);
        if delay.is_zero() {
            return tokio::select! {
                biased;
                () = token.cancelled() => false,
                () = tokio::task::yield_now() => !token.is_cancelled(),
            };
        }
        tokio::select! {
            biased;
            () = token.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

/// Hands a record to the observer. Returns `false` if cancelled while waiting.
async fn forward(
    observer: &mut Option<mpsc::Sender<ConsumedRecord>>,
    record: ConsumedRecord,
    token: &CancellationToken,
) -> bool {
    let Some(tx) = observer else {
        return true;
    };
    let delivered = tokio::select! {
        biased;
        () = token.cancelled() => return false,
        sent = tx.send(record) => sent.is_ok(),
    };
    if !delivered {
        *observer = None;
    }
    true
}
