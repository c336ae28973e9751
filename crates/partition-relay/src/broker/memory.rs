use super::{BrokerPort, Publisher, Record, RecordStream};
use crate::{Error, Result};
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// In-process partitioned broker.
///
/// Every partition is an append-only log. Subscribers are woken through a
/// [`watch`] channel carrying the partition's high-water mark, so a reader that
/// has caught up suspends until the next publish instead of polling.
///
/// Cloning yields another handle to the same broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    topics: Arc<Mutex<HashMap<String, Vec<Arc<PartitionLog>>>>>,
}

impl core::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("topics", &self.topics.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct Watermark {
    len: u64,
    open: bool,
}

struct PartitionLog {
    records: Mutex<Vec<Record>>,
    watermark: watch::Sender<Watermark>,
}

impl PartitionLog {
    fn new() -> Self {
        let (watermark, _) = watch::channel(Watermark { len: 0, open: true });
        Self {
            records: Mutex::new(Vec::new()),
            watermark,
        }
    }

    fn append(&self, key: Bytes, value: Bytes) -> Result<u64> {
        let mut records = self.records.lock();
        if !self.watermark.borrow().open {
            return Err(Error::Broker {
                context: String::from("partition closed"),
            });
        }
        let offset = records.len() as u64;
        records.push(Record { key, value, offset });
        self.watermark.send_modify(|mark| mark.len = offset + 1);
        Ok(offset)
    }

    fn get(&self, offset: u64) -> Option<Record> {
        self.records.lock().get(offset as usize).cloned()
    }

    fn close(&self) {
        let _guard = self.records.lock();
        self.watermark.send_modify(|mark| mark.open = false);
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `topic` currently exists.
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.lock().contains_key(topic)
    }

    /// Snapshot of every record stored in one partition, in offset order.
    pub fn records(&self, topic: &str, partition: u32) -> Result<Vec<Record>> {
        let log = self.partition(topic, partition)?;
        let records = log.records.lock().clone();
        Ok(records)
    }

    fn partition(&self, topic: &str, partition: u32) -> Result<Arc<PartitionLog>> {
        let topics = self.topics.lock();
        let logs = topics.get(topic).ok_or_else(|| Error::UnknownTopic {
            topic: topic.to_string(),
        })?;
        logs.get(partition as usize)
            .cloned()
            .ok_or_else(|| Error::UnknownPartition {
                topic: topic.to_string(),
                partition,
            })
    }
}

impl BrokerPort for MemoryBroker {
    type Publisher = MemoryPublisher;

    async fn delete_topic(&self, topic: &str) -> Result<()> {
        let removed = self.topics.lock().remove(topic);
        match removed {
            Some(logs) => {
                logs.iter().for_each(|log| log.close());
                Ok(())
            }
            None => Err(Error::UnknownTopic {
                topic: topic.to_string(),
            }),
        }
    }

    async fn create_topic(
        &self,
        topic: &str,
        partitions: u32,
        replication_factor: u16,
    ) -> Result<()> {
        if partitions == 0 || replication_factor == 0 {
            return Err(Error::Broker {
                context: format!(
                    "cannot create {topic} with {partitions} partitions and replication factor {replication_factor}"
                ),
            });
        }
        let mut topics = self.topics.lock();
        if topics.contains_key(topic) {
            return Err(Error::TopicExists {
                topic: topic.to_string(),
            });
        }
        let logs = (0..partitions).map(|_| Arc::new(PartitionLog::new())).collect();
        topics.insert(topic.to_string(), logs);
        Ok(())
    }

    fn publisher(&self) -> Result<MemoryPublisher> {
        Ok(MemoryPublisher {
            broker: self.clone(),
        })
    }

    fn consume(&self, topic: &str, partition: u32) -> Result<RecordStream> {
        let log = self.partition(topic, partition)?;
        let watermark = log.watermark.subscribe();
        let topic = topic.to_string();

        let state = Some(Subscription {
            log,
            watermark,
            offset: 0,
            topic,
        });
        let stream = futures::stream::unfold(state, |state| async move {
            let mut sub = state?;
            match sub.next_record().await {
                Ok(record) => Some((Ok(record), Some(sub))),
                // Terminal: the topic was deleted under the subscription.
                Err(e) => Some((Err(e), None)),
            }
        });
        Ok(stream.boxed())
    }
}

struct Subscription {
    log: Arc<PartitionLog>,
    watermark: watch::Receiver<Watermark>,
    offset: u64,
    topic: String,
}

impl Subscription {
    async fn next_record(&mut self) -> Result<Record> {
        loop {
            let mark = *self.watermark.borrow_and_update();
            if self.offset < mark.len {
                if let Some(record) = self.log.get(self.offset) {
                    self.offset += 1;
                    return Ok(record);
                }
            }
            if !mark.open {
                return Err(Error::UnknownTopic {
                    topic: self.topic.clone(),
                });
            }
            // The sender lives in `self.log`, so this only fails if the log
            // itself is gone, which the `Arc` prevents.
            if self.watermark.changed().await.is_err() {
                return Err(Error::UnknownTopic {
                    topic: self.topic.clone(),
                });
            }
        }
    }
}

/// Publisher handle for [`MemoryBroker`].
#[derive(Debug, Clone)]
pub struct MemoryPublisher {
    broker: MemoryBroker,
}

impl Publisher for MemoryPublisher {
    async fn publish(&mut self, topic: &str, partition: u32, key: Bytes, value: Bytes) -> Result<()> {
        let log = self.broker.partition(topic, partition)?;
        log.append(key, value)?;
        Ok(())
    }
}
