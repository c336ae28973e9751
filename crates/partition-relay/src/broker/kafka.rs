//! Kafka adapter built on `rdkafka`.
//!
//! - Topic administration goes through a short-lived [`AdminClient`].
//! - Every [`KafkaPublisher`] owns its own [`FutureProducer`] and always sets
//!   the target partition explicitly, bypassing the client-side partitioner.
//! - Every subscription owns its own [`StreamConsumer`], manually assigned to a
//!   single partition from the beginning. There is no consumer group
//!   rebalancing between readers.

use super::{BrokerPort, Publisher, Record, RecordStream};
use crate::{Error, Result};
use bytes::Bytes;
use core::time::Duration;
use futures::StreamExt;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{Offset, TopicPartitionList};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings shared by every client this adapter creates.
#[derive(Debug, Clone)]
pub struct KafkaBroker {
    brokers: String,
}

impl KafkaBroker {
    /// `brokers` is a comma-separated `host:port` bootstrap list.
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.brokers);
        config
    }

    fn admin(&self) -> Result<AdminClient<DefaultClientContext>> {
        self.client_config().create().map_err(broker_error)
    }
}

fn broker_error(err: KafkaError) -> Error {
    Error::Broker {
        context: err.to_string(),
    }
}

fn kafka_partition(partition: u32) -> Result<i32> {
    i32::try_from(partition).map_err(|_| Error::Broker {
        context: format!("partition {partition} exceeds i32"),
    })
}

fn is_unknown_topic(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic
    )
}

impl BrokerPort for KafkaBroker {
    type Publisher = KafkaPublisher;

    async fn delete_topic(&self, topic: &str) -> Result<()> {
        let admin = self.admin()?;
        let results = admin
            .delete_topics(&[topic], &AdminOptions::new())
            .await
            .map_err(broker_error)?;

        for result in results {
            if let Err((name, code)) = result {
                if is_unknown_topic(code) {
                    return Err(Error::UnknownTopic { topic: name });
                }
                return Err(Error::Broker {
                    context: format!("delete {name}: {code}"),
                });
            }
        }
        Ok(())
    }

    async fn create_topic(
        &self,
        topic: &str,
        partitions: u32,
        replication_factor: u16,
    ) -> Result<()> {
        let admin = self.admin()?;
        let new_topic = NewTopic::new(
            topic,
            kafka_partition(partitions)?,
            TopicReplication::Fixed(i32::from(replication_factor)),
        );
        let results = admin
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
            .map_err(broker_error)?;

        for result in results {
            if let Err((name, code)) = result {
                if code == RDKafkaErrorCode::TopicAlreadyExists {
                    return Err(Error::TopicExists { topic: name });
                }
                return Err(Error::Broker {
                    context: format!("create {name}: {code}"),
                });
            }
        }
        Ok(())
    }

    fn publisher(&self) -> Result<KafkaPublisher> {
        let producer = self
            .client_config()
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(broker_error)?;
        Ok(KafkaPublisher { producer })
    }

    fn consume(&self, topic: &str, partition: u32) -> Result<RecordStream> {
        let consumer: StreamConsumer = self
            .client_config()
            .set("group.id", format!("{topic}-reader-{partition}"))
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(broker_error)?;

        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(topic, kafka_partition(partition)?, Offset::Beginning)
            .map_err(broker_error)?;
        consumer.assign(&assignment).map_err(broker_error)?;

        let stream = futures::stream::unfold(consumer, |consumer| async move {
            let next = match consumer.recv().await {
                Ok(message) => Ok(Record {
                    key: message.key().map(Bytes::copy_from_slice).unwrap_or_default(),
                    value: message
                        .payload()
                        .map(Bytes::copy_from_slice)
                        .unwrap_or_default(),
                    offset: u64::try_from(message.offset()).unwrap_or_default(),
                }),
                Err(e) => Err(broker_error(e)),
            };
            Some((next, consumer))
        });
        Ok(stream.boxed())
    }
}

/// A dedicated producer connection.
pub struct KafkaPublisher {
    producer: FutureProducer,
}

impl core::fmt::Debug for KafkaPublisher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KafkaPublisher").finish_non_exhaustive()
    }
}

impl Publisher for KafkaPublisher {
    async fn publish(&mut self, topic: &str, partition: u32, key: Bytes, value: Bytes) -> Result<()> {
        let record = FutureRecord::to(topic)
            .partition(kafka_partition(partition)?)
            .key(key.as_ref())
            .payload(value.as_ref());
        self.producer
            .send(record, DELIVERY_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|(e, _)| broker_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_numbers_beyond_i32_are_rejected() {
        assert_eq!(kafka_partition(7), Ok(7));
        assert_eq!(kafka_partition(i32::MAX as u32), Ok(i32::MAX));
        assert!(matches!(
            kafka_partition(u32::MAX),
            Err(Error::Broker { .. })
        ));
    }
}
