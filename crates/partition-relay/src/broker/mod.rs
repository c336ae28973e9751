//! The broker capability the pipeline depends on.
//!
//! The pipeline never talks to a concrete broker client. It is generic over
//! [`BrokerPort`], which covers topic administration, dedicated publisher
//! connections and single-partition subscriptions.
//!
//! ## Adapters
//!
//! - [`MemoryBroker`]: in-process partitioned log, used by default and in tests.
//! - `KafkaBroker`: `rdkafka`-backed adapter, enabled by the `kafka` feature.

use crate::Result;
use bytes::Bytes;
use futures::stream::BoxStream;

#[cfg(feature = "kafka")]
mod kafka;
mod memory;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaBroker, KafkaPublisher};
pub use memory::{MemoryBroker, MemoryPublisher};

/// A record read back from a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Bytes,
    pub value: Bytes,
    pub offset: u64,
}

/// Lazy, unbounded sequence of records from one partition.
///
/// Errors are yielded in-band; a stream that ends must be replaced by opening a
/// new subscription.
pub type RecordStream = BoxStream<'static, Result<Record>>;

/// Topic administration plus factories for publishers and subscriptions.
///
/// Each dispatcher obtains its own [`Publisher`] and each reader its own
/// [`RecordStream`], so no connection is ever shared between tasks.
pub trait BrokerPort: Send + Sync + 'static {
    type Publisher: Publisher;

    /// Deletes `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTopic`](crate::Error::UnknownTopic) if the topic
    /// does not exist, or [`Error::Broker`](crate::Error::Broker) on any other
    /// failure.
    fn delete_topic(&self, topic: &str) -> impl Future<Output = Result<()>> + Send;

    /// Creates `topic` with the given partition count and replication factor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TopicExists`](crate::Error::TopicExists) if the topic is
    /// already present, or [`Error::Broker`](crate::Error::Broker) on any other
    /// failure.
    fn create_topic(
        &self,
        topic: &str,
        partitions: u32,
        replication_factor: u16,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Opens a dedicated publishing connection.
    fn publisher(&self) -> Result<Self::Publisher>;

    /// Opens a dedicated subscription to exactly one partition, starting from
    /// its earliest record.
    fn consume(&self, topic: &str, partition: u32) -> Result<RecordStream>;
}

/// A publishing connection owned by a single dispatcher.
pub trait Publisher: Send + 'static {
    /// Publishes one record to an explicit partition and waits for the
    /// broker's acknowledgement.
    fn publish(
        &mut self,
        topic: &str,
        partition: u32,
        key: Bytes,
        value: Bytes,
    ) -> impl Future<Output = Result<()>> + Send;
}
