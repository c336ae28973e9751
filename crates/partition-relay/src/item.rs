use bytes::Bytes;
use core::fmt;

/// A unit of work generated by a producer.
///
/// Items are immutable and cheap to copy. Once handed off, the dispatcher that
/// receives one publishes it exactly once (fire-and-forget); no further
/// identity is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkItem {
    producer_id: u32,
    sequence: u64,
}

impl WorkItem {
    const KEY_PREFIX: &'static str = "key-";
    const VALUE_PREFIX: &'static str = "Message ";

    pub const fn new(producer_id: u32, sequence: u64) -> Self {
        Self {
            producer_id,
            sequence,
        }
    }

    /// Identity of the producer that generated this item (`>= 1`).
    pub const fn producer_id(&self) -> u32 {
        self.producer_id
    }

    /// Position of this item in its producer's output, starting at 0.
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Broker message key: `key-{producer_id}`.
    pub fn key(&self) -> Bytes {
        Bytes::from(format!("{}{}", Self::KEY_PREFIX, self.producer_id))
    }

    /// Broker message value: `Message {sequence}`.
    pub fn value(&self) -> Bytes {
        Bytes::from(format!("{}{}", Self::VALUE_PREFIX, self.sequence))
    }

    /// Recovers an item from a published key/value pair.
    ///
    /// Returns `None` if either side does not follow the relay's format.
    pub fn parse(key: &[u8], value: &[u8]) -> Option<Self> {
        let producer_id = core::str::from_utf8(key)
            .ok()?
            .strip_prefix(Self::KEY_PREFIX)?
            .parse()
            .ok()?;
        let sequence = core::str::from_utf8(value)
            .ok()?
            .strip_prefix(Self::VALUE_PREFIX)?
            .parse()
            .ok()?;
        Some(Self::new(producer_id, sequence))
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "producer {} #{}", self.producer_id, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_key_and_value() {
        let item = WorkItem::new(2, 17);
        assert_eq!(item.key(), Bytes::from_static(b"key-2"));
        assert_eq!(item.value(), Bytes::from_static(b"Message 17"));
    }

    #[test]
    fn parses_its_own_format() {
        let item = WorkItem::new(7, 123_456);
        assert_eq!(WorkItem::parse(&item.key(), &item.value()), Some(item));
    }

    #[test]
    fn rejects_foreign_records() {
        assert_eq!(WorkItem::parse(b"Key-1", b"Message 1"), None);
        assert_eq!(WorkItem::parse(b"key-1", b"Message-1"), None);
        assert_eq!(WorkItem::parse(b"key-x", b"Message 1"), None);
        assert_eq!(WorkItem::parse(&[0xff, 0xfe], b"Message 1"), None);
    }
}
