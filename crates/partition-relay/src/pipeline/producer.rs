use crate::{Error, WorkItem, handoff::HandoffQueue};
use core::time::Duration;
use tokio_util::sync::CancellationToken;

/// Final tally of a producer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerStats {
    pub producer_id: u32,
    /// Items accepted by a dispatcher.
    pub handed_off: u64,
    /// Items dropped because shutdown interrupted their offer.
    pub dropped: u64,
}

/// Generates an unbounded sequence of [`WorkItem`]s at a fixed cadence.
///
/// The sequence counter is owned by the task and never shared.
#[derive(Debug, Clone, Copy)]
pub struct Producer {
    id: u32,
    tick_interval: Duration,
}

impl Producer {
    pub const fn new(id: u32, tick_interval: Duration) -> Self {
        Self { id, tick_interval }
    }

    /// Offers one item per tick until `token` is cancelled.
    ///
    /// The offer suspends until a dispatcher takes the item. The pause between
    /// offers also watches the token, so shutdown never waits out a full tick.
    pub async fn run(
        self,
        queue: HandoffQueue<WorkItem>,
        token: CancellationToken,
    ) -> ProducerStats {
        let mut stats = ProducerStats {
            producer_id: self.id,
            handed_off: 0,
            dropped: 0,
        };
        let mut sequence = 0_u64;

        tracing::debug!(producer_id = self.id, "Producer started");

        loop {
            let item = WorkItem::new(self.id, sequence);
            match queue.offer(item, &token).await {
                Ok(()) => {
                    stats.handed_off += 1;
                    tracing::trace!(producer_id = self.id, sequence, "Item handed off");
                }
                Err(Error::Cancelled) => {
                    stats.dropped += 1;
                    tracing::debug!(producer_id = self.id, sequence, "Offer interrupted by shutdown");
                    break;
                }
                Err(e) => {
                    stats.dropped += 1;
                    tracing::error!(producer_id = self.id, error = %e, "Handoff queue unavailable");
                    break;
                }
            }
            sequence += 1;

            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = tokio::time::sleep(self.tick_interval) => {}
            }
        }

        tracing::debug!(producer_id = self.id, "Producer stopped");
        stats
    }
}
