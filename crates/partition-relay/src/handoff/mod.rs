//! Zero-capacity handoff between producers and dispatchers.
//!
//! [`HandoffQueue`] is a rendezvous channel: an [`offer`](HandoffQueue::offer)
//! completes only once a concurrently waiting [`take`](HandoffQueue::take) has
//! accepted the item. Nothing is ever buffered inside the queue, so producers
//! stall instead of piling up work when every dispatcher is busy.
//!
//! ## Mechanism
//!
//! A taker announces readiness by pushing a fresh [`oneshot::Sender`] (a
//! *slot*) onto the ready list, then waits on the matching receiver. An offerer
//! pops the oldest slot and moves its item into it. If the slot's taker has
//! already given up (its receiver is gone) the send fails, the item comes back
//! and the offerer moves on to the next slot. At most one slot per waiting
//! taker exists, so the ready list is bounded by the number of takers.
//!
//! Offerers are serialized on the ready list through a FIFO
//! [`tokio::sync::Mutex`], so the first producer to arrive is the first one to
//! be matched. Which taker receives a given item is first-come, not
//! round-robin.
//!
//! Both operations race their wait against a [`CancellationToken`] in a single
//! `select!`, with cancellation polled first.

use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests;

type Slot<T> = oneshot::Sender<T>;

/// Multi-producer, multi-consumer rendezvous channel.
///
/// Cloning the queue yields another handle to the same rendezvous point.
pub struct HandoffQueue<T> {
    ready_tx: mpsc::UnboundedSender<Slot<T>>,
    ready_rx: Arc<Mutex<mpsc::UnboundedReceiver<Slot<T>>>>,
}

impl<T> Clone for HandoffQueue<T> {
    fn clone(&self) -> Self {
        Self {
            ready_tx: self.ready_tx.clone(),
            ready_rx: Arc::clone(&self.ready_rx),
        }
    }
}

impl<T> Default for HandoffQueue<T>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandoffQueue<T>
where
    T: Send + 'static,
{
    pub fn new() -> Self {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        Self {
            ready_tx,
            ready_rx: Arc::new(Mutex::new(ready_rx)),
        }
    }

    /// Hands `item` to exactly one waiting taker.
    ///
    /// Suspends until a taker is ready to receive. The item is dropped if the
    /// token is cancelled first.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `token` fires before a taker accepts the item.
    /// - [`Error::ChannelError`] if the ready list was closed.
    pub async fn offer(&self, item: T, token: &CancellationToken) -> Result<()> {
        let mut ready = tokio::select! {
            biased;
            () = token.cancelled() => return Err(Error::Cancelled),
            guard = self.ready_rx.lock() => guard,
        };

        let mut item = item;
        loop {
            let slot = tokio::select! {
                biased;
                () = token.cancelled() => return Err(Error::Cancelled),
                slot = ready.recv() => slot,
            };
            let Some(slot) = slot else {
                return Err(Error::ChannelError {
                    context: String::from("handoff ready list closed"),
                });
            };

            match slot.send(item) {
                Ok(()) => return Ok(()),
                // The taker stopped waiting before we reached its slot.
                Err(returned) => item = returned,
            }
        }
    }

    /// Waits for the next item offered by any producer.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `token` fires before an item arrives. An item
    ///   that lands in the slot at that same instant is discarded.
    /// - [`Error::ChannelError`] if the queue was torn down underneath the
    ///   taker.
    pub async fn take(&self, token: &CancellationToken) -> Result<T> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (slot, mut rx) = oneshot::channel();
        self.ready_tx.send(slot).map_err(|_| Error::ChannelError {
            context: String::from("handoff ready list closed"),
        })?;

        tokio::select! {
            biased;
            () = token.cancelled() => {
                rx.close();
                if rx.try_recv().is_ok() {
                    tracing::debug!("Discarding item handed off during shutdown");
                }
                Err(Error::Cancelled)
            }
            item = &mut rx => item.map_err(|_| Error::ChannelError {
                context: String::from("handoff slot dropped without an item"),
            }),
        }
    }
}
