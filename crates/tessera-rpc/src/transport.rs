//! Byte channels between the two sides.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::trace;

use crate::error::{RpcError, RpcResult};

/// Default per-message size limit (16 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// A bidirectional, ordered message channel.
///
/// Messages sent on one end arrive at the other in send order. Delivery is
/// always deferred: `send` never runs the receiver's handling inline.
#[async_trait]
pub trait MessagePassing: Send + Sync {
    /// Queue a message for the peer.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Closed`] after `close`, or
    /// [`RpcError::MessageTooLarge`] if the transport enforces a limit.
    fn send(&self, message: Vec<u8>) -> RpcResult<()>;

    /// Wait for the next message from the peer. `None` once the peer closed.
    async fn recv(&self) -> Option<Vec<u8>>;

    /// Wait until every message sent so far has been taken by the peer.
    async fn drain(&self);

    /// Stop accepting sends. The peer sees end-of-stream after the queued
    /// messages.
    fn close(&self);
}

/// Count of work items started but not finished, with an idle signal.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub(crate) fn begin(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn complete(&self) {
        let previous = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous <= 1 {
            self.idle.notify_waiters();
        }
    }

    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// In-process transport: one half of a connected pair.
pub struct LoopbackTransport {
    outbound: std::sync::Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    sent: Arc<InFlight>,
    received: Arc<InFlight>,
    closed: AtomicBool,
    max_message_bytes: usize,
}

impl LoopbackTransport {
    /// Create two connected ends.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::pair_with_limit(DEFAULT_MAX_MESSAGE_BYTES)
    }

    /// Create two connected ends that reject messages over `limit` bytes.
    #[must_use]
    pub fn pair_with_limit(limit: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let a_to_b = Arc::new(InFlight::default());
        let b_to_a = Arc::new(InFlight::default());

        let a = Self {
            outbound: std::sync::Mutex::new(Some(a_tx)),
            inbound: Mutex::new(a_rx),
            sent: Arc::clone(&a_to_b),
            received: Arc::clone(&b_to_a),
            closed: AtomicBool::new(false),
            max_message_bytes: limit,
        };
        let b = Self {
            outbound: std::sync::Mutex::new(Some(b_tx)),
            inbound: Mutex::new(b_rx),
            sent: b_to_a,
            received: a_to_b,
            closed: AtomicBool::new(false),
            max_message_bytes: limit,
        };
        (a, b)
    }

    /// Messages sent by this end that the peer has not taken yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.sent.count.load(Ordering::Acquire)
    }

    /// True after `close`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl MessagePassing for LoopbackTransport {
    fn send(&self, message: Vec<u8>) -> RpcResult<()> {
        if message.len() > self.max_message_bytes {
            return Err(RpcError::MessageTooLarge {
                size: message.len(),
                limit: self.max_message_bytes,
            });
        }
        let guard = match self.outbound.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(sender) = guard.as_ref() else {
            return Err(RpcError::Closed);
        };
        self.sent.begin();
        let size = message.len();
        if sender.send(message).is_err() {
            self.sent.complete();
            return Err(RpcError::Closed);
        }
        trace!(bytes = size, "Loopback message queued");
        Ok(())
    }

    async fn recv(&self) -> Option<Vec<u8>> {
        let message = self.inbound.lock().await.recv().await;
        if message.is_some() {
            self.received.complete();
        }
        message
    }

    async fn drain(&self) {
        self.sent.wait_idle().await;
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let sender = match self.outbound.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);
    }
}

impl fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("in_flight", &self.in_flight())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_both_directions() {
        let (a, b) = LoopbackTransport::pair();
        for i in 0u8..5 {
            a.send(vec![i]).unwrap();
            b.send(vec![i.saturating_add(100)]).unwrap();
        }
        for i in 0u8..5 {
            assert_eq!(b.recv().await.unwrap(), vec![i]);
            assert_eq!(a.recv().await.unwrap(), vec![i.saturating_add(100)]);
        }
    }

    #[tokio::test]
    async fn drain_waits_for_peer() {
        let (a, b) = LoopbackTransport::pair();
        a.send(b"one".to_vec()).unwrap();
        a.send(b"two".to_vec()).unwrap();
        assert_eq!(a.in_flight(), 2);

        let drained = tokio::time::timeout(Duration::from_millis(50), a.drain()).await;
        assert!(drained.is_err(), "drain resolved with messages queued");

        let reader = tokio::spawn(async move {
            b.recv().await;
            b.recv().await;
            b
        });
        tokio::time::timeout(Duration::from_secs(1), a.drain())
            .await
            .unwrap();
        assert_eq!(a.in_flight(), 0);
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn drain_idle_is_immediate() {
        let (a, _b) = LoopbackTransport::pair();
        tokio::time::timeout(Duration::from_millis(50), a.drain())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn close_ends_peer_stream() {
        let (a, b) = LoopbackTransport::pair();
        a.send(b"last".to_vec()).unwrap();
        a.close();
        assert!(a.is_closed());
        assert!(matches!(a.send(vec![1]), Err(RpcError::Closed)));
        assert_eq!(b.recv().await.unwrap(), b"last");
        assert!(b.recv().await.is_none());
    }

    #[tokio::test]
    async fn size_limit() {
        let (a, _b) = LoopbackTransport::pair_with_limit(4);
        assert!(a.send(vec![0; 4]).is_ok());
        assert!(matches!(
            a.send(vec![0; 5]),
            Err(RpcError::MessageTooLarge { size: 5, limit: 4 })
        ));
    }
}
