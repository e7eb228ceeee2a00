//! Sentinel-terminated event channel.
//!
//! Bridges one producer (the pipeline worker) and one consumer (the
//! transport). Events are delivered in push order; [`EventSender::close`]
//! enqueues a sentinel behind everything pushed so far, and the receiver
//! reports end-of-sequence once it reaches it.
//!
//! The consumer never spins: [`EventReceiver::recv`] suspends the task and
//! [`EventReceiver::blocking_recv`] parks the thread until an event or the
//! sentinel arrives.
//!
//! ```text
//! push(e1) push(e2) close()      recv → e1, recv → e2, recv → None, recv → None
//! ```

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use super::event::Event;
use crate::{HuginError, Result};

enum Slot {
    Event(Event),
    Sentinel,
}

/// Receiver-side lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Accepting events; more may arrive.
    Open,
    /// Sentinel consumed (or every sender gone); nothing more will arrive.
    Closed,
}

/// Create a connected sender/receiver pair.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = EventSender {
        tx,
        closed: Arc::new(Mutex::new(false)),
    };
    let receiver = EventReceiver {
        rx,
        state: ChannelState::Open,
    };
    (sender, receiver)
}

/// Producer half. Cloning shares the same close state.
///
/// Pushes and the sentinel are enqueued under one lock, so an accepted
/// push always lands ahead of the sentinel.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Slot>,
    closed: Arc<Mutex<bool>>,
}

impl EventSender {
    /// Append an event.
    ///
    /// Fails with [`HuginError::ChannelClosed`] after [`close`](Self::close)
    /// or once the receiver is gone.
    pub fn push(&self, event: impl Into<Event>) -> Result<()> {
        let event = event.into();
        let closed = self.lock_closed();
        if *closed {
            return Err(HuginError::ChannelClosed);
        }
        self.tx
            .send(Slot::Event(event))
            .map_err(|_| HuginError::ChannelClosed)
    }

    /// Enqueue the sentinel. Only the first call has an effect.
    ///
    /// Returns true if this call closed the channel.
    pub fn close(&self) -> bool {
        let mut closed = self.lock_closed();
        if *closed {
            return false;
        }
        *closed = true;
        // a dropped receiver needs no sentinel
        let _ = self.tx.send(Slot::Sentinel);
        true
    }

    /// Whether the sentinel has been enqueued.
    pub fn is_closed(&self) -> bool {
        *self.lock_closed()
    }

    /// Whether the receiver has been dropped or has consumed the sentinel.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the receiver is dropped or has consumed the sentinel.
    pub async fn abandoned(&self) {
        self.tx.closed().await
    }

    fn lock_closed(&self) -> MutexGuard<'_, bool> {
        // a poisoned flag is still a valid flag
        self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Consumer half.
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Slot>,
    state: ChannelState,
}

impl EventReceiver {
    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ChannelState::Closed
    }

    /// Next event, or `None` once the sentinel has been reached.
    pub async fn recv(&mut self) -> Option<Event> {
        std::future::poll_fn(|cx| self.poll_recv(cx)).await
    }

    /// Blocking variant of [`recv`](Self::recv) for consumers running on
    /// plain threads.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<Event> {
        if self.is_closed() {
            return None;
        }
        let slot = self.rx.blocking_recv();
        self.accept(slot)
    }

    /// Poll for the next event.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        if self.is_closed() {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(slot) => Poll::Ready(self.accept(slot)),
            Poll::Pending => Poll::Pending,
        }
    }

    fn accept(&mut self, slot: Option<Slot>) -> Option<Event> {
        match slot {
            Some(Slot::Event(event)) => Some(event),
            Some(Slot::Sentinel) | None => {
                self.state = ChannelState::Closed;
                // later pushes fail fast instead of queueing unseen events
                self.rx.close();
                None
            }
        }
    }
}

impl Stream for EventReceiver {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.get_mut().poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_after_close_rejected() {
        let (tx, _rx) = channel();
        assert!(tx.close());
        assert!(!tx.close());
        assert!(matches!(tx.push("late"), Err(HuginError::ChannelClosed)));
    }

    #[tokio::test]
    async fn dropped_senders_end_sequence() {
        let (tx, mut rx) = channel();
        tx.push("only").unwrap();
        drop(tx);
        assert_eq!(rx.recv().await.unwrap().as_text(), Some("only"));
        assert!(rx.recv().await.is_none());
        assert_eq!(rx.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn sender_sees_receiver_drop() {
        let (tx, rx) = channel();
        assert!(!tx.is_abandoned());
        drop(rx);
        tx.abandoned().await;
        assert!(tx.is_abandoned());
        assert!(tx.push("nobody listens").is_err());
    }
}
