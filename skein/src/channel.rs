//! Bounded, cancellation-aware FIFO channel.
//!
//! [`MessageChannel`] wraps a bounded `tokio::sync::mpsc` pair behind one
//! value: senders block under back-pressure until the buffer accepts, the
//! caller's token fires, or the channel closes. [`close`](MessageChannel::close)
//! is idempotent: an atomic compare-and-swap gates a shutdown token that wakes
//! every blocked sender and receiver, so closing is safe concurrently with
//! in-flight operations.
//!
//! **Interaction**: the hub allocates one per registration as its inbox.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Channel operation error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel is closed; sends fail promptly, receives fail once drained.
    #[error("channel closed")]
    Closed,

    /// The caller's token fired while blocked.
    #[error("operation cancelled")]
    Cancelled,

    /// Non-blocking send found the buffer full.
    #[error("channel full")]
    Full,
}

/// Bounded FIFO with ctx-aware send/receive and idempotent close.
pub struct MessageChannel<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    capacity: usize,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl<T: Send> MessageChannel<T> {
    /// Creates a channel buffering up to `capacity` messages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self::with_parent(capacity, &CancellationToken::new())
    }

    /// Creates a channel whose lifetime is bounded by `owner`: when the owning
    /// token cancels, blocked operations fail as closed.
    pub fn with_parent(capacity: usize, owner: &CancellationToken) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
            closed: AtomicBool::new(false),
            shutdown: owner.child_token(),
        }
    }

    /// Blocks until the message is accepted, `token` fires, or the channel
    /// closes.
    pub async fn send(&self, token: &CancellationToken, message: T) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        tokio::select! {
            _ = token.cancelled() => Err(ChannelError::Cancelled),
            _ = self.shutdown.cancelled() => Err(ChannelError::Closed),
            permit = self.tx.reserve() => match permit {
                Ok(permit) => {
                    permit.send(message);
                    Ok(())
                }
                Err(_) => Err(ChannelError::Closed),
            },
        }
    }

    /// Non-blocking send: fails with [`ChannelError::Full`] instead of
    /// waiting for buffer space.
    pub fn try_send(&self, message: T) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::Full,
            mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
        })
    }

    /// Blocks until a message arrives, `token` fires, or the channel closes.
    ///
    /// A close with messages still buffered lets receivers drain what is
    /// already queued.
    pub async fn receive(&self, token: &CancellationToken) -> Result<T, ChannelError> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = token.cancelled() => Err(ChannelError::Cancelled),
            _ = self.shutdown.cancelled() => rx.try_recv().map_err(|_| ChannelError::Closed),
            message = rx.recv() => message.ok_or(ChannelError::Closed),
        }
    }

    /// Non-blocking receive. Returns `None` when the buffer is empty or a
    /// concurrent receiver holds the queue.
    pub fn try_receive(&self) -> Option<T> {
        match self.rx.try_lock() {
            Ok(mut rx) => rx.try_recv().ok(),
            Err(_) => None,
        }
    }

    /// Closes the channel. Only the first call performs the close; the return
    /// value reports whether this call did.
    pub fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.shutdown.cancel();
            true
        } else {
            false
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.shutdown.is_cancelled()
    }

    /// Configured buffer capacity.
    pub fn buffer_size(&self) -> usize {
        self.capacity
    }

    /// Messages currently queued (including reserved slots).
    pub fn queue_length(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}
