//! # Latest-Value Channel
//!
//! A single-slot channel for observers that only care about the newest
//! value. Publishing never blocks: if the slot is still full, the stale value
//! is evicted and replaced. A slow reader therefore sees fewer updates,
//! never old ones.
//!
//! There is one slot per channel, not one per reader. Cloned
//! [`Subscriber`]s compete for the same values, so each channel is meant for
//! a single consumer.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

/// Creates a connected publisher/subscriber pair.
pub fn latest<T>() -> (Publisher<T>, Subscriber<T>) {
    let (tx, rx) = bounded(1);
    (
        Publisher {
            tx,
            evict: rx.clone(),
        },
        Subscriber { rx },
    )
}

/// Sending half of a [`latest`] channel.
#[derive(Debug)]
pub struct Publisher<T> {
    tx: Sender<T>,
    evict: Receiver<T>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            evict: self.evict.clone(),
        }
    }
}

impl<T> Publisher<T> {
    /// Replaces whatever value is waiting with `value`.
    pub fn publish(&self, mut value: T) {
        loop {
            match self.tx.try_send(value) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(rejected)) => {
                    // The reader may take the slot first; either way the
                    // next attempt finds room.
                    let _ = self.evict.try_recv();
                    value = rejected;
                }
            }
        }
    }
}

/// Receiving half of a [`latest`] channel.
///
/// Clones share the channel's single slot: a value taken through one clone is
/// gone for all of them.
#[derive(Debug, Clone)]
pub struct Subscriber<T> {
    rx: Receiver<T>,
}

impl<T> Subscriber<T> {
    /// Takes the newest unread value without waiting.
    pub fn try_latest(&self) -> Option<T> {
        self.rx.try_iter().last()
    }

    /// Waits up to `timeout` for an unread value.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Some(value),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}
