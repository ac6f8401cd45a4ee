//! Single-slot, latest-wins mailbox between the tracker and the driver.
//!
//! Built on a `bounded(1)` channel. The publisher keeps a receiving handle of
//! its own so it can evict an unread value before storing the new one; the
//! subscriber takes values out without ever blocking. A value is handed out
//! at most once and a slow consumer never builds a backlog.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::cell::Cell;

pub use crossbeam_channel::TryRecvError;

/// Counters describing mailbox traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStats {
    /// Values written by the publisher
    pub published: u64,
    /// Values replaced before the subscriber took them
    pub overwritten: u64,
}

/// Create a connected publisher/subscriber pair.
pub fn mailbox<T: Send>() -> (Publisher<T>, Subscriber<T>) {
    let (tx, rx) = bounded(1);
    // Never carries a message; disconnects when the subscriber is dropped.
    let (hangup_tx, hangup_rx) = bounded::<()>(0);

    (
        Publisher {
            tx,
            evict: rx.clone(),
            hangup: hangup_rx,
            stats: Cell::new(MailboxStats::default()),
        },
        Subscriber {
            rx,
            _hangup: hangup_tx,
        },
    )
}

/// Writing half of the mailbox
#[derive(Debug)]
pub struct Publisher<T> {
    tx: Sender<T>,
    evict: Receiver<T>,
    hangup: Receiver<()>,
    stats: Cell<MailboxStats>,
}

impl<T> Publisher<T> {
    /// Store `value`, replacing any value the subscriber has not taken yet.
    ///
    /// Returns the displaced value, if there was one.
    pub fn publish(&self, value: T) -> Option<T> {
        let mut value = value;
        let mut displaced = None;
        loop {
            match self.tx.try_send(value) {
                Ok(()) => break,
                Err(TrySendError::Full(v)) => {
                    value = v;
                    // The subscriber may win the race for the old value; either way the slot frees up.
                    if let Ok(old) = self.evict.try_recv() {
                        displaced = Some(old);
                    }
                }
                // Unreachable while `evict` keeps the channel open.
                Err(TrySendError::Disconnected(_)) => break,
            }
        }

        let mut stats = self.stats.get();
        stats.published += 1;
        if displaced.is_some() {
            stats.overwritten += 1;
        }
        self.stats.set(stats);
        displaced
    }

    /// Whether the subscriber half has been dropped
    pub fn is_disconnected(&self) -> bool {
        matches!(self.hangup.try_recv(), Err(TryRecvError::Disconnected))
    }

    pub fn stats(&self) -> MailboxStats {
        self.stats.get()
    }
}

/// Reading half of the mailbox
#[derive(Debug)]
pub struct Subscriber<T> {
    rx: Receiver<T>,
    _hangup: Sender<()>,
}

impl<T> Subscriber<T> {
    /// Take the pending value. Never blocks.
    ///
    /// `Err(TryRecvError::Empty)` means nothing new since the last take;
    /// `Err(TryRecvError::Disconnected)` means the publisher is gone and the
    /// final value has already been taken.
    pub fn try_take(&self) -> Result<T, TryRecvError> {
        self.rx.try_recv()
    }

    /// Whether a value is waiting to be taken
    pub fn has_pending(&self) -> bool {
        !self.rx.is_empty()
    }
}
