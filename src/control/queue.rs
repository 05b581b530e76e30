//! Bounded event queue between producers and the dispatcher
//!
//! ```text
//! InputRouter ──┐
//! Gesture tasks ├──► EventQueue (512) ──► EventReceiver ──► Dispatcher
//! Vision actor ─┘
//! ```
//!
//! `push` never waits on buffer space. A full buffer or a stopped queue is
//! reported to the producer. Shutdown travels through the same channel as a
//! sentinel so it is ordered after everything pushed before it.
//!
//! Pushes share a read lock over the stopped flag and `stop` takes the write
//! lock, so a push accepted while `stop` runs always lands before the
//! sentinel.

use super::error::QueueError;
use super::intent::ControlIntent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 512;

/// Producer handle, cheap to clone
#[derive(Clone, Debug)]
pub struct EventQueue {
    sender: mpsc::Sender<Option<ControlIntent>>,
    /// Set once the sentinel is in the channel
    stopped: Arc<RwLock<bool>>,
}

/// Consumer side, owned by the dispatcher
#[derive(Debug)]
pub struct EventReceiver {
    receiver: mpsc::Receiver<Option<ControlIntent>>,
    closed: AtomicBool,
}

impl EventQueue {
    pub fn new(capacity: usize) -> (EventQueue, EventReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        debug!("Created event queue with capacity {}", capacity);
        (
            EventQueue {
                sender,
                stopped: Arc::new(RwLock::new(false)),
            },
            EventReceiver {
                receiver,
                closed: AtomicBool::new(false),
            },
        )
    }

    /// Enqueues one intent without waiting for buffer space.
    pub fn push(&self, intent: ControlIntent) -> Result<(), QueueError> {
        let stopped = self.stopped.read().unwrap_or_else(PoisonError::into_inner);
        if *stopped {
            return Err(QueueError::Stopped);
        }
        match self.sender.try_send(Some(intent)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(QueueError::Full),
            Err(TrySendError::Closed(_)) => Err(QueueError::Stopped),
        }
    }

    /// Enqueues the shutdown sentinel.
    ///
    /// Only the first successful call enqueues it; later calls report
    /// `Stopped`. If the buffer is full the queue stays open, pushes keep
    /// seeing `Full` and the caller can retry the stop.
    pub fn stop(&self) -> Result<(), QueueError> {
        let mut stopped = self.stopped.write().unwrap_or_else(PoisonError::into_inner);
        if *stopped {
            return Err(QueueError::Stopped);
        }
        match self.sender.try_send(None) {
            Ok(()) => {
                *stopped = true;
                info!("Stop requested for event queue");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!("Event queue full, stop request not accepted");
                Err(QueueError::Full)
            }
            Err(TrySendError::Closed(_)) => {
                *stopped = true;
                Err(QueueError::Stopped)
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.read().unwrap_or_else(PoisonError::into_inner) || self.sender.is_closed()
    }

    /// Number of intents currently buffered
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

impl EventReceiver {
    /// Waits for the next intent; `None` once the sentinel was dequeued or
    /// every producer is gone.
    pub async fn recv(&mut self) -> Option<ControlIntent> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        match self.receiver.recv().await {
            Some(Some(intent)) => Some(intent),
            Some(None) => {
                self.close();
                None
            }
            None => None,
        }
    }

    /// Non-waiting variant of [`recv`](Self::recv); `None` also when empty.
    pub fn try_recv(&mut self) -> Option<ControlIntent> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        match self.receiver.try_recv() {
            Ok(Some(intent)) => Some(intent),
            Ok(None) => {
                self.close();
                None
            }
            Err(_) => None,
        }
    }

    fn close(&mut self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.receiver.close();
            info!("Event queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
