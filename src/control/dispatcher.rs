//! Single consumer of the event queue
//!
//! Owns the serializer (and with it the touch set and the sink), dequeues
//! strictly in FIFO order and writes one frame per intent.
//!
//! # State Machine
//!
//! ```text
//! Configured ──► Active ──► Closed
//!                  │
//!                  └── sink write failure ──► ControlError::SinkWrite
//! ```
//!
//! A failed write ends the loop for good: the byte stream framing is lost, so
//! nothing after it could be interpreted by the device.

use super::error::ControlError;
use super::queue::EventReceiver;
use super::serializer::Serializer;
use chrono::Local;
use statum::{machine, state};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[state]
#[derive(Debug, Clone)]
pub enum DispatcherState {
    Configured,
    Active,
    Closed,
}

#[machine]
pub struct Dispatcher<S: DispatcherState> {
    receiver: EventReceiver,
    serializer: Serializer,
    frames_written: u64,
}

impl<S: DispatcherState> Dispatcher<S> {
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Dispatcher<Configured> {
    pub fn create(receiver: EventReceiver, serializer: Serializer) -> Self {
        info!("Creating dispatcher");
        Self::new(receiver, serializer, 0)
    }

    pub fn activate(self) -> Dispatcher<Active> {
        info!("Activating dispatcher");
        self.transition()
    }
}

impl Dispatcher<Active> {
    /// Writes intents until the stop sentinel arrives or every producer is
    /// gone.
    pub async fn run_until_stopped(mut self) -> Result<Dispatcher<Closed>, ControlError> {
        info!("Starting dispatch loop");

        let mut window_frames = 0u64;
        let mut last_stats_time = Local::now();
        let stats_interval = chrono::Duration::seconds(30);

        while let Some(intent) = self.receiver.recv().await {
            debug!("Dispatching {:?}", intent);
            if let Err(e) = self.serializer.write_intent(intent).await {
                error!("Failed to write control frame, closing channel: {}", e);
                return Err(e);
            }
            self.frames_written += 1;
            window_frames += 1;

            let now = Local::now();
            if now - last_stats_time > stats_interval {
                let elapsed_seconds = (now - last_stats_time).num_seconds().max(1);
                info!(
                    "Dispatcher stats: {} frames in {} seconds ({:.2}/sec)",
                    window_frames,
                    elapsed_seconds,
                    window_frames as f64 / elapsed_seconds as f64
                );
                window_frames = 0;
                last_stats_time = now;
            }
        }

        if let Err(e) = self.serializer.flush().await {
            error!("Failed to flush sink on shutdown: {}", e);
            return Err(e);
        }

        info!(
            "Dispatch loop finished after {} frames",
            self.frames_written
        );
        Ok(self.transition())
    }
}

/// Handle to a dispatcher running in its own tokio task
#[derive(Debug)]
pub struct DispatcherHandle {
    task: JoinHandle<Result<u64, ControlError>>,
    done: CancellationToken,
}

impl DispatcherHandle {
    pub fn spawn(receiver: EventReceiver, serializer: Serializer) -> Self {
        Self::spawn_on(&tokio::runtime::Handle::current(), receiver, serializer)
    }

    pub fn spawn_on(
        runtime: &tokio::runtime::Handle,
        receiver: EventReceiver,
        serializer: Serializer,
    ) -> Self {
        let dispatcher = Dispatcher::create(receiver, serializer).activate();
        let done = CancellationToken::new();
        let guard = done.clone().drop_guard();
        let task = runtime.spawn(async move {
            let _guard = guard;
            let closed = dispatcher.run_until_stopped().await?;
            Ok(closed.frames_written())
        });
        debug!("Dispatcher task spawned");
        Self { task, done }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Resolves once the dispatch loop has exited, for whatever reason.
    pub async fn stopped(&self) {
        self.done.cancelled().await
    }

    /// Waits for the dispatcher and returns the number of frames it wrote.
    pub async fn join(self) -> Result<u64, ControlError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Dispatcher task failed: {}", e);
                Err(ControlError::TaskJoin(e.to_string()))
            }
        }
    }
}
