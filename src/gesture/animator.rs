//! Repeating timer primitive behind every gesture machine
//!
//! ```text
//! on_start ──► step ──► wait(d) ──► step ──► ... ──► step returns 0 ──► on_stop
//!                          ▲
//!                     cancel wakes the wait early, once
//! ```
//!
//! Cancelling never runs cleanup itself: it only cuts the current wait short so
//! the machine's next `step` can notice the stop, emit its final UP and return
//! zero.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Hooks of one time-driven gesture
pub trait Animation: Send + 'static {
    fn on_start(&mut self) {}

    /// Advances the gesture; returns how long to wait before the next step.
    /// A zero duration ends the animation.
    fn step(&mut self) -> Duration;

    fn on_stop(&mut self) {}
}

pub struct Animator;

impl Animator {
    /// Drives `animation` to completion and hands it back.
    pub async fn run<A: Animation>(mut animation: A, cancel: CancellationToken) -> A {
        animation.on_start();
        let mut woken = false;
        loop {
            let wait = animation.step();
            if wait.is_zero() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled(), if !woken => {
                    debug!("Animation wait cut short by cancellation");
                    woken = true;
                }
            }
        }
        animation.on_stop();
        animation
    }

    /// Runs `animation` as a task on `runtime`, registered with `tracker`.
    pub fn spawn<A: Animation>(
        tracker: &TaskTracker,
        runtime: &Handle,
        animation: A,
        cancel: CancellationToken,
    ) -> AnimationHandle {
        let token = cancel.clone();
        let task = tracker.spawn_on(
            async move {
                Animator::run(animation, token).await;
            },
            runtime,
        );
        AnimationHandle { cancel, task }
    }
}

/// Running animation: its cancel token plus the task driving it
#[derive(Debug)]
pub struct AnimationHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl AnimationHandle {
    /// Requests a stop. Idempotent, callable from any thread.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("Animation task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        log: Arc<Mutex<Vec<&'static str>>>,
        remaining: usize,
    }

    impl Animation for Recorder {
        fn on_start(&mut self) {
            self.log.lock().unwrap().push("start");
        }

        fn step(&mut self) -> Duration {
            self.log.lock().unwrap().push("step");
            if self.remaining == 0 {
                return Duration::ZERO;
            }
            self.remaining -= 1;
            Duration::from_millis(50)
        }

        fn on_stop(&mut self) {
            self.log.lock().unwrap().push("stop");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hooks_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let recorder = Recorder {
            log: log.clone(),
            remaining: 3,
        };
        let started = tokio::time::Instant::now();
        Animator::run(recorder, CancellationToken::new()).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start", "step", "step", "step", "step", "stop"]
        );
        assert_eq!(started.elapsed(), Duration::from_millis(150));
    }

    struct UntilCancelled {
        token: CancellationToken,
        steps: usize,
    }

    impl Animation for UntilCancelled {
        fn step(&mut self) -> Duration {
            self.steps += 1;
            if self.token.is_cancelled() {
                Duration::ZERO
            } else {
                Duration::from_secs(60)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_cuts_the_wait_short() {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let handle = Animator::spawn(
            &tracker,
            &Handle::current(),
            UntilCancelled {
                token: token.clone(),
                steps: 0,
            },
            token,
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_running());

        let started = tokio::time::Instant::now();
        handle.stop();
        handle.stop();
        handle.join().await;
        assert!(started.elapsed() < Duration::from_secs(1));

        tracker.close();
        tracker.wait().await;
    }
}
