//! Time-driven gesture machines
//!
//! Every machine turns one discrete input signal into a sequence of touch
//! intents spread over time. They all run on the [`Animator`] and talk to the
//! dispatcher only through the event queue.
//!
//! - [`animator`] - repeat-until-stopped timer substrate
//! - [`continuous_fire`] - alternating tap at a fixed point
//! - [`gun_press`] - periodic accurate drag fed into the vision controller
//! - [`vision`] - relative look control with idle release
//! - [`direction`] - virtual joystick over four direction keys
//! - [`macro_player`] - scripted tap sequence

pub mod animator;
pub mod continuous_fire;
pub mod direction;
pub mod gun_press;
pub mod macro_player;
pub mod vision;

pub use animator::{Animation, AnimationHandle, Animator};
pub use continuous_fire::ContinuousFire;
pub use direction::{Direction, DirectionController, DirectionPad};
pub use gun_press::{GunPress, GunPressConfig};
pub use macro_player::{MacroPlayer, PointMacro};
pub use vision::{VisionBounds, VisionCommand, VisionController, VisionHandle};

use crate::control::{
    ControlIntent, EventQueue, FingerSlots, MotionAction, Point, QueueError, TouchId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Wait before a gesture retries a DOWN or UP the full queue refused
pub const TOUCH_RETRY: Duration = Duration::from_millis(10);

/// Everything a gesture needs to emit touches
///
/// Cloned into every gesture task. The `shutdown` token is the parent of all
/// per-gesture tokens, so cancelling it stops every machine of the session;
/// the tracker lets the session wait until they all lifted their fingers.
#[derive(Clone, Debug)]
pub struct GestureContext {
    queue: EventQueue,
    fingers: Arc<FingerSlots>,
    runtime: Handle,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl GestureContext {
    pub fn new(
        queue: EventQueue,
        fingers: Arc<FingerSlots>,
        runtime: Handle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            fingers,
            runtime,
            shutdown,
            tracker: TaskTracker::new(),
        }
    }

    /// Enqueues one intent. A full or stopped queue drops it with a warning.
    pub fn send(&self, intent: ControlIntent) -> bool {
        match self.queue.push(intent) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping control intent: {}", e);
                false
            }
        }
    }

    pub fn touch(&self, action: MotionAction, id: TouchId, point: Point) -> bool {
        self.send(ControlIntent::touch(action, id, point))
    }

    fn acquire(&self) -> TouchId {
        self.fingers.acquire()
    }

    fn release(&self, id: TouchId) {
        self.fingers.release(id)
    }

    /// Acquires a finger and queues its DOWN. If the DOWN is refused the
    /// finger is given back and `None` returned, so no later MOVE or UP can
    /// name a finger the device never saw.
    pub fn press(&self, point: Point) -> Option<TouchId> {
        let id = self.acquire();
        if self.touch(MotionAction::Down, id, point) {
            Some(id)
        } else {
            self.release(id);
            None
        }
    }

    /// Queues the UP for `id` and releases it.
    ///
    /// Returns `false` if the queue was full: the finger is still down on the
    /// device, so the caller keeps it and tries again later. A stopped queue
    /// counts as lifted since nothing reaches the device anymore.
    pub fn lift(&self, id: TouchId, point: Point) -> bool {
        match self.queue.push(ControlIntent::touch(MotionAction::Up, id, point)) {
            Ok(()) => {}
            Err(QueueError::Full) => {
                warn!("Queue full, UP for finger {} deferred", id);
                return false;
            }
            Err(QueueError::Stopped) => debug!("Queue stopped, finger {} released locally", id),
        }
        self.release(id);
        true
    }

    pub fn fingers(&self) -> &Arc<FingerSlots> {
        &self.fingers
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Spawns a gesture animation tied to the session's tracker.
    pub fn animate<A: Animation>(
        &self,
        animation: A,
        cancel: CancellationToken,
    ) -> AnimationHandle {
        Animator::spawn(&self.tracker, &self.runtime, animation, cancel)
    }

    /// Token for one gesture run, cancelled together with the session.
    pub fn child_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Serde helper for durations written as integer milliseconds
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::control::EventReceiver;

    /// Context over a fresh queue plus the receiving end for assertions
    pub fn context() -> (GestureContext, EventReceiver) {
        context_with_capacity(64)
    }

    pub fn context_with_capacity(capacity: usize) -> (GestureContext, EventReceiver) {
        let (queue, rx) = EventQueue::new(capacity);
        let ctx = GestureContext::new(
            queue,
            Arc::new(FingerSlots::new()),
            Handle::current(),
            CancellationToken::new(),
        );
        (ctx, rx)
    }

    /// Drains everything currently queued as (action, id, point) triples.
    pub fn drain_touches(rx: &mut EventReceiver) -> Vec<(MotionAction, u8, Point)> {
        let mut out = Vec::new();
        while let Some(intent) = rx.try_recv() {
            if let ControlIntent::Touch { id, point, action } = intent {
                out.push((action, id.get(), point));
            }
        }
        out
    }

    /// Occupies one queue slot with a non-touch frame.
    pub fn fill(ctx: &GestureContext) {
        assert!(ctx.send(ControlIntent::Command { action: 0 }));
    }
}
