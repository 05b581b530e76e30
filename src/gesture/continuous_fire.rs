//! Continuous fire: tap, lift, tap, lift at one point
//!
//! ```text
//! phase 0: acquire, DOWN ──wait──► phase 1: UP, release ──wait──► phase 0
//! ```
//!
//! A stop observed in either phase lifts the finger if it is down and ends the
//! run.

use super::animator::{Animation, AnimationHandle};
use super::{GestureContext, TOUCH_RETRY};
use crate::control::{Point, TouchId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const MIN_FIRE_INTERVAL: Duration = Duration::from_millis(10);

pub struct ContinuousFire {
    ctx: GestureContext,
    point: Point,
    interval_ms: Arc<AtomicU64>,
    run: Option<AnimationHandle>,
}

impl ContinuousFire {
    pub fn new(ctx: GestureContext, point: Point) -> Self {
        Self {
            ctx,
            point,
            interval_ms: Arc::new(AtomicU64::new(MIN_FIRE_INTERVAL.as_millis() as u64)),
            run: None,
        }
    }

    pub fn set_interval(&self, interval: Duration) {
        let interval = interval.max(MIN_FIRE_INTERVAL);
        self.interval_ms
            .store(interval.as_millis() as u64, Ordering::Release);
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| run.is_running() && !run.is_stopping())
    }

    /// Starts tapping, or only updates the interval if already tapping.
    pub fn start(&mut self, interval: Duration) {
        self.set_interval(interval);
        if self.is_running() {
            debug!("Continuous fire already running, interval now {:?}", self.interval());
            return;
        }

        info!("Continuous fire started at {} every {:?}", self.point, self.interval());
        let cancel = self.ctx.child_token();
        let taps = FireTaps {
            ctx: self.ctx.clone(),
            point: self.point,
            interval_ms: self.interval_ms.clone(),
            cancel: cancel.clone(),
            phase: 0,
            held: None,
        };
        self.run = Some(self.ctx.animate(taps, cancel));
    }

    /// Idempotent; the running task lifts the finger on its next step.
    pub fn stop(&self) {
        if let Some(run) = &self.run {
            run.stop();
        }
    }
}

struct FireTaps {
    ctx: GestureContext,
    point: Point,
    interval_ms: Arc<AtomicU64>,
    cancel: CancellationToken,
    phase: u8,
    held: Option<TouchId>,
}

impl FireTaps {
    /// `false` while the UP is still waiting for queue space.
    fn lift(&mut self) -> bool {
        match self.held {
            Some(id) if !self.ctx.lift(id, self.point) => false,
            _ => {
                self.held = None;
                true
            }
        }
    }
}

impl Animation for FireTaps {
    fn step(&mut self) -> Duration {
        if self.cancel.is_cancelled() {
            return if self.lift() {
                Duration::ZERO
            } else {
                TOUCH_RETRY
            };
        }

        // a refused DOWN or UP keeps the phase, so the next tick repeats it
        match self.phase {
            0 => {
                if let Some(id) = self.ctx.press(self.point) {
                    self.held = Some(id);
                    self.phase = 1;
                }
            }
            _ => {
                if self.lift() {
                    self.phase = 0;
                }
            }
        }
        Duration::from_millis(self.interval_ms.load(Ordering::Acquire))
    }

    fn on_stop(&mut self) {
        debug!("Continuous fire at {} stopped", self.point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::MotionAction;
    use crate::gesture::testing::{context, context_with_capacity, drain_touches, fill};

    const TARGET: Point = Point::new(900, 500);

    #[tokio::test(start_paused = true)]
    async fn alternates_and_lifts_on_stop() {
        let (ctx, mut rx) = context();
        let fingers = ctx.fingers().clone();
        let mut fire = ContinuousFire::new(ctx, TARGET);

        fire.start(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(120)).await;
        fire.stop();
        fire.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let touches = drain_touches(&mut rx);
        let actions: Vec<_> = touches.iter().map(|(a, _, _)| *a).collect();
        assert_eq!(
            actions,
            vec![MotionAction::Down, MotionAction::Up, MotionAction::Down, MotionAction::Up]
        );
        assert!(touches.iter().all(|(_, id, p)| *id == 0 && *p == TARGET));
        assert_eq!(fingers.in_use(), 0);
        assert!(!fire.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_while_running_only_updates_interval() {
        let (ctx, mut rx) = context();
        let fingers = ctx.fingers().clone();
        let mut fire = ContinuousFire::new(ctx, TARGET);

        fire.start(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(1)).await;
        fire.start(Duration::from_millis(1));
        assert_eq!(fire.interval(), MIN_FIRE_INTERVAL);
        assert_eq!(fingers.in_use(), 1);

        fire.stop();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let touches = drain_touches(&mut rx);
        assert_eq!(touches.first().map(|t| t.0), Some(MotionAction::Down));
        assert_eq!(touches.last().map(|t| t.0), Some(MotionAction::Up));
        assert_eq!(fingers.in_use(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_taps_are_repeated_on_the_next_tick() {
        let (ctx, mut rx) = context_with_capacity(1);
        let fingers = ctx.fingers().clone();
        fill(&ctx);
        let mut fire = ContinuousFire::new(ctx, TARGET);

        fire.start(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fingers.in_use(), 0);
        assert!(drain_touches(&mut rx).is_empty());

        // t = 50: DOWN goes through and fills the queue again
        tokio::time::sleep(Duration::from_millis(59)).await;
        assert_eq!(fingers.in_use(), 1);

        // t = 100: UP is refused, the finger stays down
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fingers.in_use(), 1);
        assert_eq!(drain_touches(&mut rx), vec![(MotionAction::Down, 0, TARGET)]);

        // t = 150: the UP is sent again
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fingers.in_use(), 0);
        fire.stop();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(drain_touches(&mut rx), vec![(MotionAction::Up, 0, TARGET)]);
        assert!(!fire.is_running());
    }
}
