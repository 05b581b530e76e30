//! Scripted tap sequence
//!
//! Each point is tapped with its own finger: DOWN, settle, UP, then the
//! point's delay before the next one. The last UP ends the run.

use super::animator::{Animation, AnimationHandle};
use super::{GestureContext, TOUCH_RETRY};
use crate::control::{Point, TouchId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Time a macro finger stays down before it is lifted
pub const MACRO_SETTLE: Duration = Duration::from_millis(30);

/// One tap of a macro and the pause that follows it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointMacro {
    pub point: Point,
    #[serde(with = "super::millis", default)]
    pub delay: Duration,
}

pub struct MacroPlayer {
    ctx: GestureContext,
    points: Arc<[PointMacro]>,
    run: Option<AnimationHandle>,
}

impl MacroPlayer {
    pub fn new(ctx: GestureContext, points: Arc<[PointMacro]>) -> Self {
        Self {
            ctx,
            points,
            run: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.run.as_ref().is_some_and(|run| run.is_running())
    }

    /// Plays the sequence from the start. A run still in flight is left to
    /// finish on its own.
    pub fn play(&mut self) {
        if self.points.is_empty() {
            debug!("Empty macro, nothing to play");
            return;
        }
        info!("Playing macro with {} points", self.points.len());
        let cancel = self.ctx.child_token();
        let taps = MacroTaps {
            ctx: self.ctx.clone(),
            points: self.points.clone(),
            cancel: cancel.clone(),
            state: 0,
            held: None,
        };
        self.run = Some(self.ctx.animate(taps, cancel));
    }

    pub fn stop(&self) {
        if let Some(run) = &self.run {
            run.stop();
        }
    }
}

struct MacroTaps {
    ctx: GestureContext,
    points: Arc<[PointMacro]>,
    cancel: CancellationToken,
    state: usize,
    held: Option<TouchId>,
}

impl Animation for MacroTaps {
    fn step(&mut self) -> Duration {
        let index = self.state / 2;

        if self.cancel.is_cancelled() {
            return match self.held {
                Some(id) if !self.ctx.lift(id, self.points[index].point) => TOUCH_RETRY,
                _ => {
                    self.held = None;
                    Duration::ZERO
                }
            };
        }

        let Some(step) = self.points.get(index).copied() else {
            return Duration::ZERO;
        };

        // a refused DOWN or UP keeps the state and is tried again shortly
        if self.state % 2 == 0 {
            let Some(id) = self.ctx.press(step.point) else {
                return TOUCH_RETRY;
            };
            self.held = Some(id);
            self.state += 1;
            return MACRO_SETTLE;
        }

        if let Some(id) = self.held {
            if !self.ctx.lift(id, step.point) {
                return TOUCH_RETRY;
            }
            self.held = None;
        }
        self.state += 1;
        if index + 1 == self.points.len() {
            Duration::ZERO
        } else {
            step.delay
        }
    }

    fn on_stop(&mut self) {
        debug!("Macro finished after {} steps", self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::MotionAction;
    use crate::gesture::testing::{context, context_with_capacity, drain_touches, fill};

    fn script() -> Arc<[PointMacro]> {
        vec![
            PointMacro {
                point: Point::new(10, 10),
                delay: Duration::from_millis(200),
            },
            PointMacro {
                point: Point::new(20, 20),
                delay: Duration::from_millis(5000),
            },
        ]
        .into()
    }

    #[tokio::test(start_paused = true)]
    async fn taps_each_point_with_a_fresh_finger() {
        let (ctx, mut rx) = context();
        let fingers = ctx.fingers().clone();
        let held = fingers.acquire();
        let mut player = MacroPlayer::new(ctx, script());
        let ms = |n| tokio::time::sleep(Duration::from_millis(n));

        // DOWN at 0, UP at 30
        player.play();
        ms(29).await;
        assert_eq!(
            drain_touches(&mut rx),
            vec![(MotionAction::Down, 1, Point::new(10, 10))]
        );
        ms(2).await;
        assert_eq!(
            drain_touches(&mut rx),
            vec![(MotionAction::Up, 1, Point::new(10, 10))]
        );
        fingers.release(held);

        // 200 ms delay, then DOWN at 230 with the lowest free finger
        ms(198).await;
        assert!(drain_touches(&mut rx).is_empty());
        ms(2).await;
        assert_eq!(
            drain_touches(&mut rx),
            vec![(MotionAction::Down, 0, Point::new(20, 20))]
        );

        // UP at 260 ends the run, the last delay is never waited
        ms(28).await;
        assert!(drain_touches(&mut rx).is_empty());
        ms(2).await;
        assert_eq!(
            drain_touches(&mut rx),
            vec![(MotionAction::Up, 0, Point::new(20, 20))]
        );
        assert!(!player.is_running());
        assert_eq!(fingers.in_use(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lifts_the_finger_in_flight() {
        let (ctx, mut rx) = context();
        let fingers = ctx.fingers().clone();
        let mut player = MacroPlayer::new(ctx, script());

        player.play();
        tokio::time::sleep(Duration::from_millis(10)).await;
        player.stop();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(
            drain_touches(&mut rx),
            vec![
                (MotionAction::Down, 0, Point::new(10, 10)),
                (MotionAction::Up, 0, Point::new(10, 10)),
            ]
        );
        assert!(!player.is_running());
        assert_eq!(fingers.in_use(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_taps_are_retried_without_skipping_a_point() {
        let (ctx, mut rx) = context_with_capacity(1);
        let fingers = ctx.fingers().clone();
        fill(&ctx);
        let single: Arc<[PointMacro]> = Arc::from(vec![PointMacro {
            point: Point::new(10, 10),
            delay: Duration::ZERO,
        }]);
        let mut player = MacroPlayer::new(ctx, single);

        player.play();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(fingers.in_use(), 0);
        assert!(drain_touches(&mut rx).is_empty());

        // DOWN retried at 10, its UP at 40 is refused and retried at 50
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(fingers.in_use(), 1);
        assert_eq!(
            drain_touches(&mut rx),
            vec![(MotionAction::Down, 0, Point::new(10, 10))]
        );

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(
            drain_touches(&mut rx),
            vec![(MotionAction::Up, 0, Point::new(10, 10))]
        );
        assert_eq!(fingers.in_use(), 0);
        assert!(!player.is_running());
    }
}
