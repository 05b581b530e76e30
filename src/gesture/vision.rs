//! Look control driven by relative mouse motion
//!
//! A synthetic finger roams inside a rectangle. The first motion puts it down
//! at the rectangle's center, later motion drags it, hitting the edge lifts it.
//! If the mouse rests for the idle window the finger is lifted as well.
//!
//! The controller itself is plain data. [`VisionHandle`] runs it inside one
//! tokio task so motion commands, gun-press ticks and the idle deadline are
//! all handled in the same place, one after the other.

use super::{GestureContext, TOUCH_RETRY};
use crate::control::{MotionAction, Point, TouchId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_SENSITIVITY: f64 = 0.085;
pub const DEFAULT_IDLE_RELEASE: Duration = Duration::from_millis(500);

const COMMAND_CAPACITY: usize = 256;

/// Area the look finger may move in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisionBounds {
    pub top_left: Point,
    pub bottom_right: Point,
}

impl VisionBounds {
    pub fn center(&self) -> Point {
        Point::new(
            ((u32::from(self.top_left.x) + u32::from(self.bottom_right.x)) / 2) as u16,
            ((u32::from(self.top_left.y) + u32::from(self.bottom_right.y)) / 2) as u16,
        )
    }

    /// Clamps a position into the bounds; `true` if it had to be clamped.
    pub fn clamp(&self, x: i32, y: i32) -> (Point, bool) {
        let cx = x.clamp(i32::from(self.top_left.x), i32::from(self.bottom_right.x));
        let cy = y.clamp(i32::from(self.top_left.y), i32::from(self.bottom_right.y));
        (Point::new(cx as u16, cy as u16), cx != x || cy != y)
    }
}

/// Scales one raw mouse delta. Rounds half away from zero, but a nonzero
/// input never collapses to zero.
pub fn scale_delta(delta: i32, sensitivity: f64) -> i32 {
    let scaled = (f64::from(delta) * sensitivity).round() as i32;
    if scaled == 0 && delta != 0 {
        delta.signum()
    } else {
        scaled
    }
}

pub struct VisionController {
    ctx: GestureContext,
    bounds: VisionBounds,
    center: Point,
    sensitivity: f64,
    idle_release: Duration,
    held: Option<TouchId>,
    point: Point,
    deadline: Option<Instant>,
}

impl VisionController {
    pub fn new(
        ctx: GestureContext,
        bounds: VisionBounds,
        sensitivity: f64,
        idle_release: Duration,
    ) -> Self {
        let center = bounds.center();
        Self {
            ctx,
            bounds,
            center,
            sensitivity,
            idle_release,
            held: None,
            point: center,
            deadline: None,
        }
    }

    pub fn held(&self) -> Option<TouchId> {
        self.held
    }

    /// Last position of the look finger
    pub fn point(&self) -> Point {
        self.point
    }

    /// When the idle release fires, if armed
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn arm_idle_release(&mut self) {
        self.deadline = Some(Instant::now() + self.idle_release);
    }

    pub fn finger_down(&mut self) {
        if self.held.is_some() {
            return;
        }
        self.point = self.center;
        let Some(id) = self.ctx.press(self.point) else {
            return;
        };
        debug!("Look finger {} down at {}", id, self.point);
        self.held = Some(id);
        self.arm_idle_release();
    }

    /// Drags the look finger. Leaving the bounds lifts it at the edge.
    pub fn finger_move(&mut self, dx: i32, dy: i32, accurate: bool) {
        let Some(id) = self.held else {
            debug!("Ignoring look motion without a finger down");
            return;
        };
        let (dx, dy) = if accurate {
            (dx, dy)
        } else {
            (
                scale_delta(dx, self.sensitivity),
                scale_delta(dy, self.sensitivity),
            )
        };

        let (point, clamped) = self
            .bounds
            .clamp(i32::from(self.point.x) + dx, i32::from(self.point.y) + dy);
        self.point = point;
        if clamped {
            debug!("Look finger {} reached the edge at {}", id, point);
            self.finger_up();
            return;
        }
        self.arm_idle_release();
        self.ctx.touch(MotionAction::Move, id, point);
    }

    /// Lifts the look finger. If the queue is full the finger stays held and
    /// the deadline is re-armed to try again shortly.
    pub fn finger_up(&mut self) {
        self.deadline = None;
        let Some(id) = self.held else {
            return;
        };
        if self.ctx.lift(id, self.point) {
            debug!("Look finger {} up at {}", id, self.point);
            self.held = None;
        } else {
            self.deadline = Some(Instant::now() + TOUCH_RETRY);
        }
    }

    /// Puts the finger down if it is up, otherwise drags it.
    pub fn control(&mut self, dx: i32, dy: i32, accurate: bool) {
        if self.held.is_none() {
            self.finger_down();
        } else {
            self.finger_move(dx, dy, accurate);
        }
    }

    fn apply(&mut self, command: VisionCommand) {
        match command {
            VisionCommand::Control { dx, dy, accurate } => self.control(dx, dy, accurate),
            VisionCommand::Release => self.finger_up(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisionCommand {
    Control { dx: i32, dy: i32, accurate: bool },
    Release,
}

/// Sender side of the vision task
#[derive(Clone, Debug)]
pub struct VisionHandle {
    commands: mpsc::Sender<VisionCommand>,
}

impl VisionHandle {
    /// Moves `controller` into its own task. The task lifts the finger and
    /// exits when `cancel` fires or every handle is dropped.
    pub fn spawn(
        controller: VisionController,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);
        let tracker = controller.ctx.tracker().clone();
        let runtime = controller.ctx.runtime().clone();
        let task = tracker.spawn_on(run_vision(controller, receiver, cancel), &runtime);
        (Self { commands }, task)
    }

    pub fn control(&self, dx: i32, dy: i32, accurate: bool) -> bool {
        self.send(VisionCommand::Control { dx, dy, accurate })
    }

    pub fn release(&self) -> bool {
        self.send(VisionCommand::Release)
    }

    fn send(&self, command: VisionCommand) -> bool {
        match self.commands.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(command)) => {
                warn!("Vision command queue full, dropping {:?}", command);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Vision task gone, dropping command");
                false
            }
        }
    }
}

async fn run_vision(
    mut controller: VisionController,
    mut commands: mpsc::Receiver<VisionCommand>,
    cancel: CancellationToken,
) {
    info!("Vision controller running");
    loop {
        let deadline = controller.deadline();
        tokio::select! {
            _ = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => controller.apply(command),
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                debug!("Look finger idle, releasing");
                controller.finger_up();
            }
        }
    }
    controller.finger_up();
    while controller.held().is_some() {
        tokio::time::sleep(TOUCH_RETRY).await;
        controller.finger_up();
    }
    info!("Vision controller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::testing::{context, context_with_capacity, drain_touches, fill};

    const BOUNDS: VisionBounds = VisionBounds {
        top_left: Point::new(1000, 200),
        bottom_right: Point::new(1600, 600),
    };

    #[test]
    fn nonzero_delta_never_rounds_to_zero() {
        assert_eq!(scale_delta(1, 0.5), 1);
        assert_eq!(scale_delta(1, 0.085), 1);
        assert_eq!(scale_delta(-1, 0.085), -1);
        assert_eq!(scale_delta(0, 0.085), 0);
        assert_eq!(scale_delta(100, 0.085), 9);
        assert_eq!(scale_delta(-30, 0.5), -15);
        assert_eq!(scale_delta(-3, 0.5), -2);
    }

    #[test]
    fn clamp_reports_edges() {
        assert_eq!(BOUNDS.center(), Point::new(1300, 400));
        assert_eq!(BOUNDS.clamp(1300, 400), (Point::new(1300, 400), false));
        assert_eq!(BOUNDS.clamp(1700, 100), (Point::new(1600, 200), true));
    }

    #[tokio::test(start_paused = true)]
    async fn first_control_downs_then_moves() {
        let (ctx, mut rx) = context();
        let mut vision = VisionController::new(ctx, BOUNDS, 0.5, DEFAULT_IDLE_RELEASE);

        vision.control(40, 40, false);
        vision.control(40, -20, false);
        vision.control(3, 0, true);

        assert_eq!(
            drain_touches(&mut rx),
            vec![
                (MotionAction::Down, 0, Point::new(1300, 400)),
                (MotionAction::Move, 0, Point::new(1320, 390)),
                (MotionAction::Move, 0, Point::new(1323, 390)),
            ]
        );
        assert!(vision.deadline().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_bounds_releases_at_edge() {
        let (ctx, mut rx) = context();
        let fingers = ctx.fingers().clone();
        let mut vision = VisionController::new(ctx, BOUNDS, 0.5, DEFAULT_IDLE_RELEASE);

        vision.finger_down();
        vision.finger_move(0, -1000, false);
        vision.finger_move(0, 10, false);

        assert_eq!(
            drain_touches(&mut rx),
            vec![
                (MotionAction::Down, 0, Point::new(1300, 400)),
                (MotionAction::Up, 0, Point::new(1300, 200)),
            ]
        );
        assert_eq!(vision.held(), None);
        assert_eq!(vision.deadline(), None);
        assert_eq!(fingers.in_use(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_never_leaves_a_phantom_finger() {
        let (ctx, mut rx) = context_with_capacity(1);
        let fingers = ctx.fingers().clone();
        let mut vision = VisionController::new(ctx.clone(), BOUNDS, 1.0, DEFAULT_IDLE_RELEASE);

        fill(&ctx);
        vision.finger_down();
        assert_eq!(vision.held(), None);
        assert_eq!(fingers.in_use(), 0);

        // nothing may follow a refused DOWN
        vision.finger_move(5, 5, true);
        assert!(drain_touches(&mut rx).is_empty());

        vision.finger_down();
        assert_eq!(vision.held().map(|id| id.get()), Some(0));
        vision.finger_up();
        assert_eq!(vision.held().map(|id| id.get()), Some(0));
        assert!(vision.deadline().is_some());
        assert_eq!(fingers.in_use(), 1);

        assert_eq!(
            drain_touches(&mut rx),
            vec![(MotionAction::Down, 0, Point::new(1300, 400))]
        );
        vision.finger_up();
        assert_eq!(vision.held(), None);
        assert_eq!(fingers.in_use(), 0);
        assert_eq!(
            drain_touches(&mut rx),
            vec![(MotionAction::Up, 0, Point::new(1300, 400))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_window_lifts_the_finger() {
        let (ctx, mut rx) = context();
        let fingers = ctx.fingers().clone();
        let cancel = ctx.child_token();
        let vision = VisionController::new(ctx, BOUNDS, 1.0, DEFAULT_IDLE_RELEASE);
        let (handle, task) = VisionHandle::spawn(vision, cancel.clone());

        handle.control(0, 0, false);
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.control(5, 0, false);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fingers.in_use(), 1);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fingers.in_use(), 0);

        assert_eq!(
            drain_touches(&mut rx),
            vec![
                (MotionAction::Down, 0, Point::new(1300, 400)),
                (MotionAction::Move, 0, Point::new(1305, 400)),
                (MotionAction::Up, 0, Point::new(1305, 400)),
            ]
        );

        cancel.cancel();
        task.await.unwrap();
        assert!(drain_touches(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_lifts_a_held_finger() {
        let (ctx, mut rx) = context();
        let cancel = ctx.child_token();
        let vision = VisionController::new(ctx, BOUNDS, 1.0, DEFAULT_IDLE_RELEASE);
        let (handle, task) = VisionHandle::spawn(vision, cancel.clone());

        handle.control(0, 0, false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        task.await.unwrap();

        let actions: Vec<_> = drain_touches(&mut rx).into_iter().map(|t| t.0).collect();
        assert_eq!(actions, vec![MotionAction::Down, MotionAction::Up]);
        assert!(!handle.release());
    }
}
