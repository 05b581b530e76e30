//! Virtual joystick over four direction keys
//!
//! Keys set and clear bits of a shared mask. While any bit is set a tick task
//! re-asserts the stick position every [`DEFAULT_DIRECTION_TICK`]:
//!
//! ```text
//! no finger, mask != 0   ──► acquire, DOWN at point(mask)
//! finger,    mask != 0   ──► MOVE to point(mask) plus forward bias
//! finger,    mask == 0   ──► UP at last point, release, end
//! ```
//!
//! A DOWN or UP the queue refuses is repeated on the next tick.

use super::animator::{Animation, AnimationHandle};
use super::GestureContext;
use crate::control::{MotionAction, Point, TouchId};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_DIRECTION_TICK: Duration = Duration::from_millis(80);
pub const DEFAULT_OBLIQUE_BIAS: u16 = 90;
pub const DEFAULT_FORWARD_BIAS: u16 = 185;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    Front = 1,
    Back = 1 << 1,
    Left = 1 << 2,
    Right = 1 << 3,
}

impl Direction {
    pub fn bit(self) -> u8 {
        self as u8
    }
}

/// Stick geometry derived from the front and back anchors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectionPad {
    mid: Point,
    radius: u16,
    oblique_bias: u16,
    forward_bias: u16,
}

impl DirectionPad {
    pub fn new(front: Point, back: Point, oblique_bias: u16, forward_bias: u16) -> Self {
        let mid = Point::new(
            ((u32::from(front.x) + u32::from(back.x)) / 2) as u16,
            ((u32::from(front.y) + u32::from(back.y)) / 2) as u16,
        );
        Self {
            mid,
            radius: front.y.abs_diff(back.y) / 2,
            oblique_bias,
            forward_bias,
        }
    }

    pub fn mid(&self) -> Point {
        self.mid
    }

    pub fn radius(&self) -> u16 {
        self.radius
    }

    /// Stick position for a direction mask. On repeat ticks a forward
    /// component is pushed further out so holding the key keeps running.
    pub fn point(&self, mask: u8, repeat: bool) -> Point {
        let radius = i32::from(self.radius);
        let (mid_x, mid_y) = (i32::from(self.mid.x), i32::from(self.mid.y));
        let (mut x, mut y) = (mid_x, mid_y);

        if mask & Direction::Front.bit() != 0 {
            y -= radius;
        }
        if mask & Direction::Left.bit() != 0 {
            x -= radius;
        }
        if mask & Direction::Right.bit() != 0 {
            x += radius;
        }
        if mask & Direction::Back.bit() != 0 {
            y += radius;
        }

        if repeat && y < mid_y {
            let oblique = i32::from(self.oblique_bias);
            if x < mid_x {
                x -= oblique;
                y -= oblique;
            } else if x > mid_x {
                x += oblique;
                y -= oblique;
            } else {
                y -= i32::from(self.forward_bias);
            }
        }

        Point::new(
            x.clamp(0, i32::from(u16::MAX)) as u16,
            y.clamp(0, i32::from(u16::MAX)) as u16,
        )
    }
}

pub struct DirectionController {
    ctx: GestureContext,
    pad: DirectionPad,
    tick: Duration,
    mask: Arc<AtomicU8>,
    started: Arc<AtomicBool>,
    run: Option<AnimationHandle>,
}

impl DirectionController {
    pub fn new(ctx: GestureContext, pad: DirectionPad, tick: Duration) -> Self {
        Self {
            ctx,
            pad,
            tick,
            mask: Arc::new(AtomicU8::new(0)),
            started: Arc::new(AtomicBool::new(false)),
            run: None,
        }
    }

    pub fn pad(&self) -> &DirectionPad {
        &self.pad
    }

    pub fn mask(&self) -> u8 {
        self.mask.load(Ordering::Acquire)
    }

    pub fn press(&self, direction: Direction) {
        self.mask.fetch_or(direction.bit(), Ordering::AcqRel);
    }

    pub fn lift(&self, direction: Direction) {
        self.mask.fetch_and(!direction.bit(), Ordering::AcqRel);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Starts the tick task unless one is already running.
    pub fn start(&mut self) {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        info!("Direction stick started");
        let cancel = self.ctx.child_token();
        let ticks = StickTicks {
            ctx: self.ctx.clone(),
            pad: self.pad,
            tick: self.tick,
            mask: self.mask.clone(),
            started: self.started.clone(),
            held: None,
            last: self.pad.mid(),
        };
        self.run = Some(self.ctx.animate(ticks, cancel));
    }

    /// Clears every direction and makes the tick task lift the stick now.
    pub fn stop(&self) {
        self.mask.store(0, Ordering::Release);
        if let Some(run) = &self.run {
            run.stop();
        }
    }
}

struct StickTicks {
    ctx: GestureContext,
    pad: DirectionPad,
    tick: Duration,
    mask: Arc<AtomicU8>,
    started: Arc<AtomicBool>,
    held: Option<TouchId>,
    last: Point,
}

impl StickTicks {
    /// Marks the stick idle. Returns `true` if a key went down in the
    /// meantime, including right after a `stop`, and this task took the run
    /// back.
    fn finish(&self) -> bool {
        self.started.store(false, Ordering::Release);
        !self.ctx.is_shutting_down()
            && self.mask.load(Ordering::Acquire) != 0
            && self
                .started
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}

impl Animation for StickTicks {
    fn step(&mut self) -> Duration {
        let mask = if self.ctx.is_shutting_down() {
            0
        } else {
            self.mask.load(Ordering::Acquire)
        };

        match self.held {
            None if mask == 0 => {
                if self.finish() {
                    return self.tick;
                }
                return Duration::ZERO;
            }
            None => {
                let point = self.pad.point(mask, false);
                if let Some(id) = self.ctx.press(point) {
                    self.held = Some(id);
                    self.last = point;
                }
            }
            Some(id) if mask == 0 => {
                if !self.ctx.lift(id, self.last) {
                    return self.tick;
                }
                self.held = None;
                if self.finish() {
                    return self.tick;
                }
                return Duration::ZERO;
            }
            Some(id) => {
                self.last = self.pad.point(mask, true);
                self.ctx.touch(MotionAction::Move, id, self.last);
            }
        }
        self.tick
    }

    fn on_stop(&mut self) {
        debug!("Direction stick idle");
    }
}
