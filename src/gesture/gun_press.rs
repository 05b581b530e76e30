//! Recoil compensation
//!
//! Feeds a fixed accurate vertical drag into the vision task on every tick.
//! Owns no finger: lifting the look finger is the vision controller's job.

use super::animator::{Animation, AnimationHandle};
use super::vision::VisionHandle;
use super::GestureContext;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const MIN_PRESS_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GunPressConfig {
    /// Vertical pixels per tick
    pub delta: i32,
    #[serde(with = "super::millis")]
    pub interval: Duration,
}

pub struct GunPress {
    ctx: GestureContext,
    vision: VisionHandle,
    run: Option<AnimationHandle>,
}

impl GunPress {
    pub fn new(ctx: GestureContext, vision: VisionHandle) -> Self {
        Self {
            ctx,
            vision,
            run: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| run.is_running() && !run.is_stopping())
    }

    pub fn start(&mut self, config: GunPressConfig) {
        if self.is_running() {
            debug!("Gun press already running");
            return;
        }
        let interval = config.interval.max(MIN_PRESS_INTERVAL);
        info!("Gun press started: {} px every {:?}", config.delta, interval);

        let cancel = self.ctx.child_token();
        let ticks = PressTicks {
            vision: self.vision.clone(),
            delta: config.delta,
            interval,
            cancel: cancel.clone(),
        };
        self.run = Some(self.ctx.animate(ticks, cancel));
    }

    pub fn stop(&self) {
        if let Some(run) = &self.run {
            run.stop();
        }
    }
}

struct PressTicks {
    vision: VisionHandle,
    delta: i32,
    interval: Duration,
    cancel: CancellationToken,
}

impl Animation for PressTicks {
    fn step(&mut self) -> Duration {
        if self.cancel.is_cancelled() {
            return Duration::ZERO;
        }
        self.vision.control(0, self.delta, true);
        self.interval
    }

    fn on_stop(&mut self) {
        debug!("Gun press stopped");
    }
}
