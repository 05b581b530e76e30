//! Control channel: from intents to wire frames
//!
//! ```text
//! producers ──► EventQueue ──► Dispatcher ──► Serializer ──► sink
//!                                               │
//!                                         TouchEventSet
//! ```
//!
//! - [`fingers`] - touch identity allocator shared by all producers
//! - [`intent`] - value types and the [`ControlIntent`] vocabulary
//! - [`queue`] - bounded, non-blocking multi-producer queue
//! - [`touch_set`] - pointer-index bookkeeping and touch frame encoding
//! - [`serializer`] - frame encoding for every intent type
//! - [`dispatcher`] - the single consumer task

pub mod dispatcher;
pub mod error;
pub mod fingers;
pub mod intent;
pub mod queue;
pub mod serializer;
pub mod touch_set;

pub use dispatcher::DispatcherHandle;
pub use error::{ControlError, QueueError};
pub use fingers::FingerSlots;
pub use intent::{
    ControlEventType, ControlIntent, FrameSize, KeyAction, MotionAction, Point, TouchId,
    COMMAND_BACK_OR_SCREEN_ON, MAX_FINGERS, TEXT_MAX_LENGTH,
};
pub use queue::{EventQueue, EventReceiver, DEFAULT_QUEUE_CAPACITY};
pub use serializer::{ControlSink, Serializer};
pub use touch_set::TouchEventSet;
