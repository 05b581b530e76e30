//! Value types shared by producers and the dispatcher
//!
//! A [`ControlIntent`] is one not-yet-serialized protocol event. Producers build
//! intents and push them into the [`EventQueue`](super::queue::EventQueue); the
//! dispatcher turns each one into exactly one wire frame.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of simultaneously active synthetic fingers.
pub const MAX_FINGERS: usize = 8;

/// Text frames longer than this are truncated before encoding.
pub const TEXT_MAX_LENGTH: usize = 300;

/// Command action understood by the device: press BACK, or wake the screen.
pub const COMMAND_BACK_OR_SCREEN_ON: u8 = 0;

/// Position in device-frame pixel space
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u16,
    pub y: u16,
}

impl Point {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Size of the device frame, embedded in every touch and scroll frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u16,
    pub height: u16,
}

impl FrameSize {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.width >> 1, self.height >> 1)
    }
}

/// Identity of one synthetic finger, always in `0..MAX_FINGERS`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TouchId(u8);

impl TouchId {
    pub(crate) fn new(raw: u8) -> Self {
        assert!((raw as usize) < MAX_FINGERS, "touch id {} out of range", raw);
        Self(raw)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for TouchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Motion action codes (lower byte of the wire action)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MotionAction {
    Down = 0,
    Up = 1,
    Move = 2,
    PointerDown = 5,
    PointerUp = 6,
}

impl MotionAction {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Packs the pointer index into the upper byte of the wire action.
    pub fn encode(self, pointer_index: u8) -> u16 {
        (u16::from(pointer_index) << 8) | u16::from(self.code())
    }

    /// Splits a wire action into its action code and pointer index.
    pub fn decode(raw: u16) -> Option<(MotionAction, u8)> {
        let index = (raw >> 8) as u8;
        let action = match (raw & 0x00ff) as u8 {
            0 => MotionAction::Down,
            1 => MotionAction::Up,
            2 => MotionAction::Move,
            5 => MotionAction::PointerDown,
            6 => MotionAction::PointerUp,
            _ => return None,
        };
        Some((action, index))
    }
}

/// Key action for pass-through keycode frames
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyAction {
    Down = 0,
    Up = 1,
}

/// Frame type tag, first byte of every frame on the control stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlEventType {
    Keycode = 0,
    Text = 1,
    Touch = 2,
    Scroll = 3,
    Command = 4,
}

impl ControlEventType {
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// One protocol event on its way to the device
#[derive(Clone, Debug, PartialEq)]
pub enum ControlIntent {
    /// Touch action for a single finger; routed through the touch set
    Touch {
        id: TouchId,
        point: Point,
        action: MotionAction,
    },
    Keycode {
        action: KeyAction,
        keycode: i32,
        meta_state: i32,
    },
    Text(String),
    /// Scroll at a position; the frame size is filled in by the dispatcher
    Scroll {
        position: Point,
        h_scroll: i32,
        v_scroll: i32,
    },
    Command { action: u8 },
    /// Arbitrary tag plus payload, written verbatim
    Raw { tag: u8, payload: Bytes },
}

impl ControlIntent {
    pub fn touch(action: MotionAction, id: TouchId, point: Point) -> Self {
        ControlIntent::Touch { id, point, action }
    }

    pub fn event_type(&self) -> Option<ControlEventType> {
        match self {
            ControlIntent::Touch { .. } => Some(ControlEventType::Touch),
            ControlIntent::Keycode { .. } => Some(ControlEventType::Keycode),
            ControlIntent::Text(_) => Some(ControlEventType::Text),
            ControlIntent::Scroll { .. } => Some(ControlEventType::Scroll),
            ControlIntent::Command { .. } => Some(ControlEventType::Command),
            ControlIntent::Raw { .. } => None,
        }
    }
}
