//! Roh-Eingaben aus der UI-Schicht

use crate::control::Point;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Modifier-Bits einer Tastatureingabe
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        ctrl: false,
        alt: false,
        shift: false,
    };

    pub const CTRL: Modifiers = Modifiers {
        ctrl: true,
        alt: false,
        shift: false,
    };

    pub const ALT: Modifiers = Modifiers {
        ctrl: false,
        alt: true,
        shift: false,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    X1,
    X2,
}

impl MouseButton {
    /// Übersetzt die SDL-Nummerierung (1 = links ... 5 = X2)
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(MouseButton::Left),
            2 => Some(MouseButton::Middle),
            3 => Some(MouseButton::Right),
            4 => Some(MouseButton::X1),
            5 => Some(MouseButton::X2),
            _ => None,
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MouseButton::Left => write!(f, "left"),
            MouseButton::Middle => write!(f, "middle"),
            MouseButton::Right => write!(f, "right"),
            MouseButton::X1 => write!(f, "x1"),
            MouseButton::X2 => write!(f, "x2"),
        }
    }
}

impl FromStr for MouseButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(MouseButton::Left),
            "middle" => Ok(MouseButton::Middle),
            "right" => Ok(MouseButton::Right),
            "x1" => Ok(MouseButton::X1),
            "x2" => Ok(MouseButton::X2),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(MouseButton::from_index)
                .ok_or_else(|| format!("unknown mouse button '{}'", other)),
        }
    }
}

/// Ein Eingabeereignis, so wie die UI-Schicht es liefert
#[derive(Clone, Debug, PartialEq)]
pub enum RawInputEvent {
    KeyDown {
        code: u32,
        modifiers: Modifiers,
        repeat: bool,
    },
    KeyUp {
        code: u32,
        modifiers: Modifiers,
    },
    MouseDown {
        button: MouseButton,
        position: Point,
    },
    MouseUp {
        button: MouseButton,
        position: Point,
    },
    /// Absolute Position, relative Bewegung und Maske der gedrückten Tasten
    /// (Bit 0 = links)
    MouseMotion {
        position: Point,
        dx: i32,
        dy: i32,
        buttons: u32,
    },
    Wheel {
        dx: i32,
        dy: i32,
    },
}

/// Schlüssel der Finger-Buchführung im Router
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputCode {
    Key(u32),
    Mouse(MouseButton),
    MainPointer,
    Fire,
}

impl fmt::Display for InputCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputCode::Key(code) => write!(f, "key {}", code),
            InputCode::Mouse(button) => write!(f, "mouse {}", button),
            InputCode::MainPointer => write!(f, "main pointer"),
            InputCode::Fire => write!(f, "fire"),
        }
    }
}
