//! Aufgelöste Tastenbelegung
//!
//! Die Typen hier werden fertig aufgelöst an den Kern übergeben. Das Laden aus
//! einer Datei passiert außerhalb (siehe `config`).

use super::error::MappingError;
use super::input::MouseButton;
use crate::control::Point;
use crate::gesture::direction::{DEFAULT_DIRECTION_TICK, DEFAULT_FORWARD_BIAS, DEFAULT_OBLIQUE_BIAS};
use crate::gesture::gun_press::GunPressConfig;
use crate::gesture::macro_player::PointMacro;
use crate::gesture::millis;
use crate::gesture::vision::{VisionBounds, DEFAULT_IDLE_RELEASE, DEFAULT_SENSITIVITY};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// SDL-Tastencode für `x`, mit Ctrl schaltet er den Zielmodus um
pub const DEFAULT_AIM_TOGGLE_KEY: u32 = 120;

/// Ziel einer Taste oder Maustaste
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureDescriptor {
    /// Finger liegt, solange die Taste gedrückt ist
    Point(Point),
    /// Wie `Point`, gibt beim Drücken zusätzlich den Mauszeiger frei
    VisiblePoint(Point),
    /// Abfolge von Taps, startet beim Drücken
    Macro(Arc<[PointMacro]>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyBinding {
    pub code: u32,
    #[serde(default)]
    pub ctrl: bool,
    pub gesture: GestureDescriptor,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MouseBinding {
    pub button: MouseButton,
    pub gesture: GestureDescriptor,
}

/// Virtueller Joystick
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectionConfig {
    pub front_key: u32,
    pub back_key: u32,
    pub left_key: u32,
    pub right_key: u32,
    /// Ankerpunkt ganz vorne
    pub front: Point,
    /// Ankerpunkt ganz hinten
    pub back: Point,
    #[serde(with = "millis", default = "default_direction_tick")]
    pub tick: Duration,
    #[serde(default = "default_oblique_bias")]
    pub oblique_bias: u16,
    #[serde(default = "default_forward_bias")]
    pub forward_bias: u16,
}

impl DirectionConfig {
    pub fn keys(&self) -> [u32; 4] {
        [self.front_key, self.back_key, self.left_key, self.right_key]
    }
}

/// Sichtsteuerung über relative Mausbewegung
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisionConfig {
    pub top_left: Point,
    pub bottom_right: Point,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,
    #[serde(with = "millis", default = "default_idle_release")]
    pub idle_release: Duration,
}

impl VisionConfig {
    pub fn bounds(&self) -> VisionBounds {
        VisionBounds {
            top_left: self.top_left,
            bottom_right: self.bottom_right,
        }
    }
}

/// Feuern mit der linken Maustaste im Zielmodus
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FireConfig {
    pub point: Point,
    /// Dauerfeuer-Intervall in Millisekunden; ohne Wert wird der Finger gehalten
    #[serde(default)]
    pub repeat_ms: Option<u64>,
    #[serde(default)]
    pub gun_press: Option<GunPressConfig>,
}

impl FireConfig {
    pub fn repeat_interval(&self) -> Option<Duration> {
        self.repeat_ms.map(Duration::from_millis)
    }
}

/// Vollständige Belegung einer Sitzung
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyMap {
    #[serde(default)]
    pub keys: Vec<KeyBinding>,
    #[serde(default)]
    pub mouse: Vec<MouseBinding>,
    #[serde(default)]
    pub direction: Option<DirectionConfig>,
    #[serde(default)]
    pub vision: Option<VisionConfig>,
    #[serde(default)]
    pub fire: Option<FireConfig>,
    #[serde(default = "default_aim_toggle_key")]
    pub aim_toggle_key: u32,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            mouse: Vec::new(),
            direction: None,
            vision: None,
            fire: None,
            aim_toggle_key: DEFAULT_AIM_TOGGLE_KEY,
        }
    }
}

impl KeyMap {
    /// Prüft die Belegung auf Widersprüche
    pub fn validate(&self) -> Result<(), MappingError> {
        let mut seen = HashSet::new();
        for binding in &self.keys {
            if !seen.insert((binding.code, binding.ctrl)) {
                return Err(MappingError::DuplicateBinding(format!(
                    "key {}{}",
                    if binding.ctrl { "ctrl+" } else { "" },
                    binding.code
                )));
            }
            check_gesture(&binding.gesture, || format!("key {}", binding.code))?;
        }

        let mut buttons = HashSet::new();
        for binding in &self.mouse {
            if !buttons.insert(binding.button) {
                return Err(MappingError::DuplicateBinding(format!(
                    "mouse {}",
                    binding.button
                )));
            }
            check_gesture(&binding.gesture, || format!("mouse {}", binding.button))?;
        }

        if let Some(direction) = &self.direction {
            for key in direction.keys() {
                if self.keys.iter().any(|b| b.code == key && !b.ctrl) {
                    return Err(MappingError::DirectionKeyBound(key));
                }
            }
            if direction.tick.is_zero() {
                return Err(MappingError::InvalidValue {
                    field: "direction.tick",
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if let Some(vision) = &self.vision {
            if vision.top_left.x >= vision.bottom_right.x
                || vision.top_left.y >= vision.bottom_right.y
            {
                return Err(MappingError::InvalidBounds(format!(
                    "{} .. {}",
                    vision.top_left, vision.bottom_right
                )));
            }
            if !(vision.sensitivity.is_finite() && vision.sensitivity > 0.0) {
                return Err(MappingError::InvalidValue {
                    field: "vision.sensitivity",
                    reason: format!("{} is not a positive number", vision.sensitivity),
                });
            }
        }

        Ok(())
    }
}

fn check_gesture(
    gesture: &GestureDescriptor,
    name: impl Fn() -> String,
) -> Result<(), MappingError> {
    match gesture {
        GestureDescriptor::Macro(points) if points.is_empty() => {
            Err(MappingError::EmptyMacro(name()))
        }
        _ => Ok(()),
    }
}

fn default_direction_tick() -> Duration {
    DEFAULT_DIRECTION_TICK
}

fn default_oblique_bias() -> u16 {
    DEFAULT_OBLIQUE_BIAS
}

fn default_forward_bias() -> u16 {
    DEFAULT_FORWARD_BIAS
}

fn default_sensitivity() -> f64 {
    DEFAULT_SENSITIVITY
}

fn default_idle_release() -> Duration {
    DEFAULT_IDLE_RELEASE
}

fn default_aim_toggle_key() -> u32 {
    DEFAULT_AIM_TOGGLE_KEY
}
