//! Modul für die Umwandlung von Desktop-Eingaben in Touch-Gesten.
//!
//! Dieses Modul enthält die aufgelöste Tastenbelegung (`KeyMap`), die Roh-Eingaben
//! der UI-Schicht (`RawInputEvent`) und den `InputRouter`, der beides verbindet und
//! die Gestenmaschinen steuert.

pub mod error;
pub mod input;
pub mod keymap;
pub mod router;

// Re-exports für einfacheren Zugriff
pub use error::MappingError;
pub use input::{InputCode, Modifiers, MouseButton, RawInputEvent};
pub use keymap::{
    DirectionConfig, FireConfig, GestureDescriptor, KeyBinding, KeyMap, MouseBinding,
    VisionConfig,
};
pub use router::{InputRouter, RouteOutcome};
