//! Verteilung der Roh-Eingaben auf Touch-Gesten
//!
//! Der Router ist die Kompositionswurzel des Kerns. Er gehört dem UI-Thread,
//! führt Buch darüber, welcher Eingabecode welchen Finger hält, und startet
//! bzw. stoppt die Gestenmaschinen.
//!
//! # Routing
//!
//! ```text
//! Taste (ohne Alt) ──┬── Richtungstaste ──► DirectionController
//!                    ├── Ctrl + Taste   ──► Ctrl-Belegung
//!                    └── Taste          ──► normale Belegung
//! Maus, normal     ──┬── links          ──► Hauptzeiger (DOWN/MOVE/UP)
//!                    └── sonst          ──► Maustasten-Belegung
//! Maus, Zielmodus  ──┬── Bewegung       ──► VisionController
//!                    └── links          ──► Feuern, Rückstoßausgleich
//! Mausrad          ──────────────────────► Scroll-Frame
//! ```

use super::error::MappingError;
use super::input::{InputCode, Modifiers, MouseButton, RawInputEvent};
use super::keymap::{FireConfig, GestureDescriptor, KeyMap};
use crate::control::{
    ControlIntent, KeyAction, MotionAction, Point, TouchId, COMMAND_BACK_OR_SCREEN_ON,
};
use crate::gesture::{
    ContinuousFire, Direction, DirectionController, DirectionPad, GestureContext, GunPress,
    MacroPlayer, VisionHandle,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Ergebnis einer Eingabe für die UI-Schicht
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Eingabe wurde verarbeitet
    Handled,
    /// Keine Belegung, die UI darf die Eingabe selbst verwenden
    Unhandled,
    /// Die UI soll den Zielmodus verlassen und den Mauszeiger zeigen
    ReleaseCursor,
    /// Der Zielmodus wurde per Tastenkürzel umgeschaltet
    AimChanged(bool),
}

pub struct InputRouter {
    ctx: GestureContext,
    keys: HashMap<u32, GestureDescriptor>,
    ctrl_keys: HashMap<u32, GestureDescriptor>,
    mouse: HashMap<MouseButton, GestureDescriptor>,
    direction_keys: HashMap<u32, Direction>,
    direction: Option<DirectionController>,
    vision: Option<VisionHandle>,
    fire_config: Option<FireConfig>,
    fire: Option<ContinuousFire>,
    gun_press: Option<GunPress>,
    macros: HashMap<InputCode, MacroPlayer>,
    held: HashMap<InputCode, (TouchId, Point)>,
    aim_toggle_key: u32,
    aim: bool,
    pointer: Point,
}

impl InputRouter {
    /// Erstellt den Router aus einer geprüften Belegung
    pub fn new(
        ctx: GestureContext,
        keymap: &KeyMap,
        vision: Option<VisionHandle>,
    ) -> Result<Self, MappingError> {
        keymap.validate()?;

        let mut keys = HashMap::new();
        let mut ctrl_keys = HashMap::new();
        for binding in &keymap.keys {
            let target = if binding.ctrl { &mut ctrl_keys } else { &mut keys };
            target.insert(binding.code, binding.gesture.clone());
        }
        let mouse = keymap
            .mouse
            .iter()
            .map(|binding| (binding.button, binding.gesture.clone()))
            .collect();

        let mut direction_keys = HashMap::new();
        let direction = keymap.direction.as_ref().map(|config| {
            direction_keys.insert(config.front_key, Direction::Front);
            direction_keys.insert(config.back_key, Direction::Back);
            direction_keys.insert(config.left_key, Direction::Left);
            direction_keys.insert(config.right_key, Direction::Right);
            let pad = DirectionPad::new(
                config.front,
                config.back,
                config.oblique_bias,
                config.forward_bias,
            );
            DirectionController::new(ctx.clone(), pad, config.tick)
        });

        info!(
            "Input router ready: {} keys, {} ctrl keys, {} mouse buttons",
            keys.len(),
            ctrl_keys.len(),
            keymap.mouse.len()
        );

        Ok(Self {
            ctx,
            keys,
            ctrl_keys,
            mouse,
            direction_keys,
            direction,
            vision,
            fire_config: keymap.fire.clone(),
            fire: None,
            gun_press: None,
            macros: HashMap::new(),
            held: HashMap::new(),
            aim_toggle_key: keymap.aim_toggle_key,
            aim: false,
            pointer: Point::default(),
        })
    }

    pub fn is_aim_mode(&self) -> bool {
        self.aim
    }

    /// Anzahl der Finger, die Tasten und Maustasten gerade halten
    pub fn held_touches(&self) -> usize {
        self.held.len()
    }

    pub fn route(&mut self, event: RawInputEvent) -> RouteOutcome {
        match event {
            RawInputEvent::KeyDown {
                code,
                modifiers,
                repeat,
            } => self.key_down(code, modifiers, repeat),
            RawInputEvent::KeyUp { code, modifiers } => self.key_up(code, modifiers),
            RawInputEvent::MouseDown { button, position } => self.mouse_down(button, position),
            RawInputEvent::MouseUp { button, position } => self.mouse_up(button, position),
            RawInputEvent::MouseMotion {
                position,
                dx,
                dy,
                buttons,
            } => self.mouse_motion(position, dx, dy, buttons),
            RawInputEvent::Wheel { dx, dy } => self.wheel(dx, dy),
        }
    }

    pub fn key_down(&mut self, code: u32, modifiers: Modifiers, repeat: bool) -> RouteOutcome {
        if modifiers.alt {
            return RouteOutcome::Unhandled;
        }
        if repeat {
            return RouteOutcome::Handled;
        }

        if !modifiers.ctrl {
            if let Some(&direction) = self.direction_keys.get(&code) {
                if let Some(controller) = self.direction.as_mut() {
                    controller.press(direction);
                    controller.start();
                }
                return RouteOutcome::Handled;
            }
        }

        let map = if modifiers.ctrl {
            &self.ctrl_keys
        } else {
            &self.keys
        };
        match map.get(&code).cloned() {
            Some(gesture) => self.press_gesture(InputCode::Key(code), &gesture),
            None => RouteOutcome::Unhandled,
        }
    }

    pub fn key_up(&mut self, code: u32, modifiers: Modifiers) -> RouteOutcome {
        if modifiers.alt {
            return RouteOutcome::Unhandled;
        }
        if modifiers.ctrl && code == self.aim_toggle_key {
            let aim = !self.aim;
            self.set_aim_mode(aim);
            return RouteOutcome::AimChanged(aim);
        }

        if let Some(&direction) = self.direction_keys.get(&code) {
            if let Some(controller) = self.direction.as_ref() {
                controller.lift(direction);
            }
            return RouteOutcome::Handled;
        }

        // Finger wird auch angehoben, wenn sich Ctrl zwischendurch geändert hat
        if self.lift_code(InputCode::Key(code), None) {
            return RouteOutcome::Handled;
        }
        if self.keys.contains_key(&code) || self.ctrl_keys.contains_key(&code) {
            RouteOutcome::Handled
        } else {
            RouteOutcome::Unhandled
        }
    }

    pub fn mouse_down(&mut self, button: MouseButton, position: Point) -> RouteOutcome {
        self.pointer = position;
        if button == MouseButton::Left {
            if self.aim {
                return self.fire_press();
            }
            self.hold(InputCode::MainPointer, position);
            return RouteOutcome::Handled;
        }
        match self.mouse.get(&button).cloned() {
            Some(gesture) => self.press_gesture(InputCode::Mouse(button), &gesture),
            None => RouteOutcome::Unhandled,
        }
    }

    pub fn mouse_up(&mut self, button: MouseButton, position: Point) -> RouteOutcome {
        self.pointer = position;
        if button == MouseButton::Left {
            if self.aim {
                return self.fire_release();
            }
            return if self.lift_code(InputCode::MainPointer, Some(position)) {
                RouteOutcome::Handled
            } else {
                RouteOutcome::Unhandled
            };
        }
        if self.lift_code(InputCode::Mouse(button), None) || self.mouse.contains_key(&button) {
            RouteOutcome::Handled
        } else {
            RouteOutcome::Unhandled
        }
    }

    pub fn mouse_motion(
        &mut self,
        position: Point,
        dx: i32,
        dy: i32,
        buttons: u32,
    ) -> RouteOutcome {
        self.pointer = position;
        if self.aim {
            return match &self.vision {
                Some(vision) => {
                    vision.control(dx, dy, false);
                    RouteOutcome::Handled
                }
                None => RouteOutcome::Unhandled,
            };
        }
        if buttons == 0 {
            return RouteOutcome::Unhandled;
        }
        match self.held.get_mut(&InputCode::MainPointer) {
            Some((id, point)) => {
                *point = position;
                self.ctx.touch(MotionAction::Move, *id, position);
                RouteOutcome::Handled
            }
            None => RouteOutcome::Unhandled,
        }
    }

    /// Scrollt an der letzten bekannten Zeigerposition
    pub fn wheel(&mut self, dx: i32, dy: i32) -> RouteOutcome {
        self.ctx.send(ControlIntent::Scroll {
            position: self.pointer,
            h_scroll: dx,
            v_scroll: dy,
        });
        RouteOutcome::Handled
    }

    /// Schaltet den Zielmodus um und beendet alle Gesten, die im neuen Modus
    /// keinen Sinn ergeben
    pub fn set_aim_mode(&mut self, aim: bool) {
        if self.aim == aim {
            return;
        }
        info!("Aim mode {}", if aim { "on" } else { "off" });
        self.aim = aim;
        self.stop_firing();
        for player in self.macros.values() {
            player.stop();
        }
        self.lift_code(InputCode::MainPointer, None);
        if !aim {
            if let Some(vision) = &self.vision {
                vision.release();
            }
        }
    }

    /// Hebt jeden gehaltenen Finger an und stoppt alle Gesten
    pub fn release_all(&mut self) {
        let codes: Vec<InputCode> = self.held.keys().copied().collect();
        if !codes.is_empty() {
            info!("Releasing {} held touches", codes.len());
        }
        for code in codes {
            self.lift_code(code, None);
        }
        self.stop_firing();
        for player in self.macros.values() {
            player.stop();
        }
        if let Some(direction) = &self.direction {
            direction.stop();
        }
        if let Some(vision) = &self.vision {
            vision.release();
        }
    }

    pub fn inject_keycode(&self, action: KeyAction, keycode: i32, meta_state: i32) -> bool {
        self.ctx.send(ControlIntent::Keycode {
            action,
            keycode,
            meta_state,
        })
    }

    pub fn inject_text(&self, text: impl Into<String>) -> bool {
        self.ctx.send(ControlIntent::Text(text.into()))
    }

    pub fn back_or_screen_on(&self) -> bool {
        self.ctx.send(ControlIntent::Command {
            action: COMMAND_BACK_OR_SCREEN_ON,
        })
    }

    /// Reicht einen beliebigen Frame unverändert durch
    pub fn send(&self, intent: ControlIntent) -> bool {
        self.ctx.send(intent)
    }

    fn press_gesture(&mut self, code: InputCode, gesture: &GestureDescriptor) -> RouteOutcome {
        match gesture {
            GestureDescriptor::Point(point) => {
                self.hold(code, *point);
                RouteOutcome::Handled
            }
            GestureDescriptor::VisiblePoint(point) => {
                self.hold(code, *point);
                RouteOutcome::ReleaseCursor
            }
            GestureDescriptor::Macro(points) => {
                let ctx = &self.ctx;
                self.macros
                    .entry(code)
                    .or_insert_with(|| MacroPlayer::new(ctx.clone(), points.clone()))
                    .play();
                RouteOutcome::Handled
            }
        }
    }

    /// DOWN beim ersten Drücken, MOVE wenn der Code schon einen Finger hält
    fn hold(&mut self, code: InputCode, point: Point) {
        if let Some((id, held_point)) = self.held.get_mut(&code) {
            *held_point = point;
            self.ctx.touch(MotionAction::Move, *id, point);
            return;
        }
        if let Some(id) = self.ctx.press(point) {
            debug!("{} holds finger {}", code, id);
            self.held.insert(code, (id, point));
        }
    }

    /// UP für den Finger eines Codes; `false` wenn er keinen hält
    ///
    /// Ist die Queue voll, bleibt der Finger eingetragen, damit ein späteres
    /// Loslassen oder `release_all` das UP nachholt.
    fn lift_code(&mut self, code: InputCode, at: Option<Point>) -> bool {
        let Some((id, point)) = self.held.get_mut(&code) else {
            return false;
        };
        let id = *id;
        *point = at.unwrap_or(*point);
        if self.ctx.lift(id, *point) {
            self.held.remove(&code);
        } else {
            warn!("UP for {} deferred, finger {} stays held", code, id);
        }
        true
    }

    fn fire_press(&mut self) -> RouteOutcome {
        let Some(config) = self.fire_config.clone() else {
            return RouteOutcome::Unhandled;
        };
        match config.repeat_interval() {
            Some(interval) => {
                let ctx = &self.ctx;
                self.fire
                    .get_or_insert_with(|| ContinuousFire::new(ctx.clone(), config.point))
                    .start(interval);
            }
            None => self.hold(InputCode::Fire, config.point),
        }
        if let (Some(press), Some(vision)) = (config.gun_press, self.vision.as_ref()) {
            let ctx = &self.ctx;
            self.gun_press
                .get_or_insert_with(|| GunPress::new(ctx.clone(), vision.clone()))
                .start(press);
        }
        RouteOutcome::Handled
    }

    fn fire_release(&mut self) -> RouteOutcome {
        if self.fire_config.is_none() {
            return RouteOutcome::Unhandled;
        }
        self.stop_firing();
        RouteOutcome::Handled
    }

    fn stop_firing(&mut self) {
        if let Some(fire) = &self.fire {
            fire.stop();
        }
        if let Some(press) = &self.gun_press {
            press.stop();
        }
        self.lift_code(InputCode::Fire, None);
    }
}
