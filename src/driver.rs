//! Line-oriented input script
//!
//! Stands in for a UI layer: every line is one input event for the router.
//!
//! ```text
//! key_down <code> [ctrl] [alt] [shift] [repeat]
//! key_up <code> [ctrl] [alt] [shift]
//! mouse_down <button> <x> <y>
//! mouse_up <button> <x> <y>
//! motion <x> <y> <dx> <dy> <buttons>
//! wheel <dx> <dy>
//! aim on|off
//! text <string>
//! back
//! sleep <ms>
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use crate::control::Point;
use crate::mapping::{InputRouter, Modifiers, MouseButton, RawInputEvent, RouteOutcome};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq)]
pub enum ScriptError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("missing argument '{0}'")]
    MissingArgument(&'static str),

    #[error("invalid value for '{name}': {value}")]
    InvalidArgument { name: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScriptCommand {
    Input(RawInputEvent),
    Aim(bool),
    Text(String),
    Back,
    Sleep(Duration),
}

/// Parses one script line; `Ok(None)` for blank lines and comments.
pub fn parse_line(line: &str) -> Result<Option<ScriptCommand>, ScriptError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let mut args = rest.split_whitespace();

    let parsed = match command {
        "key_down" => {
            let code = arg(&mut args, "code")?;
            let (modifiers, repeat) = flags(args)?;
            ScriptCommand::Input(RawInputEvent::KeyDown {
                code,
                modifiers,
                repeat,
            })
        }
        "key_up" => {
            let code = arg(&mut args, "code")?;
            let (modifiers, _) = flags(args)?;
            ScriptCommand::Input(RawInputEvent::KeyUp { code, modifiers })
        }
        "mouse_down" | "mouse_up" => {
            let button: MouseButton = arg(&mut args, "button")?;
            let position = Point::new(arg(&mut args, "x")?, arg(&mut args, "y")?);
            ScriptCommand::Input(if command == "mouse_down" {
                RawInputEvent::MouseDown { button, position }
            } else {
                RawInputEvent::MouseUp { button, position }
            })
        }
        "motion" => ScriptCommand::Input(RawInputEvent::MouseMotion {
            position: Point::new(arg(&mut args, "x")?, arg(&mut args, "y")?),
            dx: arg(&mut args, "dx")?,
            dy: arg(&mut args, "dy")?,
            buttons: arg(&mut args, "buttons")?,
        }),
        "wheel" => ScriptCommand::Input(RawInputEvent::Wheel {
            dx: arg(&mut args, "dx")?,
            dy: arg(&mut args, "dy")?,
        }),
        "aim" => match args.next() {
            Some("on") => ScriptCommand::Aim(true),
            Some("off") => ScriptCommand::Aim(false),
            Some(other) => {
                return Err(ScriptError::InvalidArgument {
                    name: "aim",
                    value: other.to_string(),
                })
            }
            None => return Err(ScriptError::MissingArgument("on|off")),
        },
        "text" => ScriptCommand::Text(rest.trim().to_string()),
        "back" => ScriptCommand::Back,
        "sleep" => ScriptCommand::Sleep(Duration::from_millis(arg(&mut args, "ms")?)),
        other => return Err(ScriptError::UnknownCommand(other.to_string())),
    };
    Ok(Some(parsed))
}

fn arg<'a, T: FromStr>(
    args: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<T, ScriptError> {
    let value = args.next().ok_or(ScriptError::MissingArgument(name))?;
    value.parse().map_err(|_| ScriptError::InvalidArgument {
        name,
        value: value.to_string(),
    })
}

fn flags<'a>(args: impl Iterator<Item = &'a str>) -> Result<(Modifiers, bool), ScriptError> {
    let mut modifiers = Modifiers::NONE;
    let mut repeat = false;
    for flag in args {
        match flag {
            "ctrl" => modifiers.ctrl = true,
            "alt" => modifiers.alt = true,
            "shift" => modifiers.shift = true,
            "repeat" => repeat = true,
            other => {
                return Err(ScriptError::InvalidArgument {
                    name: "modifier",
                    value: other.to_string(),
                })
            }
        }
    }
    Ok((modifiers, repeat))
}

/// Feeds `reader` line by line into `router` until EOF. Bad lines are logged
/// and skipped. Returns the number of executed commands.
pub async fn drive<R: AsyncBufRead + Unpin>(
    reader: R,
    router: &mut InputRouter,
) -> std::io::Result<usize> {
    let mut lines = reader.lines();
    let mut executed = 0;
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                warn!("Line {}: {}", line_no, e);
                continue;
            }
        };
        debug!("Line {}: {:?}", line_no, command);
        execute(command, router).await;
        executed += 1;
    }

    info!("Input script finished after {} commands", executed);
    Ok(executed)
}

async fn execute(command: ScriptCommand, router: &mut InputRouter) {
    match command {
        ScriptCommand::Input(event) => match router.route(event) {
            RouteOutcome::ReleaseCursor => router.set_aim_mode(false),
            RouteOutcome::AimChanged(aim) => debug!("Aim toggled by shortcut: {}", aim),
            RouteOutcome::Unhandled => debug!("Input not bound"),
            RouteOutcome::Handled => {}
        },
        ScriptCommand::Aim(aim) => router.set_aim_mode(aim),
        ScriptCommand::Text(text) => {
            router.inject_text(text);
        }
        ScriptCommand::Back => {
            router.back_or_screen_on();
        }
        ScriptCommand::Sleep(duration) => tokio::time::sleep(duration).await,
    }
}
