//! Line-oriented operator commands.
//!
//! The binary reads these from stdin; a graphical front end would feed the
//! same [`OperatorCommand`]s from pointer and button events.

use std::str::FromStr;

use turret_protocol::{Axis, UnknownVariant};

use crate::mapper::SurfaceRect;

/// Pad radius used when `joy` is given without one.
pub const DEFAULT_PAD_RADIUS: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Click { x: f64, y: f64 },
    PointerMove { x: f64, y: f64 },
    PointerLeave,
    Axis { axis: Axis, value: f64 },
    Joystick { dx: f64, dy: f64, radius: f64 },
    ToggleFollow,
    Track,
    Manual,
    Target(String),
    Laser,
    Fire,
    Home,
    Model(String),
    Layout(SurfaceRect),
    Visible,
    Hidden,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OperatorParseError {
    #[error("unknown command '{0}' (try 'help')")]
    UnknownCommand(String),
    #[error("{command}: missing {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("{command}: unexpected argument '{extra}'")]
    TrailingArgument { command: &'static str, extra: String },
    #[error("{argument}: '{value}' is not a number")]
    InvalidNumber {
        argument: &'static str,
        value: String,
    },
    #[error(transparent)]
    Variant(#[from] UnknownVariant),
}

pub const HELP: &str = "\
commands:
  click X Y              click the video surface at screen position X,Y
  move X Y               pointer hover (streams aim points in follow mode)
  leave                  pointer left the video surface
  axis pan|tilt DEG      move a slider
  joy DX DY [RADIUS]     drag the joystick pad
  follow                 toggle cursor-follow
  track                  start autonomous tracking
  manual                 back to manual
  target LABEL           choose the tracking target
  laser | fire | home    actuators
  model NAME             switch detection model
  layout L T W H         video surface rectangle on screen
  visible | hidden       console foregrounded / backgrounded
  status                 show turret and session state
  quit";

struct Args<'a> {
    command: &'static str,
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn word(&mut self, argument: &'static str) -> Result<&'a str, OperatorParseError> {
        self.tokens.next().ok_or(OperatorParseError::MissingArgument {
            command: self.command,
            argument,
        })
    }

    fn number(&mut self, argument: &'static str) -> Result<f64, OperatorParseError> {
        let raw = self.word(argument)?;
        parse_number(argument, raw)
    }

    fn optional_number(&mut self, argument: &'static str) -> Result<Option<f64>, OperatorParseError> {
        self.tokens
            .next()
            .map(|raw| parse_number(argument, raw))
            .transpose()
    }

    fn rest(&mut self, argument: &'static str) -> Result<String, OperatorParseError> {
        let words: Vec<&str> = self.tokens.by_ref().collect();
        if words.is_empty() {
            return Err(OperatorParseError::MissingArgument {
                command: self.command,
                argument,
            });
        }
        Ok(words.join(" "))
    }

    fn finish<T>(mut self, value: T) -> Result<T, OperatorParseError> {
        match self.tokens.next() {
            Some(extra) => Err(OperatorParseError::TrailingArgument {
                command: self.command,
                extra: extra.to_string(),
            }),
            None => Ok(value),
        }
    }
}

fn parse_number(argument: &'static str, raw: &str) -> Result<f64, OperatorParseError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| OperatorParseError::InvalidNumber {
            argument,
            value: raw.to_string(),
        })
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<OperatorCommand>, OperatorParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut tokens = line.split_whitespace();
    let Some(head) = tokens.next() else {
        return Ok(None);
    };
    let name = canonical(head).ok_or_else(|| OperatorParseError::UnknownCommand(head.to_string()))?;
    let mut args = Args {
        command: name,
        tokens,
    };

    let cmd = match name {
        "click" => {
            let x = args.number("x")?;
            let y = args.number("y")?;
            OperatorCommand::Click { x, y }
        }
        "move" => {
            let x = args.number("x")?;
            let y = args.number("y")?;
            OperatorCommand::PointerMove { x, y }
        }
        "leave" => OperatorCommand::PointerLeave,
        "axis" => {
            let axis = Axis::from_str(args.word("axis")?)?;
            let value = args.number("degrees")?;
            OperatorCommand::Axis { axis, value }
        }
        "joy" => {
            let dx = args.number("dx")?;
            let dy = args.number("dy")?;
            let radius = args.optional_number("radius")?.unwrap_or(DEFAULT_PAD_RADIUS);
            OperatorCommand::Joystick { dx, dy, radius }
        }
        "follow" => OperatorCommand::ToggleFollow,
        "track" => OperatorCommand::Track,
        "manual" => OperatorCommand::Manual,
        "target" => return Ok(Some(OperatorCommand::Target(args.rest("label")?))),
        "laser" => OperatorCommand::Laser,
        "fire" => OperatorCommand::Fire,
        "home" => OperatorCommand::Home,
        "model" => OperatorCommand::Model(args.word("model")?.to_string()),
        "layout" => {
            let left = args.number("left")?;
            let top = args.number("top")?;
            let width = args.number("width")?;
            let height = args.number("height")?;
            OperatorCommand::Layout(SurfaceRect::new(left, top, width, height))
        }
        "visible" => OperatorCommand::Visible,
        "hidden" => OperatorCommand::Hidden,
        "status" => OperatorCommand::Status,
        "help" => OperatorCommand::Help,
        _ => OperatorCommand::Quit,
    };
    args.finish(Some(cmd))
}

fn canonical(word: &str) -> Option<&'static str> {
    let name = match word.to_ascii_lowercase().as_str() {
        "click" => "click",
        "move" => "move",
        "leave" => "leave",
        "axis" => "axis",
        "joy" | "joystick" => "joy",
        "follow" => "follow",
        "track" | "tracking" => "track",
        "manual" => "manual",
        "target" => "target",
        "laser" => "laser",
        "fire" => "fire",
        "home" => "home",
        "model" => "model",
        "layout" => "layout",
        "visible" => "visible",
        "hidden" => "hidden",
        "status" => "status",
        "help" | "?" => "help",
        "quit" | "exit" => "quit",
        _ => return None,
    };
    Some(name)
}
