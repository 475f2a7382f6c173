//! Line commands read from stdin, standing in for the rotary encoder and
//! touch surface.

use anyhow::{bail, Context, Result};
use knob_core::{Action, InputEvent};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Raw input, resolved through the manifest like hardware input.
    Input(InputEvent),
    /// A named action, sent straight to the bridge.
    Action(Action),
    SelectZone(String),
    ListZones,
    Network { up: bool },
    Poll,
    Status,
    Quit,
}

pub const HELP: &str = "\
commands:
  +N / -N               rotate N ticks clockwise / counter-clockwise
  press | long_press | double_tap | swipe_left | swipe_right
  play | pause | toggle | next | prev
  zone <id>             switch zone
  zones                 list zones
  net up|down           simulate network changes
  poll                  poll now
  status                show connection state
  quit
  <action> [json]       send any other action, with optional JSON params";

/// Parses one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    if word.starts_with('+') || word.starts_with('-') {
        let ticks: i32 = word
            .parse()
            .with_context(|| format!("'{}' is not a tick count", word))?;
        if ticks == 0 {
            bail!("tick count must not be zero");
        }
        return Ok(Some(Command::Input(InputEvent::Rotate(ticks))));
    }

    let command = match word {
        "press" => Command::Input(InputEvent::Press),
        "long_press" => Command::Input(InputEvent::LongPress),
        "double_tap" => Command::Input(InputEvent::DoubleTap),
        "swipe_left" => Command::Input(InputEvent::SwipeLeft),
        "swipe_right" => Command::Input(InputEvent::SwipeRight),
        "zone" => {
            if rest.is_empty() {
                bail!("usage: zone <id>");
            }
            Command::SelectZone(rest.to_string())
        }
        "zones" => Command::ListZones,
        "net" => match rest {
            "up" => Command::Network { up: true },
            "down" => Command::Network { up: false },
            _ => bail!("usage: net up|down"),
        },
        "poll" => Command::Poll,
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        action => {
            let params = if rest.is_empty() {
                None
            } else {
                Some(
                    serde_json::from_str::<Value>(rest)
                        .with_context(|| format!("params for '{}' are not JSON", action))?,
                )
            };
            Command::Action(Action::from_name(action, params))
        }
    };
    Ok(Some(command))
}
