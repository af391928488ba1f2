//! Parsing of the per-step prompt line.

use repflow_core::{
    DistanceUnit, HeightUnit, LoadUnit, Measurements, PaceUnit, Quantity, TimeUnit,
};
use std::str::FromStr;

/// Field edits typed at the prompt, applied over the defaults
#[derive(Debug, Default, PartialEq)]
pub struct Edits {
    pub measurements: Measurements,
    pub note: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum Command {
    /// Log the set with the pre-filled values
    Accept,
    Log(Edits),
    Back,
    GoTo(usize),
    Swap(String),
    Pause,
    Quit,
    Help,
}

pub fn parse_command(line: &str, default_load: LoadUnit) -> Result<Command, String> {
    let line = line.trim();
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    match head.to_lowercase().as_str() {
        "" => Ok(Command::Accept),
        "b" | "back" => Ok(Command::Back),
        "p" | "pause" => Ok(Command::Pause),
        "q" | "quit" => Ok(Command::Quit),
        "h" | "help" | "?" => Ok(Command::Help),
        "swap" if !rest.is_empty() => Ok(Command::Swap(rest.to_string())),
        "swap" => Err("usage: swap <exercise-id>".into()),
        "goto" => rest
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .map(Command::GoTo)
            .ok_or_else(|| "usage: goto <step number>".to_string()),
        _ => parse_edits(line, default_load).map(Command::Log),
    }
}

fn parse_edits(line: &str, default_load: LoadUnit) -> Result<Edits, String> {
    let mut edits = Edits::default();

    // Everything after `note=` is the note, spaces included
    let (fields, note) = match line.find("note=") {
        Some(at) => (&line[..at], Some(line[at + 5..].trim().to_string())),
        None => (line, None),
    };
    edits.note = note;

    for token in fields.split_whitespace() {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got '{}'", token))?;
        let m = &mut edits.measurements;
        match key.to_lowercase().as_str() {
            "reps" | "r" => {
                m.reps = Some(value.parse().map_err(|_| format!("bad reps '{}'", value))?)
            }
            "load" | "w" => m.load = Some(quantity(value, Some(default_load))?),
            "dist" | "distance" => m.distance = Some(quantity(value, Some(DistanceUnit::Meters))?),
            "time" | "t" => m.duration = Some(quantity(value, Some(TimeUnit::Seconds))?),
            "pace" => m.pace = Some(quantity::<PaceUnit>(value, None)?),
            "height" => m.height = Some(quantity(value, Some(HeightUnit::Centimeters))?),
            "cal" | "calories" => {
                m.calories = Some(value.parse().map_err(|_| format!("bad calories '{}'", value))?)
            }
            other => return Err(format!("unknown field '{}'", other)),
        }
    }

    Ok(edits)
}

/// Parse `100kg`, `2.5km`, `100` (with a default unit)
fn quantity<U>(value: &str, default_unit: Option<U>) -> Result<Quantity<U>, String>
where
    U: FromStr<Err = String>,
{
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);

    let number: f64 = number
        .parse()
        .map_err(|_| format!("bad number in '{}'", value))?;
    let unit = match (unit.is_empty(), default_unit) {
        (false, _) => unit.parse()?,
        (true, Some(unit)) => unit,
        (true, None) => return Err(format!("'{}' needs a unit", value)),
    };

    Ok(Quantity::new(number, unit))
}

pub const HELP: &str = "\
  Enter          log the set with the values shown
  reps=5 load=100kg dist=400m time=90s pace=5min/km height=60cm cal=12
                 log with these fields changed (note=... takes the rest of the line)
  b              go back one step
  goto N         jump to step N
  swap ID        replace this exercise with another from the library
  p              pause / resume
  q              finish the session now";
