use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Compass heading of the vehicle, cycling N -> E -> S -> W -> N
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    N,
    E,
    S,
    W,
}

impl Direction {
    /// One quadrant counter-clockwise
    pub fn left(self) -> Self {
        match self {
            Direction::N => Direction::W,
            Direction::W => Direction::S,
            Direction::S => Direction::E,
            Direction::E => Direction::N,
        }
    }

    /// One quadrant clockwise
    pub fn right(self) -> Self {
        match self {
            Direction::N => Direction::E,
            Direction::E => Direction::S,
            Direction::S => Direction::W,
            Direction::W => Direction::N,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::N => "N",
            Direction::E => "E",
            Direction::S => "S",
            Direction::W => "W",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "N" => Ok(Direction::N),
            "E" => Ok(Direction::E),
            "S" => Ok(Direction::S),
            "W" => Ok(Direction::W),
            other => Err(ParseError::UnknownDirection(other.to_string())),
        }
    }
}

/// Consistent read of the four vehicle fields taken under one lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub speed: u8,
    pub battery: u8,
    pub temp: i32,
    pub dir: Direction,
}

/// The `ts=` value of a telemetry line.
///
/// This server stamps epoch seconds. Older servers sent local wall-clock time
/// as `YYYY-MM-DD HH:MM:SS`; both sort correctly within their own form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Epoch(u64),
    Local(String),
}

impl Timestamp {
    pub fn as_epoch(&self) -> Option<u64> {
        match self {
            Timestamp::Epoch(secs) => Some(*secs),
            Timestamp::Local(_) => None,
        }
    }
}

impl From<u64> for Timestamp {
    fn from(secs: u64) -> Self {
        Timestamp::Epoch(secs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Epoch(secs) => write!(f, "{}", secs),
            Timestamp::Local(text) => f.write_str(text),
        }
    }
}

/// True for `YYYY-MM-DD HH:MM:SS`
fn is_local_datetime(text: &str) -> bool {
    const LAYOUT: &[u8; 19] = b"dddd-dd-dd dd:dd:dd";
    text.len() == LAYOUT.len()
        && text.bytes().zip(LAYOUT.iter()).all(|(c, &slot)| match slot {
            b'd' => c.is_ascii_digit(),
            sep => c == sep,
        })
}

impl FromStr for Timestamp {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if let Ok(secs) = text.parse() {
            return Ok(Timestamp::Epoch(secs));
        }
        if is_local_datetime(text) {
            return Ok(Timestamp::Local(text.to_string()));
        }
        Err(ParseError::InvalidValue {
            field: "ts",
            value: text.to_string(),
        })
    }
}

/// One `TLM` broadcast: a vehicle snapshot and the time it was taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    pub speed: u8,
    pub battery: u8,
    pub temp: i32,
    pub dir: Direction,
    pub ts: Timestamp,
}

impl Telemetry {
    pub fn new(snapshot: VehicleSnapshot, ts: impl Into<Timestamp>) -> Self {
        Self {
            speed: snapshot.speed,
            battery: snapshot.battery,
            temp: snapshot.temp,
            dir: snapshot.dir,
            ts: ts.into(),
        }
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        VehicleSnapshot {
            speed: self.speed,
            battery: self.battery,
            temp: self.temp,
            dir: self.dir,
        }
    }

    /// Formats the line as sent on the wire, including the terminator
    pub fn to_wire(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TLM speed={};battery={};temp={};dir={};ts={}",
            self.speed, self.battery, self.temp, self.dir, self.ts
        )
    }
}

/// Errors produced while parsing server lines on the client side
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line does not start with TLM")]
    MissingPrefix,
    #[error("missing telemetry field `{0}`")]
    MissingField(&'static str),
    #[error("invalid value `{value}` for `{field}`")]
    InvalidValue { field: &'static str, value: String },
    #[error("unknown direction `{0}`")]
    UnknownDirection(String),
}

fn parse_field<T: FromStr>(field: &'static str, value: Option<&str>) -> Result<T, ParseError> {
    let value = value.ok_or(ParseError::MissingField(field))?;
    value.parse().map_err(|_| ParseError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

impl FromStr for Telemetry {
    type Err = ParseError;

    /// Parses `TLM speed=..;battery=..;temp=..;dir=..;ts=..`.
    ///
    /// Keys may come in any order and unknown keys are ignored, so older
    /// clients keep working if the server grows extra fields.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let body = line
            .trim()
            .strip_prefix("TLM")
            .ok_or(ParseError::MissingPrefix)?
            .trim_start();

        let mut speed = None;
        let mut battery = None;
        let mut temp = None;
        let mut dir = None;
        let mut ts = None;

        for pair in body.split(';') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "speed" => speed = Some(value),
                "battery" => battery = Some(value),
                "temp" => temp = Some(value),
                "dir" => dir = Some(value),
                "ts" => ts = Some(value),
                _ => {}
            }
        }

        Ok(Telemetry {
            speed: parse_field("speed", speed)?,
            battery: parse_field("battery", battery)?,
            temp: parse_field("temp", temp)?,
            dir: dir.ok_or(ParseError::MissingField("dir"))?.parse()?,
            ts: parse_field("ts", ts)?,
        })
    }
}
