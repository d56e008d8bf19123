//! Command grammar (client to server) and reply lines (server to client)

use crate::{truncate_to_bytes, Telemetry, MAX_NAME, WELCOME};
use std::fmt;

/// One classified input line. Matching is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `HELLO` with an optional `name=<text>` anywhere in the remainder
    Hello { name: Option<String> },
    /// `AUTH <user> <pass>`; missing tokens parse as empty strings
    Auth { user: String, password: String },
    /// `ROLE?`
    RoleQuery,
    /// `LIST USERS`
    ListUsers,
    /// `SPEED UP`
    SpeedUp,
    /// `SLOW DOWN`
    SlowDown,
    /// `TURN LEFT`
    TurnLeft,
    /// `TURN RIGHT`
    TurnRight,
    /// `QUIT`
    Quit,
    Unknown,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        match line {
            "QUIT" => return Command::Quit,
            "ROLE?" => return Command::RoleQuery,
            "LIST USERS" => return Command::ListUsers,
            "SPEED UP" => return Command::SpeedUp,
            "SLOW DOWN" => return Command::SlowDown,
            "TURN LEFT" => return Command::TurnLeft,
            "TURN RIGHT" => return Command::TurnRight,
            _ => {}
        }

        if line.starts_with("HELLO") {
            let name = line.find("name=").map(|at| {
                let value = line[at + "name=".len()..].trim_start_matches(' ');
                truncate_to_bytes(value, MAX_NAME).to_string()
            });
            return Command::Hello { name };
        }

        if let Some(rest) = line.strip_prefix("AUTH ") {
            let mut tokens = rest.split_whitespace();
            let user = tokens.next().unwrap_or_default().to_string();
            let password = tokens.next().unwrap_or_default().to_string();
            return Command::Auth { user, password };
        }

        Command::Unknown
    }

    /// Commands that only an ADMIN session may run
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Command::ListUsers
                | Command::SpeedUp
                | Command::SlowDown
                | Command::TurnLeft
                | Command::TurnRight
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Hello { name: Some(name) } => write!(f, "HELLO name={}", name),
            Command::Hello { name: None } => f.write_str("HELLO"),
            Command::Auth { user, password } => write!(f, "AUTH {} {}", user, password),
            Command::RoleQuery => f.write_str("ROLE?"),
            Command::ListUsers => f.write_str("LIST USERS"),
            Command::SpeedUp => f.write_str("SPEED UP"),
            Command::SlowDown => f.write_str("SLOW DOWN"),
            Command::TurnLeft => f.write_str("TURN LEFT"),
            Command::TurnRight => f.write_str("TURN RIGHT"),
            Command::Quit => f.write_str("QUIT"),
            Command::Unknown => Ok(()),
        }
    }
}

/// A server reply; may span several lines (`LIST USERS`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Welcome,
    Ok(String),
    Err(String),
    Bye,
    /// Member peers in listing order
    Users(Vec<String>),
}

impl Reply {
    pub fn forbidden() -> Self {
        Reply::Err("forbidden".to_string())
    }

    pub fn unknown() -> Self {
        Reply::Err("unknown".to_string())
    }

    /// Formats the reply as sent on the wire; every line ends with `\n`
    pub fn to_wire(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Welcome => f.write_str(WELCOME),
            Reply::Ok(msg) => write!(f, "OK {}", msg),
            Reply::Err(reason) => write!(f, "ERR {}", reason),
            Reply::Bye => f.write_str("BYE"),
            Reply::Users(peers) => {
                write!(f, "OK {} users", peers.len())?;
                for peer in peers {
                    // ROLE and NAME are not tracked by the registry
                    write!(f, "\nUSER {} ROLE=? NAME=?", peer)?;
                }
                Ok(())
            }
        }
    }
}

/// A line received by a client, classified by its leading keyword
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Telemetry(Telemetry),
    Ok(String),
    Err(String),
    Bye,
    /// One `USER <peer> ...` row of a listing
    User(String),
    Other(String),
}

impl ServerMessage {
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);

        if line == "BYE" {
            return ServerMessage::Bye;
        }
        if line.starts_with("TLM") {
            return match line.parse() {
                Ok(telemetry) => ServerMessage::Telemetry(telemetry),
                Err(_) => ServerMessage::Other(line.to_string()),
            };
        }
        if let Some(msg) = line.strip_prefix("OK ") {
            return ServerMessage::Ok(msg.to_string());
        }
        if let Some(reason) = line.strip_prefix("ERR ") {
            return ServerMessage::Err(reason.to_string());
        }
        if let Some(rest) = line.strip_prefix("USER ") {
            let peer = rest.split_whitespace().next().unwrap_or_default();
            return ServerMessage::User(peer.to_string());
        }
        ServerMessage::Other(line.to_string())
    }
}
