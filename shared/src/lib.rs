//! Wire vocabulary shared by the vehicle server and the operator client.
//!
//! The protocol is ASCII, one message per `\n`-terminated line. Clients send
//! [`Command`]s; the server answers with [`Reply`] lines and pushes a
//! [`Telemetry`] line to every session on each simulation tick.

mod protocol;
mod telemetry;

pub use protocol::{Command, Reply, ServerMessage};
pub use telemetry::{Direction, ParseError, Telemetry, Timestamp, VehicleSnapshot};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of payload bytes kept for one input line
pub const MAX_LINE: usize = 2048;
/// Maximum number of bytes kept from a `HELLO name=` label
pub const MAX_NAME: usize = 63;

pub const WELCOME: &str =
    "OK Welcome. Commands: HELLO|AUTH|ROLE?|LIST USERS|SPEED ...|TURN ...|QUIT";

/// The single privileged credential accepted by `AUTH`
pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin123";

/// Speed change applied by `SPEED UP` / `SLOW DOWN`
pub const SPEED_STEP: i32 = 5;

/// Authorization level of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Role {
    #[default]
    Observer,
    Admin,
}

impl Role {
    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Observer => f.write_str("OBSERVER"),
            Role::Admin => f.write_str("ADMIN"),
        }
    }
}

/// Returns true when the pair matches the privileged credential exactly
pub fn is_admin_credential(user: &str, password: &str) -> bool {
    user == ADMIN_USER && password == ADMIN_PASSWORD
}

/// Truncates `text` to at most `max` bytes without splitting a character
pub fn truncate_to_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
