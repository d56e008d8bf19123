//! Role-gated command dispatch
//!
//! Maps a parsed [`Command`] onto the vehicle model or the session registry
//! and produces the reply for the requesting session. Observers receive
//! `ERR forbidden` for privileged commands before anything is touched.

use crate::session::SessionState;
use crate::session_registry::SessionRegistry;
use crate::vehicle::Vehicle;
use shared::{is_admin_credential, Command, Reply, Role, SPEED_STEP};

pub fn dispatch(
    command: &Command,
    session: &mut SessionState,
    vehicle: &Vehicle,
    registry: &SessionRegistry,
) -> Reply {
    if command.requires_admin() && !session.role.is_admin() {
        return Reply::forbidden();
    }

    match command {
        Command::Hello { name } => {
            if let Some(name) = name {
                session.set_name(name);
            }
            Reply::Ok(format!("hello {}", session.display_name()))
        }
        Command::Auth { user, password } => {
            if is_admin_credential(user, password) {
                session.role = Role::Admin;
                Reply::Ok("admin".to_string())
            } else {
                Reply::Err("invalid credentials".to_string())
            }
        }
        Command::RoleQuery => Reply::Ok(session.role.to_string()),
        Command::ListUsers => Reply::Users(registry.peers()),
        Command::SpeedUp => change_speed(vehicle, SPEED_STEP),
        Command::SlowDown => change_speed(vehicle, -SPEED_STEP),
        Command::TurnLeft => Reply::Ok(format!("dir={}", vehicle.apply_turn(true))),
        Command::TurnRight => Reply::Ok(format!("dir={}", vehicle.apply_turn(false))),
        Command::Quit => Reply::Bye,
        Command::Unknown => Reply::unknown(),
    }
}

fn change_speed(vehicle: &Vehicle, delta: i32) -> Reply {
    match vehicle.apply_speed_delta(delta) {
        Ok(speed) => Reply::Ok(format!("speed={}", speed)),
        Err(reason) => Reply::Err(reason.to_string()),
    }
}
