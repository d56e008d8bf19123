use shared::ServerMessage;

/// Formats one server message for the terminal.
///
/// Replies are echoed as received. Telemetry is shown either as a compact
/// summary or, with `json`, as one JSON object per line.
pub fn render(message: &ServerMessage, json: bool) -> String {
    match message {
        ServerMessage::Telemetry(tlm) if json => {
            serde_json::to_string(tlm).unwrap_or_else(|_| tlm.to_string())
        }
        ServerMessage::Telemetry(tlm) => format!(
            "[telemetry] speed {:>3} | battery {:>3}% | temp {:>3} | heading {}",
            tlm.speed, tlm.battery, tlm.temp, tlm.dir
        ),
        ServerMessage::Ok(msg) => format!("OK {}", msg),
        ServerMessage::Err(reason) => format!("ERR {}", reason),
        ServerMessage::Bye => "BYE".to_string(),
        ServerMessage::User(peer) => format!("  user {}", peer),
        ServerMessage::Other(line) => line.clone(),
    }
}
