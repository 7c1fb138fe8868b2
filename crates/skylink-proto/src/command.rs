use serde::{Deserialize, Serialize};

use crate::waypoint::Waypoint;

/// Session sentinels. Bare tokens, not documents.
pub const SESSION_ON: &[u8] = b"ON\n";
pub const SESSION_OFF: &[u8] = b"OFF\n";

/// Flight modes the ground station may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Offboard,
    Land,
}

impl Mode {
    /// Value of the `cmd` field sent to the drone.
    pub fn cmd(self) -> &'static str {
        match self {
            Mode::Offboard => "offboard",
            Mode::Land => "land",
        }
    }

    /// Token the drone echoes back in `mode_push`.
    pub fn ack_token(self) -> String {
        self.cmd().to_uppercase()
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offboard" => Ok(Mode::Offboard),
            "land" => Ok(Mode::Land),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeCommand {
    pub cmd: Mode,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaypointUpload<'a> {
    pub coord: &'static str,
    pub waypoints: &'a [Waypoint],
}

impl<'a> WaypointUpload<'a> {
    pub fn gps(waypoints: &'a [Waypoint]) -> Self {
        Self { coord: "gps", waypoints }
    }
}

/// Compact JSON document followed by the frame delimiter.
pub fn encode_line<T: Serialize>(doc: &T) -> serde_json::Result<Vec<u8>> {
    let mut out = serde_json::to_vec(doc)?;
    out.push(b'\n');
    Ok(out)
}
