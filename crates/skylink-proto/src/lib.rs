//! Wire types shared by the ground link engine and its collaborators.

pub mod command;
pub mod telemetry;
pub mod waypoint;

pub use command::{Mode, ModeCommand, WaypointUpload};
pub use telemetry::{ModeAck, TelemetryEvent};
pub use waypoint::{Waypoint, WaypointError};
