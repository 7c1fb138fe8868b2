use skylink_proto::{ModeAck, TelemetryEvent};

/// Consumer of everything the link reports (GUI bridge, console, tests).
///
/// Callbacks run on the link's own tasks and should return quickly. They
/// must not block on the link itself.
pub trait LinkObserver: Send + Sync + 'static {
    /// Decoded telemetry, except mode acks.
    fn on_telemetry(&self, _event: &TelemetryEvent) {}

    /// Emitted only when the link state changes.
    fn on_link_state(&self, _up: bool) {}

    /// Organic acks from the drone and synthetic timeout failures.
    fn on_mode_ack(&self, _ack: &ModeAck) {}
}

/// Observer that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl LinkObserver for NullObserver {}
