use serde::{Deserialize, Serialize};

/// Mode acknowledgement pushed by the drone (or manufactured on ack timeout).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeAck {
    pub ok: bool,
    pub mode: String,
    pub message: String,
}

impl ModeAck {
    pub const TIMEOUT_MESSAGE: &'static str = "No ACK (timeout)";

    /// Failed ack emitted when a dispatch runs out of attempts.
    pub fn timed_out(mode: impl Into<String>) -> Self {
        Self { ok: false, mode: mode.into(), message: Self::TIMEOUT_MESSAGE.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEvent {
    LocalPosition { x: f64, y: f64, z: f64 },
    GlobalPosition { lat: f64, lon: f64, alt: f64 },
    Battery {
        /// 0-100, `None` when the frame carried no usable percentage.
        percent: Option<f64>,
        /// Volts
        voltage: Option<f64>,
    },
    Speed { value: f64 },
    ModeAck(ModeAck),
    Heartbeat,
}

impl TelemetryEvent {
    /// Percent value reported when a battery frame has no percentage.
    pub const PERCENT_ABSENT: f64 = -1.0;

    /// True when every numeric field that is present is finite.
    pub fn is_finite(&self) -> bool {
        match self {
            TelemetryEvent::LocalPosition { x, y, z } => x.is_finite() && y.is_finite() && z.is_finite(),
            TelemetryEvent::GlobalPosition { lat, lon, alt } => {
                lat.is_finite() && lon.is_finite() && alt.is_finite()
            }
            TelemetryEvent::Battery { percent, voltage } => {
                percent.map_or(true, f64::is_finite) && voltage.map_or(true, f64::is_finite)
            }
            TelemetryEvent::Speed { value } => value.is_finite(),
            TelemetryEvent::ModeAck(_) | TelemetryEvent::Heartbeat => true,
        }
    }

    /// Fixed-arity `(percent, voltage)` view of a battery sample, with -1 and
    /// NaN standing in for the absent halves. `None` for other variants.
    pub fn battery_sentinels(&self) -> Option<(f64, f64)> {
        match self {
            TelemetryEvent::Battery { percent, voltage } => Some((
                percent.unwrap_or(Self::PERCENT_ABSENT),
                voltage.unwrap_or(f64::NAN),
            )),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TelemetryEvent::LocalPosition { .. } => "local_position",
            TelemetryEvent::GlobalPosition { .. } => "global_position",
            TelemetryEvent::Battery { .. } => "battery",
            TelemetryEvent::Speed { .. } => "speed",
            TelemetryEvent::ModeAck(_) => "mode_ack",
            TelemetryEvent::Heartbeat => "heartbeat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_sentinels_fill_absent_fields() {
        let ev = TelemetryEvent::Battery { percent: None, voltage: Some(11.1) };
        let (p, v) = ev.battery_sentinels().unwrap();
        assert_eq!(p, -1.0);
        assert_eq!(v, 11.1);

        let ev = TelemetryEvent::Battery { percent: Some(42.0), voltage: None };
        let (p, v) = ev.battery_sentinels().unwrap();
        assert_eq!(p, 42.0);
        assert!(v.is_nan());

        assert!(TelemetryEvent::Heartbeat.battery_sentinels().is_none());
    }

    #[test]
    fn non_finite_fields_are_detected() {
        assert!(!TelemetryEvent::Speed { value: f64::INFINITY }.is_finite());
        assert!(!TelemetryEvent::LocalPosition { x: 1.0, y: f64::NAN, z: 0.0 }.is_finite());
        assert!(TelemetryEvent::Battery { percent: None, voltage: None }.is_finite());
        assert!(!TelemetryEvent::Battery { percent: Some(f64::NAN), voltage: None }.is_finite());
    }

    #[test]
    fn serializes_with_kind_tag() {
        let js = serde_json::to_value(TelemetryEvent::Speed { value: 3.5 }).unwrap();
        assert_eq!(js, serde_json::json!({"kind": "speed", "value": 3.5}));

        let js = serde_json::to_value(TelemetryEvent::ModeAck(ModeAck::timed_out("LAND"))).unwrap();
        assert_eq!(js["kind"], "mode_ack");
        assert_eq!(js["ok"], false);
        assert_eq!(js["message"], "No ACK (timeout)");
    }
}
