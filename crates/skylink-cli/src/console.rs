use serde::Serialize;
use skylink_core::LinkObserver;
use skylink_proto::{ModeAck, TelemetryEvent};
use tracing::warn;

/// Prints every notification as one JSON line on stdout.
pub struct ConsoleObserver;

#[derive(Serialize)]
struct Record<'a, T: Serialize> {
    ts_unix_ms: i64,
    topic: &'static str,
    #[serde(flatten)]
    data: &'a T,
}

#[derive(Serialize)]
struct LinkNotice {
    up: bool,
}

fn now_unix_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

impl ConsoleObserver {
    fn emit<T: Serialize>(&self, topic: &'static str, data: &T) {
        let rec = Record { ts_unix_ms: now_unix_ms(), topic, data };
        match serde_json::to_string(&rec) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("console: cannot encode {}: {}", topic, e),
        }
    }
}

impl LinkObserver for ConsoleObserver {
    fn on_telemetry(&self, event: &TelemetryEvent) {
        self.emit("telemetry", event);
    }

    fn on_link_state(&self, up: bool) {
        self.emit("link", &LinkNotice { up });
    }

    fn on_mode_ack(&self, ack: &ModeAck) {
        self.emit("mode_ack", ack);
    }
}
