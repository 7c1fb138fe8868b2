//! Classification of drone JSON documents into telemetry events.
//!
//! Firmware builds disagree on field names (`percent` vs `battery.percent`,
//! `speed` vs `vel`, ...), so each event kind looks at its own set of keys and
//! a single document can yield several events. Anything that is missing or
//! not a finite number is skipped, never an error.
use std::borrow::Cow;

use serde_json::{Map, Value};
use skylink_proto::{ModeAck, TelemetryEvent};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

type Doc = Map<String, Value>;

/// Decodes one extracted object. Events come back in a fixed order:
/// mode ack, heartbeat, local position, global position, battery, speed.
pub fn decode(text: &str) -> Result<Vec<TelemetryEvent>, DecodeError> {
    let doc: Doc = serde_json::from_str(&null_non_finite(text))?;

    let candidates = [
        mode_ack(&doc),
        heartbeat(&doc),
        local_position(&doc),
        global_position(&doc),
        battery(&doc),
        speed(&doc),
    ];

    Ok(candidates
        .into_iter()
        .flatten()
        .filter(|ev| {
            let ok = ev.is_finite();
            if !ok {
                warn!("decode: dropping non-finite {} event", ev.name());
            }
            ok
        })
        .collect())
}

/// Rewrites `NaN`, `Infinity`, `-Infinity` and numeric literals that
/// overflow f64 to `null`, outside string literals only. The firmware emits
/// these and a single one must not cost the rest of the document.
fn null_non_finite(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    let mut out = String::new();
    let mut copied = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            match (escaped, b) {
                (true, _) => escaped = false,
                (false, b'\\') => escaped = true,
                (false, b'"') => in_string = false,
                _ => {}
            }
            i += 1;
            continue;
        }

        let token_len = match b {
            b'"' => {
                in_string = true;
                i += 1;
                continue;
            }
            b'N' | b'I' | b'-' | b'+' | b'0'..=b'9' => bytes[i..]
                .iter()
                .take_while(|&&c| c.is_ascii_alphanumeric() || matches!(c, b'-' | b'+' | b'.'))
                .count(),
            _ => 0,
        };
        if token_len == 0 {
            i += 1;
            continue;
        }

        let token = &text[i..i + token_len];
        let non_finite = matches!(token, "NaN" | "-NaN" | "Infinity" | "-Infinity" | "+Infinity")
            || token.parse::<f64>().map_or(false, |f| !f.is_finite());
        if non_finite {
            out.push_str(&text[copied..i]);
            out.push_str("null");
            copied = i + token_len;
        }
        i += token_len;
    }

    if copied == 0 {
        return Cow::Borrowed(text);
    }
    out.push_str(&text[copied..]);
    Cow::Owned(out)
}

/// Loose boolean used by the firmware for `hb` and `status`.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f.trunc() == 1.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "t" | "yes" | "y"),
        _ => false,
    }
}

fn num(v: Option<&Value>) -> Option<f64> {
    v.and_then(Value::as_f64).filter(|f| f.is_finite())
}

fn text(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn mode_ack(doc: &Doc) -> Option<TelemetryEvent> {
    if doc.get("event").and_then(Value::as_str) != Some("mode_push") {
        return None;
    }
    Some(TelemetryEvent::ModeAck(ModeAck {
        ok: doc.get("status").map_or(false, truthy),
        mode: text(doc.get("mode")).to_uppercase(),
        message: text(doc.get("msg")),
    }))
}

fn heartbeat(doc: &Doc) -> Option<TelemetryEvent> {
    doc.get("hb").filter(|v| truthy(v)).map(|_| TelemetryEvent::Heartbeat)
}

fn local_position(doc: &Doc) -> Option<TelemetryEvent> {
    Some(TelemetryEvent::LocalPosition {
        x: num(doc.get("x"))?,
        y: num(doc.get("y"))?,
        z: num(doc.get("z"))?,
    })
}

fn global_position(doc: &Doc) -> Option<TelemetryEvent> {
    Some(TelemetryEvent::GlobalPosition {
        lat: num(doc.get("lat"))?,
        lon: num(doc.get("lon"))?,
        alt: num(doc.get("alt"))?,
    })
}

/// Fractions (<= 1.0) are scaled to percent. Values outside 0..=100 after
/// scaling are treated as unresolved so the next source gets a chance.
fn normalize_percent(raw: f64) -> Option<f64> {
    let pct = if raw <= 1.0 { raw * 100.0 } else { raw };
    (0.0..=100.0).contains(&pct).then_some(pct)
}

fn battery(doc: &Doc) -> Option<TelemetryEvent> {
    let nested = doc.get("battery").and_then(Value::as_object);

    let percent = nested
        .and_then(|b| num(b.get("percent")))
        .and_then(normalize_percent)
        .or_else(|| num(doc.get("percent")).and_then(normalize_percent))
        .or_else(|| num(doc.get("battery")).and_then(normalize_percent));

    let voltage = nested
        .and_then(|b| num(b.get("voltage")))
        .or_else(|| num(doc.get("voltage")))
        .or_else(|| num(doc.get("volt")));

    if percent.is_none() && voltage.is_none() {
        return None;
    }
    Some(TelemetryEvent::Battery { percent, voltage })
}

fn speed(doc: &Doc) -> Option<TelemetryEvent> {
    num(doc.get("speed"))
        .or_else(|| num(doc.get("vel")))
        .map(|value| TelemetryEvent::Speed { value })
}
