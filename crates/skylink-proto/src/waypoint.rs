use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub alt: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum WaypointError {
    #[error("waypoint is not an object")]
    NotAnObject,
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("{0} is not a finite number")]
    NotANumber(&'static str),
}

impl Waypoint {
    /// Builds a waypoint from a loosely-typed operator entry. Numbers and
    /// numeric strings are accepted; `alt` defaults to 0.
    pub fn from_value(v: &Value) -> Result<Self, WaypointError> {
        let obj = v.as_object().ok_or(WaypointError::NotAnObject)?;
        let field = |key: &'static str| -> Result<Option<f64>, WaypointError> {
            match obj.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(v) => coerce_f64(v).map(Some).ok_or(WaypointError::NotANumber(key)),
            }
        };
        let lat = field("lat")?.ok_or(WaypointError::Missing("lat"))?;
        let lon = field("lon")?.ok_or(WaypointError::Missing("lon"))?;
        let alt = field("alt")?.unwrap_or(0.0);
        Ok(Self { lat, lon, alt })
    }
}

fn coerce_f64(v: &Value) -> Option<f64> {
    let f = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn alt_defaults_to_zero() {
        let wp = Waypoint::from_value(&json!({"lat": 1, "lon": 2})).unwrap();
        assert_eq!(wp, Waypoint { lat: 1.0, lon: 2.0, alt: 0.0 });
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let wp = Waypoint::from_value(&json!({"lat": "10.75", "lon": 106.5, "alt": "12"})).unwrap();
        assert_eq!(wp, Waypoint { lat: 10.75, lon: 106.5, alt: 12.0 });
    }

    #[test]
    fn rejects_incomplete_entries() {
        assert_eq!(Waypoint::from_value(&json!({"lon": 3})), Err(WaypointError::Missing("lat")));
        assert_eq!(Waypoint::from_value(&json!({"lat": 3})), Err(WaypointError::Missing("lon")));
        assert_eq!(
            Waypoint::from_value(&json!({"lat": "north", "lon": 3})),
            Err(WaypointError::NotANumber("lat"))
        );
        assert_eq!(Waypoint::from_value(&json!([1, 2])), Err(WaypointError::NotAnObject));
    }
}
