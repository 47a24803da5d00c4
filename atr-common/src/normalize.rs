//! Message normalization
//!
//! Turns a raw, batch-shaped JSON payload into a canonical [`Envelope`]:
//! validates required fields (fail-fast, fixed order) and fills defaults.
//! Pure function; the only input besides the payload is the clock.

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::model::{Envelope, Observation};
use crate::time::Clock;

/// Required per-target fields, in the order they are checked
pub const REQUIRED_FIELDS: [&str; 6] = ["lat", "lon", "heading", "pitch", "roll", "distance_m"];

/// Validate and complete a raw payload.
///
/// Defaults applied:
/// - envelope `ts` = now, `count` = `targets.len()` (a supplied `count` is kept as-is)
/// - per target `ts` = now, `src_lat`/`src_lon` = `lat`/`lon`
///
/// "Absent" means missing or JSON `null`. The caller's value is not modified.
pub fn normalize(raw: Option<&Value>, clock: &dyn Clock) -> Result<Envelope, ValidationError> {
    let payload = match raw {
        None | Some(Value::Null) => return Err(ValidationError::MissingPayload),
        Some(Value::Object(map)) if map.is_empty() => return Err(ValidationError::MissingPayload),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(ValidationError::MissingTargets),
    };

    let raw_targets = match payload.get("targets") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Err(ValidationError::MissingTargets),
    };

    // Check every target before stamping anything so the first offender wins
    let mut required = Vec::with_capacity(raw_targets.len());
    for (index, item) in raw_targets.iter().enumerate() {
        required.push(required_fields(index, item)?);
    }

    let ts = match present(payload, "ts") {
        None => clock.now_unix(),
        Some(v) => v
            .as_f64()
            .ok_or(ValidationError::InvalidEnvelopeField { field: "ts" })?,
    };

    let count = match present(payload, "count") {
        None => raw_targets.len() as i64,
        Some(v) => v
            .as_i64()
            .ok_or(ValidationError::InvalidEnvelopeField { field: "count" })?,
    };

    let mut targets = Vec::with_capacity(raw_targets.len());
    for (index, (map, fields)) in required.into_iter().enumerate() {
        targets.push(complete_target(index, map, fields, clock)?);
    }

    Ok(Envelope { ts, count, targets })
}

/// Target object plus its six required values, in `REQUIRED_FIELDS` order.
///
/// A non-object element is reported as missing its first field.
fn required_fields(
    index: usize,
    item: &Value,
) -> Result<(&Map<String, Value>, [f64; 6]), ValidationError> {
    let Some(map) = item.as_object() else {
        return Err(ValidationError::MissingField { index, field: REQUIRED_FIELDS[0] });
    };
    let mut values = [0.0; 6];
    for (slot, field) in values.iter_mut().zip(REQUIRED_FIELDS) {
        let value = present(map, field).ok_or(ValidationError::MissingField { index, field })?;
        *slot = value
            .as_f64()
            .ok_or(ValidationError::InvalidField { index, field })?;
    }
    Ok((map, values))
}

fn complete_target(
    index: usize,
    map: &Map<String, Value>,
    [lat, lon, heading, pitch, roll, distance_m]: [f64; 6],
    clock: &dyn Clock,
) -> Result<Observation, ValidationError> {
    let optional_number = |field: &'static str| -> Result<Option<f64>, ValidationError> {
        present(map, field)
            .map(|v| v.as_f64().ok_or(ValidationError::InvalidField { index, field }))
            .transpose()
    };

    let src_lat = optional_number("src_lat")?.unwrap_or(lat);
    let src_lon = optional_number("src_lon")?.unwrap_or(lon);
    let ts = match optional_number("ts")? {
        Some(ts) => ts,
        None => clock.now_unix(),
    };
    let image = present(map, "image")
        .map(|v| {
            v.as_str()
                .map(str::to_owned)
                .ok_or(ValidationError::InvalidField { index, field: "image" })
        })
        .transpose()?;

    Ok(Observation {
        lat,
        lon,
        src_lat,
        src_lon,
        heading,
        pitch,
        roll,
        distance_m,
        ts,
        image,
    })
}

/// Field value if present and not null
fn present<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}
