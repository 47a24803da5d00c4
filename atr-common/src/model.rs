//! Wire model published to the broker
//!
//! Key names and field order are the compatibility contract with downstream
//! consumers: `ts, count, targets[]` and per target
//! `lat, lon, src_lat, src_lon, heading, pitch, roll, distance_m, ts, image`.

use serde::{Deserialize, Serialize};

/// One geolocated sighting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Target latitude, degrees WGS84
    pub lat: f64,
    /// Target longitude, degrees WGS84
    pub lon: f64,
    /// Observer latitude; equals `lat` when the observer position is unknown
    pub src_lat: f64,
    /// Observer longitude; equals `lon` when the observer position is unknown
    pub src_lon: f64,
    /// Compass bearing in degrees
    pub heading: f64,
    pub pitch: f64,
    pub roll: f64,
    /// Distance to target in meters
    pub distance_m: f64,
    /// Unix seconds with fraction
    pub ts: f64,
    /// Image URL; serialized as `null` when absent
    pub image: Option<String>,
}

/// The unit actually published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ts: f64,
    /// Declared count. Not cross-checked against `targets.len()`.
    pub count: i64,
    pub targets: Vec<Observation>,
}

impl Envelope {
    /// Envelope carrying a single observation, stamped with the observation's time
    pub fn single(observation: Observation) -> Self {
        Self {
            ts: observation.ts,
            count: 1,
            targets: vec![observation],
        }
    }

    /// Serialize to the UTF-8 JSON wire payload
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Round a coordinate to 6 decimal places (~0.1 m)
pub fn round_coordinate(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
