use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::thing::ThingKind;

pub mod urn {
    pub const DISTANCE: &str = "urn:oma:lwm2m:ext:3330";
    pub const TEMPERATURE: &str = "urn:oma:lwm2m:ext:3303";
    pub const HUMIDITY: &str = "urn:oma:lwm2m:ext:3304";
    pub const ILLUMINANCE: &str = "urn:oma:lwm2m:ext:3301";
    pub const AIR_QUALITY: &str = "urn:oma:lwm2m:ext:3428";
    pub const DIGITAL_INPUT: &str = "urn:oma:lwm2m:ext:3200";
    pub const PRESENCE: &str = "urn:oma:lwm2m:ext:3302";
    pub const ENERGY: &str = "urn:oma:lwm2m:ext:3331";
    pub const POWER: &str = "urn:oma:lwm2m:ext:3305";
    pub const WATERMETER: &str = "urn:oma:lwm2m:ext:3424";

    pub const FILLING_LEVEL: &str = "urn:oma:lwm2m:ext:3435";
    pub const STOPWATCH: &str = "urn:oma:lwm2m:ext:3350";
}

/// A raw device-sourced reading, keyed by `<deviceId>/<objectId>/<resourceId>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub id: String,
    pub urn: String,
    pub v: Option<f64>,
    pub vb: Option<bool>,
    pub vs: Option<String>,
    pub unit: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Measurement {
    /// The device id prefix, i.e. everything before the first `/`.
    pub fn device_id(&self) -> &str {
        self.id.split('/').next().unwrap_or(&self.id)
    }

    pub fn has_payload(&self) -> bool {
        self.v.is_some() || self.vb.is_some() || self.vs.is_some()
    }
}

/// A derived, thing-owned reading persisted to the time-series store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Value {
    pub id: String,
    pub urn: String,
    pub v: Option<f64>,
    pub vb: Option<bool>,
    pub vs: Option<String>,
    pub unit: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
}

impl Value {
    pub fn has_payload_for_repo(&self) -> bool {
        self.v.is_some() || self.vb.is_some() || self.vs.is_some()
    }
}

fn numeric(thing_id: &str, object: &str, resource: &str, urn: &str, v: f64, unit: &str, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    Value {
        id: format!("{thing_id}/{object}/{resource}"),
        urn: urn.to_string(),
        v: Some(v),
        vb: None,
        vs: None,
        unit: Some(unit.to_string()),
        timestamp: ts,
        reference: reference.map(str::to_string),
    }
}

fn boolean(thing_id: &str, object: &str, resource: &str, urn: &str, vb: bool, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    Value {
        id: format!("{thing_id}/{object}/{resource}"),
        urn: urn.to_string(),
        v: None,
        vb: Some(vb),
        vs: None,
        unit: None,
        timestamp: ts,
        reference: reference.map(str::to_string),
    }
}

pub fn temperature(thing_id: &str, celsius: f64, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    numeric(thing_id, "3303", "5700", urn::TEMPERATURE, celsius, "Cel", ts, reference)
}

pub fn humidity(thing_id: &str, percent: f64, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    numeric(thing_id, "3304", "5700", urn::HUMIDITY, percent, "%RH", ts, reference)
}

pub fn illuminance(thing_id: &str, lux: f64, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    numeric(thing_id, "3301", "5700", urn::ILLUMINANCE, lux, "lx", ts, reference)
}

pub fn co2(thing_id: &str, ppm: f64, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    numeric(thing_id, "3428", "5700", urn::AIR_QUALITY, ppm, "ppm", ts, reference)
}

pub fn filling_level(thing_id: &str, level: f64, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    numeric(thing_id, "3435", "3", urn::FILLING_LEVEL, level, "m", ts, reference)
}

pub fn filling_percent(thing_id: &str, percent: f64, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    numeric(thing_id, "3435", "2", urn::FILLING_LEVEL, percent, "%", ts, reference)
}

pub fn presence(thing_id: &str, present: bool, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    boolean(thing_id, "3302", "5500", urn::PRESENCE, present, ts, reference)
}

pub fn door(thing_id: &str, open: bool, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    boolean(thing_id, "3200", "5500", urn::DIGITAL_INPUT, open, ts, reference)
}

pub fn people_counter(thing_id: &str, count: i64, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    numeric(thing_id, "3434", "5700", urn::DIGITAL_INPUT, count as f64, "count", ts, reference)
}

pub fn energy(thing_id: &str, kwh: f64, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    numeric(thing_id, "3331", "5700", urn::ENERGY, kwh, "kWh", ts, reference)
}

pub fn power(thing_id: &str, kw: f64, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    numeric(thing_id, "3305", "5700", urn::POWER, kw, "kW", ts, reference)
}

pub fn watermeter_volume(thing_id: &str, cubic_meters: f64, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    numeric(thing_id, "3424", "5700", urn::WATERMETER, cubic_meters, "m3", ts, reference)
}

/// Stopwatch emits a cumulative-seconds value and an on/off boolean.
pub fn stopwatch_cumulative_seconds(thing_id: &str, seconds: f64, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    numeric(thing_id, "3350", "5544", urn::STOPWATCH, seconds, "s", ts, reference)
}

pub fn stopwatch_state(thing_id: &str, on: bool, ts: DateTime<Utc>, reference: Option<&str>) -> Value {
    boolean(thing_id, "3350", "5850", urn::STOPWATCH, on, ts, reference)
}

/// Per-`ThingKind` URN allow-list. Measurements whose URN is not in
/// the list for the thing's kind are dropped before dispatch.
pub fn allowed_urns(kind: ThingKind) -> &'static [&'static str] {
    match kind {
        ThingKind::Container => &[urn::DISTANCE],
        ThingKind::Sewer => &[urn::DISTANCE, urn::DIGITAL_INPUT],
        ThingKind::PumpingStation => &[urn::DIGITAL_INPUT],
        ThingKind::Passage => &[urn::DIGITAL_INPUT],
        ThingKind::Room => &[urn::TEMPERATURE, urn::HUMIDITY, urn::ILLUMINANCE, urn::AIR_QUALITY],
        ThingKind::Building => &[urn::ENERGY, urn::POWER, urn::TEMPERATURE],
        ThingKind::Lifebuoy => &[urn::PRESENCE],
        ThingKind::PointOfInterest => &[urn::TEMPERATURE],
        ThingKind::Beach => &[urn::TEMPERATURE],
        ThingKind::Watermeter => &[urn::WATERMETER],
        ThingKind::Sink => &[urn::DIGITAL_INPUT, urn::DISTANCE],
    }
}

pub fn is_allowed(kind: ThingKind, measurement_urn: &str) -> bool {
    allowed_urns(kind).contains(&measurement_urn)
}
