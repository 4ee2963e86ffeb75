mod beach;
mod building;
mod container;
mod lifebuoy;
mod passage;
mod point_of_interest;
mod pumping_station;
mod room;
mod sewer;
mod sink;
mod watermeter;

pub use building::BuildingState;
pub use container::ContainerState;
pub use lifebuoy::LifebuoyState;
pub use passage::PassageState;
pub use pumping_station::PumpingStationState;
pub use room::RoomState;
pub use sewer::SewerState;
pub use sink::SinkState;
pub use watermeter::WatermeterState;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ThingsResult;
use crate::value::{self, Measurement, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ThingKind {
    Container,
    Sewer,
    PumpingStation,
    Passage,
    Room,
    Building,
    Lifebuoy,
    PointOfInterest,
    Beach,
    Watermeter,
    Sink,
}

impl ThingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ThingKind::Container => "Container",
            ThingKind::Sewer => "Sewer",
            ThingKind::PumpingStation => "PumpingStation",
            ThingKind::Passage => "Passage",
            ThingKind::Room => "Room",
            ThingKind::Building => "Building",
            ThingKind::Lifebuoy => "Lifebuoy",
            ThingKind::PointOfInterest => "PointOfInterest",
            ThingKind::Beach => "Beach",
            ThingKind::Watermeter => "Watermeter",
            ThingKind::Sink => "Sink",
        }
    }
}

/// A single-sensor temperature snapshot shared by PointOfInterest and Beach.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemperatureState {
    pub temperature: Option<f64>,
    pub temperature_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ThingState {
    Container(ContainerState),
    Sewer(SewerState),
    PumpingStation(PumpingStationState),
    Passage(PassageState),
    Room(RoomState),
    Building(BuildingState),
    Lifebuoy(LifebuoyState),
    PointOfInterest(TemperatureState),
    Beach(TemperatureState),
    Watermeter(WatermeterState),
    Sink(SinkState),
}

impl ThingState {
    pub fn kind(&self) -> ThingKind {
        match self {
            ThingState::Container(_) => ThingKind::Container,
            ThingState::Sewer(_) => ThingKind::Sewer,
            ThingState::PumpingStation(_) => ThingKind::PumpingStation,
            ThingState::Passage(_) => ThingKind::Passage,
            ThingState::Room(_) => ThingKind::Room,
            ThingState::Building(_) => ThingKind::Building,
            ThingState::Lifebuoy(_) => ThingKind::Lifebuoy,
            ThingState::PointOfInterest(_) => ThingKind::PointOfInterest,
            ThingState::Beach(_) => ThingKind::Beach,
            ThingState::Watermeter(_) => ThingKind::Watermeter,
            ThingState::Sink(_) => ThingKind::Sink,
        }
    }

    pub fn default_for(kind: ThingKind) -> ThingState {
        match kind {
            ThingKind::Container => ThingState::Container(ContainerState::default()),
            ThingKind::Sewer => ThingState::Sewer(SewerState::default()),
            ThingKind::PumpingStation => ThingState::PumpingStation(PumpingStationState::default()),
            ThingKind::Passage => ThingState::Passage(PassageState::default()),
            ThingKind::Room => ThingState::Room(RoomState::default()),
            ThingKind::Building => ThingState::Building(BuildingState::default()),
            ThingKind::Lifebuoy => ThingState::Lifebuoy(LifebuoyState::default()),
            ThingKind::PointOfInterest => ThingState::PointOfInterest(TemperatureState::default()),
            ThingKind::Beach => ThingState::Beach(TemperatureState::default()),
            ThingKind::Watermeter => ThingState::Watermeter(WatermeterState::default()),
            ThingKind::Sink => ThingState::Sink(SinkState::default()),
        }
    }
}

/// A device referenced by a thing, with the last observed measurement
/// per URN — the rolling snapshot aggregate handlers read from when
/// averaging across several sensors of the same capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferencedDevice {
    pub id: String,
    pub measurements: HashMap<String, Measurement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing {
    pub id: String,
    pub sub_type: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tenant: String,
    pub location: Option<(f64, f64)>,
    pub ref_devices: Vec<ReferencedDevice>,
    pub tags: Vec<String>,
    pub observed_at: Option<DateTime<Utc>>,
    pub created_on: DateTime<Utc>,
    pub modified_on: DateTime<Utc>,
    pub deleted_on: Option<DateTime<Utc>>,
    pub state: ThingState,
}

impl Thing {
    pub fn new(id: impl Into<String>, tenant: impl Into<String>, kind: ThingKind, now: DateTime<Utc>) -> Thing {
        Thing {
            id: id.into(),
            sub_type: None,
            name: None,
            description: None,
            tenant: tenant.into(),
            location: None,
            ref_devices: Vec::new(),
            tags: Vec::new(),
            observed_at: None,
            created_on: now,
            modified_on: now,
            deleted_on: None,
            state: ThingState::default_for(kind),
        }
    }

    pub fn kind(&self) -> ThingKind {
        self.state.kind()
    }

    pub fn is_connected_to(&self, device_id: &str) -> bool {
        self.ref_devices.iter().any(|d| d.id == device_id)
    }

    /// Dispatches a batch of measurements to the variant-specific state
    /// machine. Measurements whose URN is not in the thing's allow-list
    /// are silently dropped before reaching the variant handler.
    pub fn handle(
        &mut self,
        measurements: &[Measurement],
        onchange: &mut dyn FnMut(Value) -> ThingsResult<()>,
    ) -> ThingsResult<()> {
        let kind = self.kind();
        let allowed: Vec<Measurement> = measurements
            .iter()
            .filter(|m| value::is_allowed(kind, &m.urn))
            .cloned()
            .collect();
        if allowed.is_empty() {
            return Ok(());
        }

        let id = self.id.clone();
        let ref_devices = self.ref_devices.clone();
        let exclude = allowed.first().map(|m| m.device_id().to_string()).unwrap_or_default();

        match &mut self.state {
            ThingState::Container(s) => container::handle(&id, s, &ref_devices, &exclude, &allowed, onchange),
            ThingState::Sewer(s) => sewer::handle(&id, s, &allowed, onchange),
            ThingState::PumpingStation(s) => pumping_station::handle(&id, s, &allowed, onchange),
            ThingState::Passage(s) => passage::handle(&id, s, &allowed, onchange),
            ThingState::Room(s) => room::handle(&id, s, &ref_devices, &exclude, &allowed, onchange),
            ThingState::Building(s) => building::handle(&id, s, &ref_devices, &exclude, &allowed, onchange),
            ThingState::Lifebuoy(s) => lifebuoy::handle(&id, s, &allowed, onchange),
            ThingState::PointOfInterest(s) => {
                point_of_interest::handle(&id, s, &ref_devices, &exclude, &allowed, onchange)
            }
            ThingState::Beach(s) => beach::handle(&id, s, &ref_devices, &exclude, &allowed, onchange),
            ThingState::Watermeter(s) => watermeter::handle(&id, s, &allowed, onchange),
            ThingState::Sink(s) => sink::handle(&id, s, &allowed, onchange),
        }
    }

    /// Replays the raw measurements into the matching referenced
    /// device's snapshot map and advances `observed_at` monotonically.
    /// State itself (handled above) mutates unconditionally even for
    /// stale timestamps; only this observed_at bookkeeping is guarded.
    pub fn set_last_observed(&mut self, measurements: &[Measurement]) {
        for m in measurements {
            let device_id = m.device_id().to_string();
            let device = match self.ref_devices.iter_mut().find(|d| d.id == device_id) {
                Some(d) => d,
                None => continue,
            };
            device.measurements.insert(m.urn.clone(), m.clone());

            let advance = match self.observed_at {
                Some(current) => m.timestamp > current,
                None => true,
            };
            if advance {
                self.observed_at = Some(m.timestamp);
            }
        }
    }
}

/// Aggregate-handler helper: the last-known measurement for `urn` from
/// every referenced device other than `exclude_device`. Shared by every
/// variant that averages a capability across referenced devices.
pub(crate) fn other_device_readings(ref_devices: &[ReferencedDevice], exclude_device: &str, urn: &str) -> Vec<f64> {
    ref_devices
        .iter()
        .filter(|d| d.id != exclude_device)
        .filter_map(|d| d.measurements.get(urn))
        .filter_map(|m| m.v)
        .collect()
}

/// Seeds an aggregate with `seed` then averages in the latest reading
/// from every other referenced device for the same URN. Grounds
/// SPEC_FULL.md §9's resolved open question: the reporting device is
/// counted exactly once, via `seed`, never re-read from its own
/// snapshot entry.
pub(crate) fn average_with_other_devices(seed: f64, others: impl Iterator<Item = f64>) -> f64 {
    let mut sum = seed;
    let mut count = 1usize;
    for v in others {
        sum += v;
        count += 1;
    }
    sum / count as f64
}

pub(crate) fn changed_numeric(previous: Option<f64>, next: f64) -> bool {
    match previous {
        Some(p) => (p - next).abs() >= 0.001,
        None => true,
    }
}

pub(crate) fn changed_bool(previous: Option<bool>, next: bool) -> bool {
    previous != Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn other_device_readings_excludes_the_reporting_device() {
        let ref_devices = vec![
            ReferencedDevice { id: "dev-a".into(), measurements: HashMap::new() },
            ReferencedDevice {
                id: "dev-b".into(),
                measurements: {
                    let mut m = HashMap::new();
                    m.insert(
                        value::urn::TEMPERATURE.to_string(),
                        Measurement {
                            id: "dev-b/3303/5700".into(),
                            urn: value::urn::TEMPERATURE.into(),
                            v: Some(22.0),
                            vb: None,
                            vs: None,
                            unit: None,
                            timestamp: Utc::now(),
                        },
                    );
                    m
                },
            },
        ];
        let readings = other_device_readings(&ref_devices, "dev-a", value::urn::TEMPERATURE);
        assert_eq!(readings, vec![22.0]);
    }

    #[test]
    fn average_seeds_once_and_includes_others() {
        let avg = average_with_other_devices(20.0, vec![22.0].into_iter());
        assert_eq!(avg, 21.0);
    }
}
