use serde::{Deserialize, Serialize};

use super::{average_with_other_devices, other_device_readings, ReferencedDevice};
use crate::error::ThingsResult;
use crate::level::LevelState;
use crate::value::{self, Measurement, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerState {
    pub level: LevelState,
}

pub(crate) fn handle(
    thing_id: &str,
    state: &mut ContainerState,
    ref_devices: &[ReferencedDevice],
    source_device: &str,
    measurements: &[Measurement],
    onchange: &mut dyn FnMut(Value) -> ThingsResult<()>,
) -> ThingsResult<()> {
    for m in measurements {
        if m.urn != value::urn::DISTANCE {
            continue;
        }
        let Some(distance) = m.v else { continue };
        let others = other_device_readings(ref_devices, source_device, value::urn::DISTANCE);
        let avg_distance = average_with_other_devices(distance, others.into_iter());
        if state.level.calc(avg_distance) {
            onchange(value::filling_level(thing_id, state.level.current_level, m.timestamp, Some(&m.id)))?;
            onchange(value::filling_percent(thing_id, state.level.percent, m.timestamp, Some(&m.id)))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    #[test]
    fn container_fill_emits_level_and_percent() {
        let mut state = ContainerState {
            level: LevelState {
                max_distance: Some(3.0),
                max_level: Some(2.8),
                ..Default::default()
            },
        };
        let ts = Utc::now();
        let m = Measurement {
            id: "dev-1/3330/5700".into(),
            urn: value::urn::DISTANCE.into(),
            v: Some(2.51),
            vb: None,
            vs: None,
            unit: None,
            timestamp: ts,
        };
        let mut emitted = Vec::new();
        handle("container-1", &mut state, &[], "dev-1", std::slice::from_ref(&m), &mut |v| {
            emitted.push(v);
            Ok(())
        })
        .unwrap();
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].id, "container-1/3435/3");
        assert!((emitted[0].v.unwrap() - 0.49).abs() < 1e-9);
        assert_eq!(emitted[1].id, "container-1/3435/2");
        assert!((emitted[1].v.unwrap() - 17.5).abs() < 1e-6);
    }

    #[test]
    fn container_distance_averages_other_referenced_devices() {
        let mut state = ContainerState {
            level: LevelState { max_distance: Some(3.0), ..Default::default() },
        };
        let ts = Utc::now();
        let other = ReferencedDevice {
            id: "dev-b".into(),
            measurements: {
                let mut m = HashMap::new();
                m.insert(
                    value::urn::DISTANCE.to_string(),
                    Measurement {
                        id: "dev-b/3330/5700".into(),
                        urn: value::urn::DISTANCE.into(),
                        v: Some(2.0),
                        vb: None,
                        vs: None,
                        unit: None,
                        timestamp: ts,
                    },
                );
                m
            },
        };
        let m = Measurement {
            id: "dev-a/3330/5700".into(),
            urn: value::urn::DISTANCE.into(),
            v: Some(1.0),
            vb: None,
            vs: None,
            unit: None,
            timestamp: ts,
        };
        let mut emitted = Vec::new();
        handle("container-1", &mut state, &[other], "dev-a", std::slice::from_ref(&m), &mut |v| {
            emitted.push(v);
            Ok(())
        })
        .unwrap();
        assert!((state.level.current_level - 1.5).abs() < 1e-9);
    }
}
