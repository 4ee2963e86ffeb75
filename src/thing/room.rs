use serde::{Deserialize, Serialize};

use super::{average_with_other_devices, changed_numeric, other_device_readings, ReferencedDevice};
use crate::error::ThingsResult;
use crate::value::{self, Measurement, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomState {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub illuminance: Option<f64>,
    pub co2: Option<f64>,
}

pub(crate) fn handle(
    thing_id: &str,
    state: &mut RoomState,
    ref_devices: &[ReferencedDevice],
    source_device: &str,
    measurements: &[Measurement],
    onchange: &mut dyn FnMut(Value) -> ThingsResult<()>,
) -> ThingsResult<()> {
    let others = |urn: &str| -> Vec<f64> { other_device_readings(ref_devices, source_device, urn) };

    for m in measurements {
        let Some(v) = m.v else { continue };
        match m.urn.as_str() {
            u if u == value::urn::TEMPERATURE => {
                let avg = average_with_other_devices(v, others(value::urn::TEMPERATURE).into_iter());
                if changed_numeric(state.temperature, avg) {
                    state.temperature = Some(avg);
                    onchange(value::temperature(thing_id, avg, m.timestamp, Some(&m.id)))?;
                }
            }
            u if u == value::urn::HUMIDITY => {
                let avg = average_with_other_devices(v, others(value::urn::HUMIDITY).into_iter());
                if changed_numeric(state.humidity, avg) {
                    state.humidity = Some(avg);
                    onchange(value::humidity(thing_id, avg, m.timestamp, Some(&m.id)))?;
                }
            }
            u if u == value::urn::ILLUMINANCE => {
                let avg = average_with_other_devices(v, others(value::urn::ILLUMINANCE).into_iter());
                if changed_numeric(state.illuminance, avg) {
                    state.illuminance = Some(avg);
                    onchange(value::illuminance(thing_id, avg, m.timestamp, Some(&m.id)))?;
                }
            }
            u if u == value::urn::AIR_QUALITY => {
                let avg = average_with_other_devices(v, others(value::urn::AIR_QUALITY).into_iter());
                if changed_numeric(state.co2, avg) {
                    state.co2 = Some(avg);
                    onchange(value::co2(thing_id, avg, m.timestamp, Some(&m.id)))?;
                }
            }
            _ => {}
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
    fn room_temperature_averages_two_referenced_devices() {
        let mut state = RoomState::default();
        let ts = Utc::now();

        let ref_devices = vec![
            ReferencedDevice { id: "dev-a".into(), measurements: HashMap::new() },
            ReferencedDevice { id: "dev-b".into(), measurements: HashMap::new() },
        ];

        let m_a = Measurement {
            id: "dev-a/3303/5700".into(),
            urn: value::urn::TEMPERATURE.into(),
            v: Some(20.0),
            vb: None,
            vs: None,
            unit: None,
            timestamp: ts,
        };
        let mut emitted = Vec::new();
        handle("room-1", &mut state, &ref_devices, "dev-a", std::slice::from_ref(&m_a), &mut |v| {
            emitted.push(v);
            Ok(())
        })
        .unwrap();
        assert_eq!(state.temperature, Some(20.0));

        let mut ref_devices2 = ref_devices;
        ref_devices2[0].measurements.insert(value::urn::TEMPERATURE.to_string(), m_a.clone());

        let m_b = Measurement {
            id: "dev-b/3303/5700".into(),
            urn: value::urn::TEMPERATURE.into(),
            v: Some(22.0),
            vb: None,
            vs: None,
            unit: None,
            timestamp: ts,
        };
        emitted.clear();
        handle("room-1", &mut state, &ref_devices2, "dev-b", std::slice::from_ref(&m_b), &mut |v| {
            emitted.push(v);
            Ok(())
        })
        .unwrap();

        assert_eq!(state.temperature, Some(21.0));
    }
}
