use serde::{Deserialize, Serialize};

use super::{average_with_other_devices, changed_numeric, other_device_readings, ReferencedDevice};
use crate::error::ThingsResult;
use crate::value::{self, Measurement, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildingState {
    pub energy_kwh: Option<f64>,
    pub power_kw: Option<f64>,
    pub temperature: Option<f64>,
}

pub(crate) fn handle(
    thing_id: &str,
    state: &mut BuildingState,
    ref_devices: &[ReferencedDevice],
    source_device: &str,
    measurements: &[Measurement],
    onchange: &mut dyn FnMut(Value) -> ThingsResult<()>,
) -> ThingsResult<()> {
    for m in measurements {
        let Some(v) = m.v else { continue };
        match m.urn.as_str() {
            u if u == value::urn::ENERGY => {
                if changed_numeric(state.energy_kwh, v) {
                    state.energy_kwh = Some(v);
                    onchange(value::energy(thing_id, v, m.timestamp, Some(&m.id)))?;
                }
            }
            u if u == value::urn::POWER => {
                if changed_numeric(state.power_kw, v) {
                    state.power_kw = Some(v);
                    onchange(value::power(thing_id, v, m.timestamp, Some(&m.id)))?;
                }
            }
            u if u == value::urn::TEMPERATURE => {
                let others = other_device_readings(ref_devices, source_device, value::urn::TEMPERATURE);
                let avg = average_with_other_devices(v, others.into_iter());
                if changed_numeric(state.temperature, avg) {
                    state.temperature = Some(avg);
                    onchange(value::temperature(thing_id, avg, m.timestamp, Some(&m.id)))?;
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

    #[test]
    fn power_change_filter_suppresses_sub_threshold_updates() {
        let mut state = BuildingState { power_kw: Some(5.0), ..Default::default() };
        let mut emitted = Vec::new();
        let m = Measurement {
            id: "dev-1/3305/5700".into(),
            urn: value::urn::POWER.into(),
            v: Some(5.0003),
            vb: None,
            vs: None,
            unit: None,
            timestamp: Utc::now(),
        };
        handle("building-1", &mut state, &[], "dev-1", std::slice::from_ref(&m), &mut |v| {
            emitted.push(v);
            Ok(())
        })
        .unwrap();
        assert!(emitted.is_empty());
    }
}
