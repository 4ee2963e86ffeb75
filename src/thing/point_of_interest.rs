use super::{average_with_other_devices, changed_numeric, other_device_readings, ReferencedDevice, TemperatureState};
use crate::error::ThingsResult;
use crate::value::{self, Measurement, Value};

pub(crate) fn handle(
    thing_id: &str,
    state: &mut TemperatureState,
    ref_devices: &[ReferencedDevice],
    source_device: &str,
    measurements: &[Measurement],
    onchange: &mut dyn FnMut(Value) -> ThingsResult<()>,
) -> ThingsResult<()> {
    for m in measurements {
        if m.urn != value::urn::TEMPERATURE {
            continue;
        }
        let Some(v) = m.v else { continue };
        let others = other_device_readings(ref_devices, source_device, value::urn::TEMPERATURE);
        let avg = average_with_other_devices(v, others.into_iter());
        if changed_numeric(state.temperature, avg) {
            state.temperature = Some(avg);
            state.temperature_timestamp = Some(m.timestamp);
            onchange(value::temperature(thing_id, avg, m.timestamp, Some(&m.id)))?;
        }
    }
    Ok(())
}
