use serde::{Deserialize, Serialize};

use super::changed_bool;
use crate::error::ThingsResult;
use crate::value::{self, Measurement, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatermeterState {
    pub cumulative_volume_m3: Option<f64>,
    pub leakage: bool,
    pub burst: bool,
    pub backflow: bool,
    pub fraud: bool,
}

pub(crate) fn handle(
    thing_id: &str,
    state: &mut WatermeterState,
    measurements: &[Measurement],
    onchange: &mut dyn FnMut(Value) -> ThingsResult<()>,
) -> ThingsResult<()> {
    for m in measurements {
        if m.urn != value::urn::WATERMETER {
            continue;
        }
        if let Some(v) = m.v {
            let changed = match state.cumulative_volume_m3 {
                Some(p) => (p - v).abs() >= 0.001,
                None => true,
            };
            if changed {
                state.cumulative_volume_m3 = Some(v);
                onchange(value::watermeter_volume(thing_id, v, m.timestamp, Some(&m.id)))?;
            }
        }
        if let Some(vb) = m.vb {
            if changed_bool(Some(state.leakage), vb) {
                state.leakage = vb;
            }
        }
    }
    Ok(())
}
