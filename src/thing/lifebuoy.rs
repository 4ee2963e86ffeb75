use serde::{Deserialize, Serialize};

use super::changed_bool;
use crate::error::ThingsResult;
use crate::value::{self, Measurement, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifebuoyState {
    pub present: Option<bool>,
}

pub(crate) fn handle(
    thing_id: &str,
    state: &mut LifebuoyState,
    measurements: &[Measurement],
    onchange: &mut dyn FnMut(Value) -> ThingsResult<()>,
) -> ThingsResult<()> {
    for m in measurements {
        if m.urn != value::urn::PRESENCE {
            continue;
        }
        let Some(present) = m.vb else { continue };
        if changed_bool(state.present, present) {
            state.present = Some(present);
            onchange(value::presence(thing_id, present, m.timestamp, Some(&m.id)))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn repeated_identical_presence_is_a_no_op() {
        let mut state = LifebuoyState { present: Some(true) };
        let mut emitted = Vec::new();
        let m = Measurement {
            id: "dev-1/3302/5500".into(),
            urn: value::urn::PRESENCE.into(),
            v: None,
            vb: Some(true),
            vs: None,
            unit: None,
            timestamp: Utc::now(),
        };
        handle("buoy-1", &mut state, std::slice::from_ref(&m), &mut |v| {
            emitted.push(v);
            Ok(())
        })
        .unwrap();
        assert!(emitted.is_empty());
    }
}
