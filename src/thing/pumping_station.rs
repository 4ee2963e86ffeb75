use serde::{Deserialize, Serialize};

use crate::error::ThingsResult;
use crate::stopwatch::{StopwatchEvent, StopwatchState};
use crate::value::{self, Measurement, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PumpingStationState {
    pub pumping: StopwatchState,
}

pub(crate) fn handle(
    thing_id: &str,
    state: &mut PumpingStationState,
    measurements: &[Measurement],
    onchange: &mut dyn FnMut(Value) -> ThingsResult<()>,
) -> ThingsResult<()> {
    for m in measurements {
        if m.urn != value::urn::DIGITAL_INPUT {
            continue;
        }
        let Some(pumping) = m.vb else { continue };
        let event = state.pumping.handle(pumping, m.timestamp);
        match event {
            StopwatchEvent::Started | StopwatchEvent::Updated => {
                onchange(value::stopwatch_state(thing_id, true, m.timestamp, Some(&m.id)))?;
            }
            StopwatchEvent::Stopped => {
                onchange(value::stopwatch_state(thing_id, false, m.timestamp, Some(&m.id)))?;
                onchange(value::stopwatch_cumulative_seconds(
                    thing_id,
                    state.pumping.cumulative_time_seconds,
                    m.timestamp,
                    Some(&m.id),
                ))?;
            }
            StopwatchEvent::InitialState => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn pumping_start_emits_on_state() {
        let mut state = PumpingStationState::default();
        let mut emitted = Vec::new();
        let m = Measurement {
            id: "dev-1/3200/5500".into(),
            urn: value::urn::DIGITAL_INPUT.into(),
            v: None,
            vb: Some(true),
            vs: None,
            unit: None,
            timestamp: Utc::now(),
        };
        handle("pump-1", &mut state, std::slice::from_ref(&m), &mut |v| {
            emitted.push(v);
            Ok(())
        })
        .unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].vb, Some(true));
    }

    #[test]
    fn pumping_stop_emits_state_and_cumulative_seconds() {
        let mut state = PumpingStationState::default();
        let mut emitted = Vec::new();
        let on = Measurement {
            id: "dev-1/3200/5500".into(),
            urn: value::urn::DIGITAL_INPUT.into(),
            v: None,
            vb: Some(true),
            vs: None,
            unit: None,
            timestamp: Utc::now(),
        };
        let off = Measurement { vb: Some(false), ..on.clone() };
        handle("pump-1", &mut state, std::slice::from_ref(&on), &mut |v| {
            emitted.push(v);
            Ok(())
        })
        .unwrap();
        handle("pump-1", &mut state, std::slice::from_ref(&off), &mut |v| {
            emitted.push(v);
            Ok(())
        })
        .unwrap();
        assert_eq!(emitted.len(), 3);
        assert_eq!(emitted[2].urn, value::urn::STOPWATCH);
        assert!(emitted[2].v.is_some());
    }
}
