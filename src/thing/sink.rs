use serde::{Deserialize, Serialize};

use crate::error::ThingsResult;
use crate::level::LevelState;
use crate::stopwatch::{StopwatchEvent, StopwatchState};
use crate::value::{self, Measurement, Value};

/// Sink is a generic multi-URN pass-through: a digital-input stopwatch
/// plus an auto-configuring level, the same combination Sewer uses but
/// without the overflow-specific cumulative-time bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkState {
    pub level: LevelState,
    pub input: StopwatchState,
}

pub(crate) fn handle(
    thing_id: &str,
    state: &mut SinkState,
    measurements: &[Measurement],
    onchange: &mut dyn FnMut(Value) -> ThingsResult<()>,
) -> ThingsResult<()> {
    for m in measurements {
        match m.urn.as_str() {
            u if u == value::urn::DISTANCE => {
                let Some(distance) = m.v else { continue };
                if state.level.max_distance.is_none() {
                    state.level.max_distance = Some(distance);
                }
                if state.level.calc(distance) {
                    onchange(value::filling_level(thing_id, state.level.current_level, m.timestamp, Some(&m.id)))?;
                }
            }
            u if u == value::urn::DIGITAL_INPUT => {
                let Some(on) = m.vb else { continue };
                let event = state.input.handle(on, m.timestamp);
                match event {
                    StopwatchEvent::Started | StopwatchEvent::Updated => {
                        onchange(value::stopwatch_state(thing_id, true, m.timestamp, Some(&m.id)))?;
                    }
                    StopwatchEvent::Stopped => {
                        onchange(value::stopwatch_state(thing_id, false, m.timestamp, Some(&m.id)))?;
                        onchange(value::stopwatch_cumulative_seconds(
                            thing_id,
                            state.input.cumulative_time_seconds,
                            m.timestamp,
                            Some(&m.id),
                        ))?;
                    }
                    StopwatchEvent::InitialState => {}
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
    use chrono::{TimeZone, Utc};

    fn measurement(urn: &str, vb: Option<bool>, v: Option<f64>, hour: u32) -> Measurement {
        Measurement {
            id: "dev-1/x/y".into(),
            urn: urn.into(),
            v,
            vb,
            vs: None,
            unit: None,
            timestamp: Utc.with_ymd_and_hms(2026, 7, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn input_stop_emits_state_and_cumulative_seconds() {
        let mut state = SinkState::default();
        let mut emitted = Vec::new();
        let on = measurement(value::urn::DIGITAL_INPUT, Some(true), None, 9);
        let off = measurement(value::urn::DIGITAL_INPUT, Some(false), None, 10);
        handle("sink-1", &mut state, std::slice::from_ref(&on), &mut |v| {
            emitted.push(v);
            Ok(())
        })
        .unwrap();
        handle("sink-1", &mut state, std::slice::from_ref(&off), &mut |v| {
            emitted.push(v);
            Ok(())
        })
        .unwrap();

        assert_eq!(emitted.len(), 3);
        assert_eq!(emitted[2].urn, value::urn::STOPWATCH);
        assert_eq!(emitted[2].v, Some(3600.0));
    }
}
