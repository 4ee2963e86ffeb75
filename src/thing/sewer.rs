use serde::{Deserialize, Serialize};

use crate::error::ThingsResult;
use crate::level::LevelState;
use crate::stopwatch::{StopwatchEvent, StopwatchState};
use crate::value::{self, Measurement, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SewerState {
    pub level: LevelState,
    pub overflow: StopwatchState,
    pub overflow_cumulative_time_seconds: f64,
}

pub(crate) fn handle(
    thing_id: &str,
    state: &mut SewerState,
    measurements: &[Measurement],
    onchange: &mut dyn FnMut(Value) -> ThingsResult<()>,
) -> ThingsResult<()> {
    for m in measurements {
        match m.urn.as_str() {
            u if u == value::urn::DISTANCE => {
                let Some(distance) = m.v else { continue };
                if state.level.calc(distance) {
                    onchange(value::filling_level(thing_id, state.level.current_level, m.timestamp, Some(&m.id)))?;
                    onchange(value::filling_percent(thing_id, state.level.percent, m.timestamp, Some(&m.id)))?;
                }
            }
            u if u == value::urn::DIGITAL_INPUT => {
                let Some(overflowing) = m.vb else { continue };
                let event = state.overflow.handle(overflowing, m.timestamp);
                match event {
                    StopwatchEvent::Started | StopwatchEvent::Updated => {
                        onchange(value::stopwatch_state(thing_id, true, m.timestamp, Some(&m.id)))?;
                    }
                    StopwatchEvent::Stopped => {
                        state.overflow_cumulative_time_seconds = state.overflow.cumulative_time_seconds;
                        onchange(value::stopwatch_state(thing_id, false, m.timestamp, Some(&m.id)))?;
                        onchange(value::stopwatch_cumulative_seconds(
                            thing_id,
                            state.overflow.cumulative_time_seconds,
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
    fn overflow_on_for_two_hours_accumulates_cumulative_time() {
        let mut state = SewerState::default();
        let mut emitted = Vec::new();
        let on = measurement(value::urn::DIGITAL_INPUT, Some(true), None, 9);
        let off = measurement(value::urn::DIGITAL_INPUT, Some(false), None, 11);
        handle("sewer-1", &mut state, std::slice::from_ref(&on), &mut |v| {
            emitted.push(v);
            Ok(())
        })
        .unwrap();
        handle("sewer-1", &mut state, std::slice::from_ref(&off), &mut |v| {
            emitted.push(v);
            Ok(())
        })
        .unwrap();

        assert!(!state.overflow.state);
        assert_eq!(state.overflow_cumulative_time_seconds, 2.0 * 3600.0);
        assert_eq!(emitted.len(), 3);
    }
}
