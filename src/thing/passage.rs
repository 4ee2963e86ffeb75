use std::collections::HashMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ThingsResult;
use crate::value::{self, Measurement, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PassageState {
    pub digital_input: bool,
    pub cumulated_number_of_passages: i64,
    pub passages_today: i64,
    /// Keyed by `year * 1000 + day_of_year`, counting passages per day.
    pub passages_per_day: HashMap<i32, i64>,
}

fn day_key(ts: DateTime<Utc>) -> i32 {
    ts.year() * 1000 + ts.ordinal() as i32
}

pub(crate) fn handle(
    thing_id: &str,
    state: &mut PassageState,
    measurements: &[Measurement],
    onchange: &mut dyn FnMut(Value) -> ThingsResult<()>,
) -> ThingsResult<()> {
    for m in measurements {
        if m.urn != value::urn::DIGITAL_INPUT {
            continue;
        }
        let Some(new_state) = m.vb else { continue };
        let previous = state.digital_input;
        state.digital_input = new_state;

        onchange(value::door(thing_id, new_state, m.timestamp, Some(&m.id)))?;

        if !previous && new_state {
            state.cumulated_number_of_passages += 1;
            let key = day_key(m.timestamp);
            let count = state.passages_per_day.entry(key).or_insert(0);
            *count += 1;

            let today_key = day_key(Utc::now());
            state.passages_today = *state.passages_per_day.get(&today_key).unwrap_or(&0);

            onchange(value::people_counter(
                thing_id,
                state.cumulated_number_of_passages,
                m.timestamp,
                Some(&m.id),
            ))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts_at(days_from_today: i64, hour: u32) -> DateTime<Utc> {
        (Utc::now() + Duration::days(days_from_today))
            .date_naive()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn counts_rising_edges_and_todays_subset() {
        let mut state = PassageState::default();
        let mut emitted = Vec::new();
        let mut push = |urn_is_digital: bool, vb: bool, ts: DateTime<Utc>| {
            let m = Measurement {
                id: "dev-1/3200/5500".into(),
                urn: if urn_is_digital { value::urn::DIGITAL_INPUT.into() } else { "other".into() },
                v: None,
                vb: Some(vb),
                vs: None,
                unit: None,
                timestamp: ts,
            };
            handle("passage-1", &mut state, std::slice::from_ref(&m), &mut |v| {
                emitted.push(v);
                Ok(())
            })
            .unwrap();
        };

        push(true, false, ts_at(-1, 8));
        push(true, true, ts_at(-1, 9));
        push(true, false, ts_at(-1, 10));
        push(true, true, ts_at(0, 8));
        push(true, false, ts_at(0, 9));
        push(true, true, ts_at(0, 10));
        push(true, false, ts_at(0, 11));
        push(true, true, ts_at(1, 8));
        push(true, false, ts_at(1, 9));

        assert_eq!(state.cumulated_number_of_passages, 4);
        assert_eq!(state.passages_today, 2);
    }

    #[test]
    fn ignores_other_object_urns() {
        let mut state = PassageState::default();
        let mut emitted = Vec::new();
        let m = Measurement {
            id: "dev-1/3303/5700".into(),
            urn: value::urn::TEMPERATURE.into(),
            v: Some(20.0),
            vb: None,
            vs: None,
            unit: None,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        };
        handle("passage-1", &mut state, std::slice::from_ref(&m), &mut |v| {
            emitted.push(v);
            Ok(())
        })
        .unwrap();
        assert_eq!(state.cumulated_number_of_passages, 0);
        assert!(emitted.is_empty());
    }
}
