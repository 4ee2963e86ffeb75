use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopwatchEvent {
    InitialState,
    Started,
    Updated,
    Stopped,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopwatchState {
    pub state: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub cumulative_time_seconds: f64,
}

impl StopwatchState {
    /// Feeds a new boolean reading through the edge-triggered state
    /// machine and returns the transition's event. On Stopped,
    /// `start_time`/`duration_seconds`/`stop_time` still hold the
    /// finished interval when `handle` returns, so the caller can read
    /// them to emit a change value; they're cleared lazily on the next
    /// Started transition rather than inside this call.
    pub fn handle(&mut self, new_state: bool, ts: DateTime<Utc>) -> StopwatchEvent {
        let event = match (self.state, new_state) {
            (false, true) => {
                self.start_time = Some(ts);
                self.duration_seconds = None;
                self.stop_time = None;
                StopwatchEvent::Started
            }
            (true, true) => {
                if let Some(start) = self.start_time {
                    self.duration_seconds = Some((ts - start).num_milliseconds() as f64 / 1000.0);
                }
                StopwatchEvent::Updated
            }
            (true, false) => {
                let duration: Duration = match self.start_time {
                    Some(start) => ts - start,
                    None => Duration::zero(),
                };
                self.stop_time = Some(ts);
                self.duration_seconds = Some(duration.num_milliseconds() as f64 / 1000.0);
                self.cumulative_time_seconds += duration.num_milliseconds() as f64 / 1000.0;
                StopwatchEvent::Stopped
            }
            (false, false) => StopwatchEvent::InitialState,
        };

        self.state = new_state;
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn start_update_stop_cycle_accumulates_cumulative_time() {
        let mut sw = StopwatchState::default();
        assert_eq!(sw.handle(true, ts(10)), StopwatchEvent::Started);
        assert_eq!(sw.handle(true, ts(11)), StopwatchEvent::Updated);
        assert_eq!(sw.handle(false, ts(12)), StopwatchEvent::Stopped);
        assert_eq!(sw.cumulative_time_seconds, 2.0 * 3600.0);
        assert!(!sw.state);
        assert_eq!(sw.duration_seconds, Some(2.0 * 3600.0));
        assert!(sw.start_time.is_some());

        assert_eq!(sw.handle(true, ts(13)), StopwatchEvent::Started);
        assert!(sw.duration_seconds.is_none());
        assert!(sw.stop_time.is_none());
    }

    #[test]
    fn repeated_off_is_a_no_op_initial_state() {
        let mut sw = StopwatchState::default();
        assert_eq!(sw.handle(false, ts(1)), StopwatchEvent::InitialState);
        assert_eq!(sw.cumulative_time_seconds, 0.0);
    }

    #[test]
    fn sewer_overflow_scenario_two_hour_window() {
        let mut sw = StopwatchState::default();
        sw.handle(true, ts(9));
        let event = sw.handle(false, ts(11));
        assert_eq!(event, StopwatchEvent::Stopped);
        assert_eq!(sw.cumulative_time_seconds, 2.0 * 3600.0);
        assert!(!sw.state);
    }
}
