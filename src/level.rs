use serde::{Deserialize, Serialize};

/// round to 5 decimal places, same rounding idiom the sidecar's
/// rolling averager uses for bucketed values.
fn round5(v: f64) -> f64 {
    (v * 100_000.0).round() / 100_000.0
}

/// Distance-to-level transform shared by Container, Sewer and Sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelState {
    pub max_distance: Option<f64>,
    pub max_level: Option<f64>,
    pub mean_level: Option<f64>,
    pub offset: f64,
    pub angle: f64,
    pub current_level: f64,
    pub percent: f64,
}

impl LevelState {
    fn cos_alpha(&self) -> f64 {
        if self.angle <= 0.0 {
            1.0
        } else {
            self.angle.to_radians().cos()
        }
    }

    /// Recomputes current level/percent/offset from a raw distance
    /// reading. Returns whether the level changed by at least 1e-4.
    pub fn calc(&mut self, distance: f64) -> bool {
        let max_distance = self.max_distance.unwrap_or(distance);
        let mut level = round5((max_distance - distance) * self.cos_alpha());
        if self.offset != 0.0 && level < self.offset {
            level = self.offset;
        }

        let changed = (level - self.current_level).abs() >= 1e-4;
        self.current_level = level;

        if let Some(max_level) = self.max_level {
            if max_level != 0.0 {
                self.percent = (level * 100.0 / max_level).clamp(0.0, 100.0);
            }
        }

        if let Some(mean_level) = self.mean_level {
            if mean_level != 0.0 {
                self.offset = level - mean_level;
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_fill_matches_worked_example() {
        let mut level = LevelState {
            max_distance: Some(3.0),
            max_level: Some(2.8),
            ..Default::default()
        };
        let changed = level.calc(2.51);
        assert!(changed);
        assert!((level.current_level - 0.49).abs() < 1e-9);
        assert!((level.percent - 17.5).abs() < 1e-6);
    }

    #[test]
    fn repeated_identical_distance_does_not_change() {
        let mut level = LevelState {
            max_distance: Some(3.0),
            max_level: Some(2.8),
            ..Default::default()
        };
        assert!(level.calc(2.51));
        assert!(!level.calc(2.51));
    }

    #[test]
    fn offset_floors_the_computed_level() {
        let mut level = LevelState {
            max_distance: Some(3.0),
            offset: 0.2,
            ..Default::default()
        };
        level.calc(2.99);
        assert_eq!(level.current_level, 0.2);
    }
}
